//! Conjugate gradient for `H x = g` with only products `H v` available.
//!
//! Used to get the natural-gradient direction `H⁻¹ g` from Fisher-vector
//! products without ever forming the Fisher matrix.

use crate::core::param_vector::dot;

const EPS: f64 = 1e-8;

/// Outcome of a conjugate-gradient solve.
#[derive(Debug, Clone, PartialEq)]
pub struct CgResult {
    /// Iterate with the smallest residual seen.
    pub solution: Vec<f32>,
    /// Matrix-vector products performed.
    pub iterations: usize,
    /// ‖b - A x‖ of `solution` (as tracked by the recurrence).
    pub residual_norm: f32,
    /// Residual dropped below the tolerance.
    pub converged: bool,
}

/// Solve `A x = b` starting from `x = 0`.
///
/// Stops after `max_iters` products, when the residual norm drops below
/// `tolerance`, or when the curvature along the search direction is not
/// positive or not finite. In every case the iterate with the smallest
/// residual so far is returned.
pub fn conjugate_gradients<F>(mut avp: F, b: &[f32], max_iters: usize, tolerance: f32) -> CgResult
where
    F: FnMut(&[f32]) -> Vec<f32>,
{
    let n = b.len();
    let mut x = vec![0.0f32; n];
    let mut r = b.to_vec();
    let mut p = b.to_vec();
    let mut rdotr = dot(&r, &r) as f64;

    let mut best = CgResult {
        solution: x.clone(),
        iterations: 0,
        residual_norm: rdotr.sqrt() as f32,
        converged: rdotr.sqrt() < tolerance as f64,
    };
    if best.converged {
        return best;
    }

    for iter in 1..=max_iters {
        let z = avp(&p);
        let curvature = dot(&p, &z) as f64;
        if !curvature.is_finite() || curvature <= 0.0 {
            log::debug!("conjugate gradient stopped at iteration {}: curvature {}", iter, curvature);
            best.iterations = iter;
            return best;
        }

        let alpha = (rdotr / (curvature + EPS)) as f32;
        for i in 0..n {
            x[i] += alpha * p[i];
            r[i] -= alpha * z[i];
        }

        let new_rdotr = dot(&r, &r) as f64;
        if !new_rdotr.is_finite() {
            best.iterations = iter;
            return best;
        }

        let residual = new_rdotr.sqrt();
        best.iterations = iter;
        if (residual as f32) < best.residual_norm {
            best.solution.copy_from_slice(&x);
            best.residual_norm = residual as f32;
        }
        if residual < tolerance as f64 {
            best.converged = true;
            return best;
        }

        let mu = (new_rdotr / rdotr) as f32;
        for i in 0..n {
            p[i] = r[i] + mu * p[i];
        }
        rdotr = new_rdotr;
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::param_vector::norm;

    fn matvec(a: &[[f32; 3]; 3]) -> impl FnMut(&[f32]) -> Vec<f32> + '_ {
        move |v| (0..3).map(|i| (0..3).map(|j| a[i][j] * v[j]).sum::<f32>()).collect()
    }

    #[test]
    fn test_solves_spd_system() {
        let a = [[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = [1.0, 2.0, 3.0];
        let result = conjugate_gradients(matvec(&a), &b, 10, 1e-6);
        assert!(result.converged);
        assert!(result.iterations <= 3);

        let ax = matvec(&a)(&result.solution);
        for (lhs, rhs) in ax.iter().zip(b.iter()) {
            assert!((lhs - rhs).abs() < 1e-4);
        }
    }

    #[test]
    fn test_iteration_cap_returns_best_iterate() {
        let a = [[2.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.5]];
        let b = [1.0, 1.0, 1.0];
        let result = conjugate_gradients(matvec(&a), &b, 1, 1e-10);
        assert!(!result.converged);
        assert_eq!(result.iterations, 1);
        assert!(result.residual_norm < norm(&b));
        assert!(result.solution.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_zero_rhs_is_immediately_converged() {
        let a = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let result = conjugate_gradients(matvec(&a), &[0.0, 0.0, 0.0], 10, 1e-10);
        assert!(result.converged);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.solution, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_indefinite_matrix_stops_safely() {
        let a = [[-1.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.0, 0.0, -1.0]];
        let result = conjugate_gradients(matvec(&a), &[1.0, 0.0, 0.0], 10, 1e-10);
        assert!(!result.converged);
        assert_eq!(result.solution, vec![0.0, 0.0, 0.0]);
    }
}
