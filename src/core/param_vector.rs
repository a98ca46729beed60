//! Flat parameter-vector views of burn modules.
//!
//! Trust-region updates work on a single `Vec<f32>` holding every float
//! parameter of the policy in traversal order. The traversal order is
//! deterministic for a given architecture, so a vector extracted from one
//! module can be loaded into any clone of it.
//!
//! ```text
//! flatten_params(policy)        -> θ
//! flatten_grads(policy, grads)  -> ∇θ (zeros for params without grad)
//! load_params(policy, θ')       -> policy with θ' (ids and require_grad kept)
//! gradients_from_flat(model, g) -> GradientsParams for Optimizer::step
//! ```

use burn::module::{Module, ModuleMapper, Param};
use burn::optim::GradientsParams;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

/// Collects parameter values in traversal order.
struct ValueExtractor {
    values: Vec<f32>,
}

impl<B: Backend> ModuleMapper<B> for ValueExtractor {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        self.values.extend(val.into_data().iter::<f32>());
        param
    }
}

/// Collects gradients in traversal order; missing gradients become zeros.
struct GradExtractor<'a, B: AutodiffBackend> {
    grads: &'a B::Gradients,
    values: Vec<f32>,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradExtractor<'_, B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let total_size: usize = val.dims().iter().product();
        match val.grad(self.grads) {
            Some(grad) => self.values.extend(grad.into_data().iter::<f32>()),
            None => self.values.extend(std::iter::repeat(0.0).take(total_size)),
        }
        param
    }
}

/// Writes a flat vector back into the module, one parameter at a time.
struct ValueLoader<'a> {
    values: &'a [f32],
    offset: usize,
}

impl<B: Backend> ModuleMapper<B> for ValueLoader<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let shape = val.dims();
        let total_size: usize = shape.iter().product();
        let end = self.offset + total_size;
        if end > self.values.len() {
            return param;
        }

        let device = val.device();
        let require_grad = val.is_require_grad();
        let slice = &self.values[self.offset..end];
        self.offset = end;

        let loaded = Tensor::<B, 1>::from_floats(slice, &device)
            .reshape(shape)
            .set_require_grad(require_grad);
        Param::initialized(param.id.clone(), loaded)
    }
}

/// Registers slices of a flat gradient under each parameter id.
struct GradientRegistrar<'a> {
    values: &'a [f32],
    offset: usize,
    grads: GradientsParams,
}

impl<B: AutodiffBackend> ModuleMapper<B> for GradientRegistrar<'_> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let shape = val.dims();
        let total_size: usize = shape.iter().product();
        let end = self.offset + total_size;
        if end > self.values.len() {
            return param;
        }

        let device = val.device();
        let slice = &self.values[self.offset..end];
        self.offset = end;

        let grad = Tensor::<B::InnerBackend, 1>::from_floats(slice, &device).reshape(shape);
        self.grads.register::<B::InnerBackend, D>(param.id.clone(), grad);
        param
    }
}

/// All float parameters of `module` as one vector.
pub fn flatten_params<B: Backend, M: Module<B>>(module: &M) -> Vec<f32> {
    let mut extractor = ValueExtractor {
        values: Vec::with_capacity(module.num_params()),
    };
    let _ = module.clone().map(&mut extractor);
    extractor.values
}

/// Gradients of `module` from a backward pass, flattened like [`flatten_params`].
pub fn flatten_grads<B: AutodiffBackend, M: Module<B>>(module: &M, grads: &B::Gradients) -> Vec<f32> {
    let mut extractor = GradExtractor::<B> {
        grads,
        values: Vec::with_capacity(module.num_params()),
    };
    let _ = module.clone().map(&mut extractor);
    extractor.values
}

/// Load a flat vector into `module`.
///
/// `values` must come from [`flatten_params`] on a module of the same
/// architecture; trailing parameters beyond the vector are left untouched.
pub fn load_params<B: Backend, M: Module<B>>(module: M, values: &[f32]) -> M {
    debug_assert_eq!(values.len(), module.num_params(), "flat parameter length mismatch");
    let mut loader = ValueLoader { values, offset: 0 };
    module.map(&mut loader)
}

/// Build optimizer gradients from a flat (typically all-reduced) gradient.
pub fn gradients_from_flat<B: AutodiffBackend, M: Module<B>>(module: &M, values: &[f32]) -> GradientsParams {
    let mut registrar = GradientRegistrar {
        values,
        offset: 0,
        grads: GradientsParams::new(),
    };
    let _ = module.clone().map(&mut registrar);
    registrar.grads
}

/// Dot product accumulated in f64.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum::<f64>() as f32
}

/// Euclidean norm accumulated in f64.
pub fn norm(a: &[f32]) -> f32 {
    a.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt() as f32
}
