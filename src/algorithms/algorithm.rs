//! Algorithm selection.
//!
//! Variants are a closed set resolved by name when the configuration is
//! built; the trainer branches on the enum, never on strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::runners::ConfigError;

/// Supported trust-region variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlgorithmKind {
    /// Plain TRPO on the reward advantage.
    Trpo,
    /// Lagrangian TRPO: penalized advantage, multiplier learned per epoch.
    TrpoLag,
    /// TRPO on the Saute-augmented environment.
    #[default]
    TrpoSaute,
}

impl AlgorithmKind {
    pub fn name(self) -> &'static str {
        match self {
            AlgorithmKind::Trpo => "TRPO",
            AlgorithmKind::TrpoLag => "TRPOLag",
            AlgorithmKind::TrpoSaute => "TRPOSaute",
        }
    }

    pub fn uses_saute(self) -> bool {
        self == AlgorithmKind::TrpoSaute
    }

    pub fn uses_lagrange(self) -> bool {
        self == AlgorithmKind::TrpoLag
    }

    pub fn all() -> [AlgorithmKind; 3] {
        [AlgorithmKind::Trpo, AlgorithmKind::TrpoLag, AlgorithmKind::TrpoSaute]
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlgorithmKind::all()
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownAlgorithm(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("TRPO".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::Trpo);
        assert_eq!("TRPOLag".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::TrpoLag);
        assert_eq!("trposaute".parse::<AlgorithmKind>().unwrap(), AlgorithmKind::TrpoSaute);
    }

    #[test]
    fn test_unknown_name() {
        let err = "PPO".parse::<AlgorithmKind>().unwrap_err();
        assert_eq!(err, ConfigError::UnknownAlgorithm("PPO".to_string()));
    }

    #[test]
    fn test_display_roundtrip() {
        for kind in AlgorithmKind::all() {
            assert_eq!(kind.to_string().parse::<AlgorithmKind>().unwrap(), kind);
        }
    }
}
