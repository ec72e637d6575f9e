//! Scene-wide configuration.

use serde::{Deserialize, Serialize};

/// Configuration for a [`crate::Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SceneConfig {
    /// Decimal places kept for numbers in serialized documents.
    pub num_fraction_digits: u32,
    /// Reject unrecognized property names instead of storing them as
    /// opaque custom data.
    pub strict_properties: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            num_fraction_digits: 4,
            strict_properties: false,
        }
    }
}

impl SceneConfig {
    /// Round `value` to the configured number of fraction digits.
    #[must_use]
    pub fn round(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return value;
        }
        let digits = i32::try_from(self.num_fraction_digits.min(15)).unwrap_or(15);
        let factor = 10f64.powi(digits);
        let rounded = (value * factor).round() / factor;
        // avoid serializing -0
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SceneConfig::default();
        assert_eq!(config.num_fraction_digits, 4);
        assert!(!config.strict_properties);
    }

    #[test]
    fn test_round() {
        let config = SceneConfig::default();
        assert_eq!(config.round(1.234_56), 1.2346);
        assert_eq!(config.round(-0.000_01), 0.0);
        assert!(config.round(-0.000_01).is_sign_positive());
        let coarse = SceneConfig {
            num_fraction_digits: 0,
            ..SceneConfig::default()
        };
        assert_eq!(coarse.round(2.5), 3.0);
    }

    #[test]
    fn test_partial_deserialize() {
        let config: SceneConfig = serde_json::from_str(r#"{"strictProperties":true}"#).expect("de");
        assert!(config.strict_properties);
        assert_eq!(config.num_fraction_digits, 4);
    }
}
