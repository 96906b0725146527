//! FILENAME: engine/src/config.rs
//! PURPOSE: Numeric and locale settings shared by every expression of a report.
//! CONTEXT: The configuration must be settled before the first evaluation.
//! It can be built in code or loaded from JSON; missing keys fall back to
//! 256 bit precision, round-to-nearest and the "C" locale.

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::numeric::{NumericContext, RoundingMode};
use crate::temporal::DateOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Binary precision of numbers, as in MPFR.
    pub precision_bits: u32,
    pub rounding: RoundingMode,
    /// Locale name such as "C", "en_US" or "hu_HU.UTF-8".
    pub locale: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            precision_bits: 256,
            rounding: RoundingMode::Nearest,
            locale: "C".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn numeric_context(&self) -> NumericContext {
        NumericContext::new(self.precision_bits, self.rounding)
    }

    pub fn date_order(&self) -> DateOrder {
        DateOrder::for_locale(&self.locale)
    }

    /// Whether numbers in this locale are written with a decimal comma.
    pub fn uses_decimal_comma(&self) -> bool {
        let language = self
            .locale
            .split(|c| c == '_' || c == '-' || c == '.')
            .next()
            .unwrap_or("");
        matches!(
            language,
            "de" | "fr" | "hu" | "it" | "es" | "pt" | "nl" | "pl" | "cs" | "sk" | "ru" | "sv"
                | "da" | "fi" | "nb" | "tr" | "ro" | "hr" | "sl" | "uk" | "el"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.precision_bits, 256);
        assert_eq!(config.rounding, RoundingMode::Nearest);
        assert_eq!(config.numeric_context().digits(), 78);
        assert!(!config.uses_decimal_comma());
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"precision_bits": 64, "locale": "hu_HU.UTF-8"}"#)
            .unwrap();
        assert_eq!(config.precision_bits, 64);
        assert_eq!(config.rounding, RoundingMode::Nearest);
        assert!(config.uses_decimal_comma());
        assert_eq!(config.date_order(), DateOrder::DayFirst);
    }

    #[test]
    fn test_from_json_rounding() {
        let config = EngineConfig::from_json(r#"{"rounding": "toward_zero", "locale": "en_US"}"#)
            .unwrap();
        assert_eq!(config.rounding, RoundingMode::TowardZero);
        assert_eq!(config.date_order(), DateOrder::MonthFirst);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(EngineConfig::from_json("{precision").is_err());
    }
}
