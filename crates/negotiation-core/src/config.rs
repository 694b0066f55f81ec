use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;
use crate::instrument::{PaymentKind, PlanTerms};
use crate::types::Percent;
use crate::validation::validate_rate;
use crate::NegotiationResult;

pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 3;
/// Upper bound for `debounce_ms` (one minute)
pub const MAX_DEBOUNCE_MS: u64 = 60_000;

/// Negotiation-level configuration, persisted with the negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// When false, redistribution only runs on an explicit trigger.
    pub automatic_redistribution: bool,
    /// Coalescing window for successive edits
    pub debounce_ms: u64,
    pub max_undo_depth: usize,
    /// Discount presented on the contract before any plan is configured
    pub default_discount_percent: Percent,
    pub default_rates: DefaultRates,
}

/// Periodic rate applied to new instruments of each deferred kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultRates {
    pub slip: Percent,
    pub card: Percent,
    pub financing: Percent,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            automatic_redistribution: false,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            default_discount_percent: Decimal::ZERO,
            default_rates: DefaultRates::default(),
        }
    }
}

impl NegotiationConfig {
    pub fn automatic() -> Self {
        Self {
            automatic_redistribution: true,
            ..Self::default()
        }
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn validate(&self) -> NegotiationResult<()> {
        if self.max_undo_depth == 0 {
            return Err(NegotiationError::InvalidInput {
                field: "max_undo_depth".into(),
                reason: "Undo history must keep at least one snapshot".into(),
            });
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(NegotiationError::InvalidInput {
                field: "debounce_ms".into(),
                reason: format!("Debounce window must be at most {MAX_DEBOUNCE_MS} ms"),
            });
        }
        if self.default_discount_percent < Decimal::ZERO
            || self.default_discount_percent > Decimal::ONE_HUNDRED
        {
            return Err(NegotiationError::InvalidInput {
                field: "default_discount_percent".into(),
                reason: "Default discount must be between 0% and 100%".into(),
            });
        }
        let rates = &self.default_rates;
        for rate in [rates.slip, rates.card, rates.financing] {
            validate_rate(rate)?;
        }
        Ok(())
    }

    /// Plan used for instruments added without explicit terms.
    pub fn default_plan(&self, kind: PaymentKind) -> PlanTerms {
        let rate = match kind {
            PaymentKind::Immediate => Decimal::ZERO,
            PaymentKind::Slip => self.default_rates.slip,
            PaymentKind::Card => self.default_rates.card,
            PaymentKind::Financing => self.default_rates.financing,
        };
        PlanTerms::new(1, rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = NegotiationConfig::default();
        assert!(!cfg.automatic_redistribution);
        assert_eq!(cfg.debounce_ms, 300);
        assert_eq!(cfg.max_undo_depth, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: NegotiationConfig = serde_json::from_str(
            r#"{"automatic_redistribution": true, "default_rates": {"card": "2.99"}}"#,
        )
        .unwrap();
        assert!(cfg.automatic_redistribution);
        assert_eq!(cfg.debounce_ms, 300);
        assert_eq!(cfg.default_plan(PaymentKind::Card).periodic_rate, dec!(2.99));
        assert_eq!(cfg.default_plan(PaymentKind::Slip).periodic_rate, dec!(0));
    }

    #[test]
    fn zero_undo_depth_is_rejected() {
        let cfg = NegotiationConfig {
            max_undo_depth: 0,
            ..NegotiationConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn debounce_window_is_capped() {
        assert!(NegotiationConfig::automatic()
            .with_debounce_ms(MAX_DEBOUNCE_MS)
            .validate()
            .is_ok());
        let err = NegotiationConfig::automatic()
            .with_debounce_ms(10_000_000_000_000_000)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            NegotiationError::InvalidInput { ref field, .. } if field == "debounce_ms"
        ));
    }
}
