use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;
use crate::instrument::{PaymentInstrument, PaymentKind, PlanTerms};
use crate::negotiation::NegotiationTerms;
use crate::types::{total, Money, Percent};
use crate::NegotiationResult;

const MAX_RATE: Decimal = dec!(50);

/// Whether the "exceeds available" check applies to an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Strict,
    /// Redistribution is expected to absorb a temporary overshoot, so the
    /// available-amount check is skipped.
    AutomaticRedistribution,
}

impl ValidationMode {
    pub fn for_automatic_redistribution(enabled: bool) -> Self {
        if enabled {
            ValidationMode::AutomaticRedistribution
        } else {
            ValidationMode::Strict
        }
    }
}

pub fn validate_instrument(
    face_value: Money,
    negotiated_total: Money,
    already_allocated: Money,
    mode: ValidationMode,
) -> NegotiationResult<()> {
    if face_value <= Decimal::ZERO {
        return Err(NegotiationError::InvalidAmount { amount: face_value });
    }
    let available = negotiated_total - already_allocated;
    if mode == ValidationMode::Strict && face_value > available {
        return Err(NegotiationError::ExceedsAvailable {
            requested: face_value,
            available,
        });
    }
    Ok(())
}

pub fn validate_installment_count(count: u32, kind: PaymentKind) -> NegotiationResult<()> {
    let max = kind.max_installments();
    if count < 1 || count > max {
        return Err(NegotiationError::InvalidInstallmentCount {
            kind,
            count,
            min: 1,
            max,
        });
    }
    Ok(())
}

pub fn validate_rate(rate_percent: Percent) -> NegotiationResult<()> {
    if rate_percent < Decimal::ZERO || rate_percent > MAX_RATE {
        return Err(NegotiationError::InvalidRate(rate_percent));
    }
    Ok(())
}

/// Dates are compared as `YYYY-MM-DD` strings, independent of timezone.
pub fn validate_schedule_date(date: &str, today: NaiveDate) -> NegotiationResult<()> {
    let today = today.format("%Y-%m-%d").to_string();
    if date < today.as_str() {
        return Err(NegotiationError::PastDate {
            date: date.to_string(),
            today,
        });
    }
    Ok(())
}

pub fn validate_sum_of_instruments(
    instruments: &[PaymentInstrument],
    negotiated_total: Money,
) -> NegotiationResult<()> {
    let allocated = total(instruments.iter().map(|i| i.face_value));
    if allocated > negotiated_total {
        return Err(NegotiationError::OverAllocated {
            allocated,
            target: negotiated_total,
        });
    }
    Ok(())
}

/// Installment count, rate and first due date of a plan.
pub fn validate_plan(
    kind: PaymentKind,
    plan: &PlanTerms,
    today: NaiveDate,
) -> NegotiationResult<()> {
    let caps = kind.capabilities();
    if caps.installments {
        validate_installment_count(plan.installment_count, kind)?;
    }
    if caps.periodic_rate {
        validate_rate(plan.periodic_rate)?;
    }
    if let Some(date) = plan.schedule_anchor_date.as_deref() {
        validate_schedule_date(date, today)?;
    }
    Ok(())
}

pub fn validate_terms(terms: &NegotiationTerms) -> NegotiationResult<()> {
    if terms.gross_total < Decimal::ZERO {
        return Err(NegotiationError::InvalidInput {
            field: "gross_total".into(),
            reason: "Gross total cannot be negative".into(),
        });
    }
    if terms.discount_percent < Decimal::ZERO || terms.discount_percent > dec!(100) {
        return Err(NegotiationError::InvalidInput {
            field: "discount_percent".into(),
            reason: "Discount must be between 0% and 100%".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::InstrumentId;

    const STRICT: ValidationMode = ValidationMode::Strict;
    const AUTOMATIC: ValidationMode = ValidationMode::AutomaticRedistribution;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn test_non_positive_amount_rejected() {
        let err = validate_instrument(dec!(0), dec!(1000), dec!(0), STRICT).unwrap_err();
        assert_eq!(err, NegotiationError::InvalidAmount { amount: dec!(0) });
        assert!(validate_instrument(dec!(-5), dec!(1000), dec!(0), AUTOMATIC).is_err());
    }

    #[test]
    fn test_exceeds_available_only_in_strict_mode() {
        let err = validate_instrument(dec!(600), dec!(1000), dec!(500), STRICT).unwrap_err();
        assert_eq!(
            err,
            NegotiationError::ExceedsAvailable {
                requested: dec!(600),
                available: dec!(500)
            }
        );
        assert!(validate_instrument(dec!(600), dec!(1000), dec!(500), AUTOMATIC).is_ok());
        assert!(validate_instrument(dec!(500), dec!(1000), dec!(500), STRICT).is_ok());
    }

    #[test]
    fn test_installment_ceilings() {
        assert!(validate_installment_count(1, PaymentKind::Immediate).is_ok());
        assert!(validate_installment_count(2, PaymentKind::Immediate).is_err());
        assert!(validate_installment_count(12, PaymentKind::Card).is_ok());
        assert!(validate_installment_count(13, PaymentKind::Card).is_err());
        assert!(validate_installment_count(60, PaymentKind::Slip).is_ok());
        assert!(validate_installment_count(61, PaymentKind::Financing).is_err());
        assert!(validate_installment_count(0, PaymentKind::Slip).is_err());
    }

    #[test]
    fn test_rate_bounds() {
        assert!(validate_rate(dec!(0)).is_ok());
        assert!(validate_rate(dec!(50)).is_ok());
        assert_eq!(validate_rate(dec!(50.01)), Err(NegotiationError::InvalidRate(dec!(50.01))));
        assert!(validate_rate(dec!(-0.1)).is_err());
    }

    #[test]
    fn test_schedule_date_compares_calendar_days() {
        assert!(validate_schedule_date("2025-03-10", today()).is_ok());
        assert!(validate_schedule_date("2025-04-01", today()).is_ok());
        let err = validate_schedule_date("2025-03-09", today()).unwrap_err();
        assert!(matches!(err, NegotiationError::PastDate { .. }));
    }

    #[test]
    fn test_sum_of_instruments() {
        let inst = |id, kind, value| {
            PaymentInstrument::new(InstrumentId(id), kind, value, PlanTerms::default()).unwrap()
        };
        let a = inst(1, PaymentKind::Immediate, dec!(400));
        let b = inst(2, PaymentKind::Slip, dec!(600));
        let both = vec![a, b];
        assert!(validate_sum_of_instruments(&both, dec!(1000)).is_ok());
        assert_eq!(
            validate_sum_of_instruments(&both, dec!(999)),
            Err(NegotiationError::OverAllocated {
                allocated: dec!(1000),
                target: dec!(999)
            })
        );
    }

    #[test]
    fn test_plan_skips_rate_for_immediate() {
        let plan = PlanTerms::new(1, dec!(80));
        assert!(validate_plan(PaymentKind::Immediate, &plan, today()).is_ok());
        assert!(validate_plan(PaymentKind::Card, &plan, today()).is_err());
    }
}
