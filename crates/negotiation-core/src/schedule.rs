use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;
use crate::instrument::PaymentInstrument;
use crate::present_value::present_value;
use crate::types::Money;
use crate::validation::validate_installment_count;
use crate::NegotiationResult;

/// One row of an instrument's installment calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Installment {
    /// 1-indexed
    pub number: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    pub amount: Money,
    pub present_value: Money,
}

pub fn parse_anchor_date(date: &str) -> NegotiationResult<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| NegotiationError::InvalidInput {
        field: "schedule_anchor_date".into(),
        reason: format!("'{date}' is not a YYYY-MM-DD date: {e}"),
    })
}

/// Monthly installment calendar starting at the instrument's anchor date.
///
/// Amounts are equal splits of the face value; the last installment takes
/// the residual so the rows add up to the face value exactly. Due dates that
/// fall past the end of a month are clamped to its last day.
pub fn installment_schedule(instrument: &PaymentInstrument) -> NegotiationResult<Vec<Installment>> {
    let anchor = instrument
        .plan
        .schedule_anchor_date
        .as_deref()
        .map(parse_anchor_date)
        .transpose()?;

    let count = if instrument.kind.capabilities().installments {
        let count = instrument.plan.installment_count.max(1);
        validate_installment_count(count, instrument.kind)?;
        count
    } else {
        1
    };
    let discounted = count > 1;
    let installment = instrument.face_value / Decimal::from(count);

    let mut rows = Vec::with_capacity(count as usize);
    let mut scheduled = Decimal::ZERO;
    for number in 1..=count {
        let amount = if number == count {
            instrument.face_value - scheduled
        } else {
            installment
        };
        scheduled += amount;

        let due_date = match anchor {
            Some(start) => Some(start.checked_add_months(Months::new(number - 1)).ok_or_else(|| {
                NegotiationError::InvalidInput {
                    field: "schedule_anchor_date".into(),
                    reason: format!("installment {number} falls outside the supported calendar"),
                }
            })?),
            None => None,
        };

        let pv = if discounted {
            present_value(amount, instrument.plan.periodic_rate, number)?
        } else {
            amount
        };

        rows.push(Installment {
            number,
            due_date,
            amount,
            present_value: pv,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::{InstrumentId, PaymentKind, PlanTerms};
    use crate::types::total;
    use rust_decimal_macros::dec;

    #[test]
    fn monthly_dates_clamp_to_month_end() {
        let inst = PaymentInstrument::new(
            InstrumentId(1),
            PaymentKind::Slip,
            dec!(300),
            PlanTerms::new(3, dec!(0)).anchored_at("2025-01-31"),
        )
        .unwrap();
        let rows = installment_schedule(&inst).unwrap();
        let dates: Vec<_> = rows.iter().map(|r| r.due_date.unwrap().to_string()).collect();
        assert_eq!(dates, vec!["2025-01-31", "2025-02-28", "2025-03-31"]);
    }

    #[test]
    fn amounts_add_up_to_face_value() {
        let inst = PaymentInstrument::new(
            InstrumentId(1),
            PaymentKind::Financing,
            dec!(1000),
            PlanTerms::new(3, dec!(1.5)),
        )
        .unwrap();
        let rows = installment_schedule(&inst).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(total(rows.iter().map(|r| r.amount)), dec!(1000));
        let pv = total(rows.iter().map(|r| r.present_value));
        assert!((pv - inst.present_value).abs() < dec!(0.000001));
        assert!(rows.iter().all(|r| r.due_date.is_none()));
    }

    #[test]
    fn immediate_is_a_single_undiscounted_row() {
        let inst = PaymentInstrument::new(
            InstrumentId(1),
            PaymentKind::Immediate,
            dec!(450),
            PlanTerms::default().anchored_at("2025-06-01"),
        )
        .unwrap();
        let rows = installment_schedule(&inst).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].present_value, dec!(450));
        assert_eq!(rows[0].due_date, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn malformed_anchor_is_rejected() {
        let inst = PaymentInstrument::new(
            InstrumentId(1),
            PaymentKind::Card,
            dec!(100),
            PlanTerms::new(2, dec!(1)).anchored_at("01/02/2025"),
        )
        .unwrap();
        assert!(matches!(
            installment_schedule(&inst),
            Err(NegotiationError::InvalidInput { .. })
        ));
    }

    #[test]
    fn installment_count_above_kind_limit_is_rejected() {
        let inst = PaymentInstrument::new(
            InstrumentId(1),
            PaymentKind::Slip,
            dec!(100),
            PlanTerms::new(4_000_000_000, dec!(0)),
        )
        .unwrap();
        assert!(matches!(
            installment_schedule(&inst),
            Err(NegotiationError::InvalidInstallmentCount { count: 4_000_000_000, max: 60, .. })
        ));
    }
}
