use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::NegotiationError;
use crate::instrument::{PaymentKind, PlanTerms};
use crate::types::{with_metadata, ComputationOutput, Money, Percent};
use crate::validation::{validate_installment_count, validate_rate};
use crate::NegotiationResult;

const HUNDRED: Decimal = dec!(100);

/// Present value of a single amount due `periods` periods from now.
pub fn present_value(
    face_value: Money,
    rate_percent: Percent,
    periods: u32,
) -> NegotiationResult<Money> {
    if rate_percent.is_zero() || periods == 0 {
        return Ok(face_value);
    }
    if rate_percent <= dec!(-100) {
        return Err(NegotiationError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }

    let factor = (Decimal::ONE + rate_percent / HUNDRED)
        .checked_powi(i64::from(periods))
        .ok_or_else(|| NegotiationError::Overflow {
            context: format!("discount factor over {periods} periods"),
        })?;

    face_value
        .checked_div(factor)
        .ok_or_else(|| NegotiationError::DivisionByZero {
            context: "present value discount factor".into(),
        })
}

/// Present value of `total` paid in `installment_count` equal installments,
/// the first one due one period from now.
pub fn present_value_of_equal_installments(
    total: Money,
    installment_count: u32,
    rate_percent: Percent,
) -> NegotiationResult<Money> {
    // A single due date carries no discount.
    if installment_count <= 1 || rate_percent.is_zero() {
        return Ok(total);
    }

    let installment = total / Decimal::from(installment_count);
    let mut pv = Decimal::ZERO;
    for n in 1..=installment_count {
        pv += present_value(installment, rate_percent, n)?;
    }
    Ok(pv)
}

/// Effective discount granted by a plan, as a percentage of its face value.
pub fn implied_discount_percent(total: Money, present_value_total: Money) -> Percent {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    (total - present_value_total) / total * HUNDRED
}

/// Present value of one instrument given its kind and plan.
pub fn instrument_present_value(
    kind: PaymentKind,
    face_value: Money,
    plan: &PlanTerms,
) -> NegotiationResult<Money> {
    let caps = kind.capabilities();
    if !caps.installments || (caps.single_shot && plan.installment_count <= 1) {
        return Ok(face_value);
    }
    present_value_of_equal_installments(face_value, plan.installment_count, plan.periodic_rate)
}

// ---------------------------------------------------------------------------
// Plan pricing
// ---------------------------------------------------------------------------

/// Input for pricing a payment plan in isolation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPricingInput {
    pub kind: PaymentKind,
    /// Nominal amount financed by the plan
    pub total: Money,
    pub installment_count: u32,
    /// Percentage per period
    pub periodic_rate: Percent,
}

/// Result of pricing a payment plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPricing {
    pub kind: PaymentKind,
    pub face_value: Money,
    pub installment_count: u32,
    pub installment_value: Money,
    pub present_value: Money,
    pub discount_amount: Money,
    pub implied_discount_percent: Percent,
}

/// Price a plan: installment value, present value and the implied discount.
pub fn price_plan(input: &PlanPricingInput) -> NegotiationResult<ComputationOutput<PlanPricing>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.total < Decimal::ZERO {
        return Err(NegotiationError::InvalidInput {
            field: "total".into(),
            reason: "Plan total cannot be negative".into(),
        });
    }
    if input.installment_count == 0 {
        return Err(NegotiationError::InvalidInput {
            field: "installment_count".into(),
            reason: "Number of installments must be > 0".into(),
        });
    }

    let caps = input.kind.capabilities();
    if caps.installments {
        validate_installment_count(input.installment_count, input.kind)?;
    }
    if caps.periodic_rate {
        validate_rate(input.periodic_rate)?;
    }

    let plan =
        PlanTerms::new(input.installment_count, input.periodic_rate).normalized_for(input.kind);
    if plan.installment_count != input.installment_count {
        warnings.push(format!(
            "{} payments are settled in a single installment; installment count ignored",
            input.kind
        ));
    }
    if input.installment_count > input.kind.max_installments() {
        warnings.push(format!(
            "{} plans allow at most {} installments",
            input.kind,
            input.kind.max_installments()
        ));
    }

    let pv = instrument_present_value(input.kind, input.total, &plan)?;
    let pricing = PlanPricing {
        kind: input.kind,
        face_value: input.total,
        installment_count: plan.installment_count,
        installment_value: input.total / Decimal::from(plan.installment_count),
        present_value: pv,
        discount_amount: input.total - pv,
        implied_discount_percent: implied_discount_percent(input.total, pv),
    };

    let elapsed = start.elapsed().as_micros() as u64;

    Ok(with_metadata(
        "Present value of equal installments (compound periodic discount)",
        input,
        warnings,
        elapsed,
        pricing,
    ))
}
