use negotiation_core::instrument::{InstrumentId, PaymentInstrument, PaymentKind, PlanTerms};
use negotiation_core::present_value::{
    implied_discount_percent, instrument_present_value, present_value,
    present_value_of_equal_installments, price_plan, PlanPricingInput,
};
use negotiation_core::schedule::installment_schedule;
use negotiation_core::NegotiationError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn assert_close(actual: Decimal, expected: Decimal, tolerance: Decimal) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}

// ===========================================================================
// Single amounts
// ===========================================================================

#[test]
fn test_present_value_two_periods() {
    // 121 / 1.1^2 = 100
    let pv = present_value(dec!(121), dec!(10), 2).unwrap();
    assert_eq!(pv, dec!(100));
}

#[test]
fn test_present_value_decreases_with_periods() {
    let near = present_value(dec!(1000), dec!(2), 3).unwrap();
    let far = present_value(dec!(1000), dec!(2), 12).unwrap();
    assert!(far < near);
    assert!(near < dec!(1000));
}

// ===========================================================================
// Equal installments
// ===========================================================================

#[test]
fn test_twelve_installments_at_two_percent() {
    // 1000/12 per month, annuity factor (1 - 1.02^-12)/0.02 = 10.5753
    let pv = present_value_of_equal_installments(dec!(1000), 12, dec!(2)).unwrap();
    assert_close(pv, dec!(881.2784), dec!(0.001));
}

#[test]
fn test_zero_rate_plan_keeps_face_value() {
    let pv = present_value_of_equal_installments(dec!(6000), 24, Decimal::ZERO).unwrap();
    assert_eq!(pv, dec!(6000));
}

#[test]
fn test_immediate_ignores_rate_and_count() {
    let plan = PlanTerms::new(10, dec!(5));
    let pv = instrument_present_value(PaymentKind::Immediate, dec!(750), &plan).unwrap();
    assert_eq!(pv, dec!(750));
}

#[test]
fn test_card_single_installment_is_undiscounted() {
    let plan = PlanTerms::new(1, dec!(3));
    let pv = instrument_present_value(PaymentKind::Card, dec!(750), &plan).unwrap();
    assert_eq!(pv, dec!(750));
}

#[test]
fn test_implied_discount_percent() {
    assert_eq!(implied_discount_percent(dec!(1000), dec!(900)), dec!(10));
    assert_eq!(implied_discount_percent(dec!(1000), dec!(1000)), Decimal::ZERO);
}

#[test]
fn test_card_twelve_installments_at_three_and_a_half() {
    let plan = PlanTerms::new(12, dec!(3.5));
    let pv = instrument_present_value(PaymentKind::Card, dec!(1200), &plan).unwrap();
    assert!(pv < dec!(1200));
    assert_close(pv, dec!(966.3334), dec!(0.0001));
    assert!(implied_discount_percent(dec!(1200), pv) > Decimal::ZERO);
}

// ===========================================================================
// Plan pricing envelope
// ===========================================================================

#[test]
fn test_price_plan_financing() {
    let input = PlanPricingInput {
        kind: PaymentKind::Financing,
        total: dec!(1000),
        installment_count: 12,
        periodic_rate: dec!(2),
    };
    let result = price_plan(&input).unwrap();
    let pricing = &result.result;

    assert_eq!(pricing.installment_count, 12);
    assert_close(pricing.installment_value, dec!(83.3333), dec!(0.0001));
    assert_close(pricing.present_value, dec!(881.2784), dec!(0.001));
    assert_eq!(pricing.discount_amount, pricing.face_value - pricing.present_value);
    assert_close(pricing.implied_discount_percent, dec!(11.872), dec!(0.001));
    assert!(result.warnings.is_empty());
}

#[test]
fn test_price_plan_warns_on_immediate_installments() {
    let input = PlanPricingInput {
        kind: PaymentKind::Immediate,
        total: dec!(500),
        installment_count: 6,
        periodic_rate: dec!(1),
    };
    let result = price_plan(&input).unwrap();
    assert_eq!(result.result.installment_count, 1);
    assert_eq!(result.result.present_value, dec!(500));
    assert!(!result.warnings.is_empty());
}

#[test]
fn test_price_plan_rejects_zero_installments() {
    let input = PlanPricingInput {
        kind: PaymentKind::Slip,
        total: dec!(500),
        installment_count: 0,
        periodic_rate: dec!(1),
    };
    match price_plan(&input) {
        Err(NegotiationError::InvalidInput { field, .. }) => assert_eq!(field, "installment_count"),
        other => panic!("expected InvalidInput, got {other:?}"),
    }
}

// ===========================================================================
// Installment calendar
// ===========================================================================

#[test]
fn test_schedule_rows_match_instrument_present_value() {
    let inst = PaymentInstrument::new(
        InstrumentId(7),
        PaymentKind::Slip,
        dec!(1200),
        PlanTerms::new(4, dec!(1)).anchored_at("2025-03-10"),
    )
    .unwrap();
    let rows = installment_schedule(&inst).unwrap();

    assert_eq!(rows.len(), 4);
    assert_eq!(rows.iter().map(|r| r.amount).sum::<Decimal>(), dec!(1200));
    assert_close(
        rows.iter().map(|r| r.present_value).sum::<Decimal>(),
        inst.present_value,
        dec!(0.000001),
    );
    assert_eq!(rows[3].due_date.unwrap().to_string(), "2025-06-10");
}
