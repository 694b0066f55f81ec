//! Property tests for allocation and pricing.
//!
//! - A feasible redistribution always adds up to the negotiated total
//! - Locked instruments never move and no face value goes negative
//! - A plan of two or more installments loses value strictly as the rate rises
//! - A single amount never grows with the rate or the number of periods
//! - Undo after any redistribution restores the previous instruments
//! - History never holds more snapshots than its capacity

use negotiation_core::config::NegotiationConfig;
use negotiation_core::instrument::{InstrumentId, PaymentInstrument, PaymentKind, PlanTerms};
use negotiation_core::negotiation::{Negotiation, NegotiationTerms};
use negotiation_core::present_value::{
    instrument_present_value, present_value, present_value_of_equal_installments,
};
use negotiation_core::redistribution::plan_allocation;
use negotiation_core::{total, Money};
use proptest::{prelude::*, test_runner::TestCaseError};
use rust_decimal::Decimal;

fn fail(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

/// Whole-cent amounts in [0, 10 000.00].
fn cents() -> impl Strategy<Value = Money> {
    (0i64..=1_000_000).prop_map(|c| Decimal::new(c, 2))
}

/// Whole-cent amounts in [0.01, 10 000.00].
fn positive_cents() -> impl Strategy<Value = Money> {
    (1i64..=1_000_000).prop_map(|c| Decimal::new(c, 2))
}

fn kind() -> impl Strategy<Value = PaymentKind> {
    prop::sample::select(PaymentKind::ALL.to_vec())
}

fn installment_kind() -> impl Strategy<Value = PaymentKind> {
    prop::sample::select(vec![PaymentKind::Slip, PaymentKind::Card, PaymentKind::Financing])
}

fn total_of(set: &[PaymentInstrument]) -> Money {
    total(set.iter().map(|i| i.face_value))
}

fn automatic_negotiation() -> Result<Negotiation, TestCaseError> {
    let terms = NegotiationTerms::new(Decimal::new(1_000_000, 2), Decimal::ZERO);
    let config = NegotiationConfig::automatic().with_debounce_ms(0);
    Negotiation::new(terms, config).map_err(fail)
}

/// 2 to 6 instruments, each with a lock flag.
fn instrument_set() -> impl Strategy<Value = Vec<PaymentInstrument>> {
    prop::collection::vec((kind(), cents(), any::<bool>()), 2..=6).prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(idx, (kind, value, locked))| {
                let id = InstrumentId(idx as u64 + 1);
                let mut inst = PaymentInstrument::new(id, kind, value, PlanTerms::default())
                    .expect("undiscounted instrument");
                inst.locked = locked;
                inst
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// With at least one unlocked recipient and a non-negative remainder the
    /// new face values sum to the negotiated total exactly.
    #[test]
    fn feasible_redistribution_sums_to_total(
        mut set in instrument_set(),
        edited in cents(),
        headroom in cents(),
    ) {
        // Make sure instrument 2 can receive.
        set[1].locked = false;
        let locked: Money = total(set.iter().skip(1).filter(|i| i.locked).map(|i| i.face_value));
        let target = edited + locked + headroom;

        let alloc = plan_allocation(&set, InstrumentId(1), edited, target).map_err(fail)?;
        prop_assert_eq!(total_of(&alloc.instruments), target);
    }

    #[test]
    fn locked_values_never_move_and_nothing_goes_negative(
        set in instrument_set(),
        edited in cents(),
        target in cents(),
    ) {
        let alloc = plan_allocation(&set, InstrumentId(1), edited, target).map_err(fail)?;
        for (before, after) in set.iter().zip(alloc.instruments.iter()) {
            prop_assert_eq!(before.id, after.id);
            prop_assert!(after.face_value >= Decimal::ZERO);
            if before.locked && before.id != InstrumentId(1) {
                prop_assert_eq!(before.face_value, after.face_value);
            }
        }
    }

    #[test]
    fn plan_present_value_falls_strictly_with_rate(
        kind in installment_kind(),
        face in positive_cents(),
        count in 2u32..=60,
        low_bp in 0u32..=5_000,
        step_bp in 1u32..=500,
    ) {
        let low = Decimal::new(i64::from(low_bp), 2);
        let high = Decimal::new(i64::from(low_bp + step_bp), 2);
        let at_low = instrument_present_value(kind, face, &PlanTerms::new(count, low))
            .map_err(fail)?;
        let at_high = instrument_present_value(kind, face, &PlanTerms::new(count, high))
            .map_err(fail)?;
        prop_assert!(at_low <= face);
        prop_assert!(at_high < at_low, "{} at {}% vs {} at {}%", at_high, high, at_low, low);
    }

    #[test]
    fn single_amount_present_value_is_monotone(
        face in positive_cents(),
        rate_bp in 1u32..=5_000,
        periods in 1u32..=60,
    ) {
        let rate = Decimal::new(i64::from(rate_bp), 2);
        let higher_rate = rate + Decimal::ONE;
        let pv = present_value(face, rate, periods).map_err(fail)?;
        prop_assert!(pv < face);
        prop_assert!(present_value(face, higher_rate, periods).map_err(fail)? < pv);
        prop_assert!(present_value(face, rate, periods + 1).map_err(fail)? < pv);
    }

    #[test]
    fn single_installment_is_never_discounted(face in cents(), rate_bp in 0u32..=5_000) {
        let rate = Decimal::new(i64::from(rate_bp), 2);
        prop_assert_eq!(present_value_of_equal_installments(face, 1, rate).map_err(fail)?, face);
    }

    #[test]
    fn undo_restores_previous_instruments(
        first in 1i64..=500_000,
        second in 1i64..=500_000,
        edit in 1i64..=1_000_000,
    ) {
        let (first, second) = (Decimal::new(first, 2), Decimal::new(second, 2));
        let mut n = automatic_negotiation()?;
        let a = n.add_instrument(PaymentKind::Immediate, first).map_err(fail)?;
        n.add_instrument(PaymentKind::Slip, second).map_err(fail)?;
        let before = n.instruments().to_vec();

        n.edit_instrument_value(a.id, Decimal::new(edit, 2)).map_err(fail)?;
        n.undo_last_edit().map_err(fail)?;
        prop_assert_eq!(n.instruments(), before.as_slice());
    }

    #[test]
    fn history_is_bounded(edits in prop::collection::vec(1i64..=1_000_000, 1..12)) {
        let mut n = automatic_negotiation()?;
        let a = n.add_instrument(PaymentKind::Immediate, Decimal::new(500_000, 2)).map_err(fail)?;
        n.add_instrument(PaymentKind::Card, Decimal::new(500_000, 2)).map_err(fail)?;

        for value in edits {
            n.edit_instrument_value(a.id, Decimal::new(value, 2)).map_err(fail)?;
            prop_assert!(n.history().len() <= n.config().max_undo_depth);
        }
    }
}
