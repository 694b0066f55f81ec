use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::NegotiationError;
use crate::instrument::{InstrumentId, PaymentInstrument};
use crate::types::{total, Money};
use crate::NegotiationResult;

// ---------------------------------------------------------------------------
// Allocation: pure rebalancing of the instrument set
// ---------------------------------------------------------------------------

/// A request to set one instrument's face value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentEdit {
    pub id: InstrumentId,
    pub new_face_value: Money,
}

/// How the remainder was spread over the redistributable instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Nothing else was unlocked; only the edit applied.
    EditOnly,
    /// A single unlocked instrument absorbed the whole remainder.
    Absorb,
    /// Remainder split in proportion to the previous values.
    Proportional,
    /// Previous values summed to zero; remainder split evenly.
    EqualSplit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub instruments: Vec<PaymentInstrument>,
    pub policy: AllocationPolicy,
    /// Negotiated total minus the edited and locked values (may be negative)
    pub remainder: Money,
}

/// Rebalance `instruments` after `edited` is set to `new_face_value`.
///
/// Locked instruments keep their face value. Unlocked ones share
/// `negotiated_total - (edited + locked)`, never going below zero. Ordering
/// is preserved and every instrument is repriced.
pub fn redistribute(
    instruments: &[PaymentInstrument],
    edited: InstrumentId,
    new_face_value: Money,
    negotiated_total: Money,
) -> NegotiationResult<Vec<PaymentInstrument>> {
    plan_allocation(instruments, edited, new_face_value, negotiated_total).map(|a| a.instruments)
}

pub fn plan_allocation(
    instruments: &[PaymentInstrument],
    edited: InstrumentId,
    new_face_value: Money,
    negotiated_total: Money,
) -> NegotiationResult<Allocation> {
    let edited_idx = instruments
        .iter()
        .position(|i| i.id == edited)
        .ok_or(NegotiationError::NotFound(edited))?;

    let mut out = instruments.to_vec();
    let new_value = new_face_value.max(Decimal::ZERO);
    out[edited_idx].face_value = new_value;

    let locked_total = total(
        out.iter()
            .enumerate()
            .filter(|(idx, i)| *idx != edited_idx && i.locked)
            .map(|(_, i)| i.face_value),
    );
    let redistributable: Vec<usize> = out
        .iter()
        .enumerate()
        .filter(|(idx, i)| *idx != edited_idx && !i.locked)
        .map(|(idx, _)| idx)
        .collect();

    let remainder = negotiated_total - (new_value + locked_total);

    let policy = match redistributable.as_slice() {
        [] => AllocationPolicy::EditOnly,
        [only] => {
            out[*only].face_value = remainder.max(Decimal::ZERO);
            AllocationPolicy::Absorb
        }
        many => spread(&mut out, many, remainder)?,
    };

    for instrument in out.iter_mut() {
        instrument.reprice()?;
    }

    tracing::debug!(
        instrument = %edited,
        new_face_value = %new_value,
        remainder = %remainder,
        policy = ?policy,
        "allocation computed"
    );

    Ok(Allocation {
        instruments: out,
        policy,
        remainder,
    })
}

/// Spread `remainder` over `targets`. The last target takes the exact
/// residual so the parts always add back up to the remainder.
fn spread(
    out: &mut [PaymentInstrument],
    targets: &[usize],
    remainder: Money,
) -> NegotiationResult<AllocationPolicy> {
    let old_sum = total(targets.iter().map(|&idx| out[idx].face_value));
    let policy = if old_sum.is_zero() {
        AllocationPolicy::EqualSplit
    } else {
        AllocationPolicy::Proportional
    };

    if remainder <= Decimal::ZERO {
        for &idx in targets {
            out[idx].face_value = Decimal::ZERO;
        }
        return Ok(policy);
    }

    let count = Decimal::from(targets.len() as u64);
    let mut assigned = Decimal::ZERO;
    let last = targets.len() - 1;
    for (pos, &idx) in targets.iter().enumerate() {
        let share = if pos == last {
            remainder - assigned
        } else if policy == AllocationPolicy::EqualSplit {
            remainder / count
        } else {
            remainder
                .checked_mul(out[idx].face_value)
                .and_then(|v| v.checked_div(old_sum))
                .ok_or_else(|| NegotiationError::Overflow {
                    context: format!("proportional share of {}", out[idx].id),
                })?
        };
        // Rounded shares may not overrun what is left for the last target.
        let share = share.max(Decimal::ZERO).min(remainder - assigned);
        assigned += share;
        out[idx].face_value = share;
    }
    Ok(policy)
}

/// Amount by which the face values exceed `negotiated_total` (zero if not).
pub fn over_allocation(instruments: &[PaymentInstrument], negotiated_total: Money) -> Money {
    (total(instruments.iter().map(|i| i.face_value)) - negotiated_total).max(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Engine: debounce and re-entrancy state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub edit: InstrumentEdit,
    pub deadline: DateTime<Utc>,
}

/// `Idle -> Pending(deadline) -> Allocating -> Idle`
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Pending(PendingEdit),
    /// An allocation, or the emission of its result, is in flight.
    Allocating,
}

#[derive(Debug)]
pub struct RedistributionEngine {
    state: EngineState,
    debounce: Duration,
}

impl RedistributionEngine {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            state: EngineState::Idle,
            debounce: debounce_window(debounce_ms),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn is_allocating(&self) -> bool {
        matches!(self.state, EngineState::Allocating)
    }

    pub fn pending(&self) -> Option<&PendingEdit> {
        match &self.state {
            EngineState::Pending(p) => Some(p),
            _ => None,
        }
    }

    pub fn debounce_ms(&self) -> i64 {
        self.debounce.num_milliseconds()
    }

    pub fn set_debounce_ms(&mut self, debounce_ms: u64) {
        self.debounce = debounce_window(debounce_ms);
    }

    /// Start or restart the debounce window for `edit`. A pending edit is
    /// superseded, not merged, and handed back to the caller.
    pub fn schedule(
        &mut self,
        edit: InstrumentEdit,
        now: DateTime<Utc>,
    ) -> NegotiationResult<Option<InstrumentEdit>> {
        if self.is_allocating() {
            return Err(NegotiationError::RedistributionBlocked);
        }
        let deadline = now
            .checked_add_signed(self.debounce)
            .ok_or_else(|| NegotiationError::Overflow {
                context: format!(
                    "debounce deadline {}ms after {now}",
                    self.debounce.num_milliseconds()
                ),
            })?;
        let previous = std::mem::replace(
            &mut self.state,
            EngineState::Pending(PendingEdit { edit, deadline }),
        );
        Ok(match previous {
            EngineState::Pending(p) => Some(p.edit),
            _ => None,
        })
    }

    /// The pending edit, if its window has elapsed.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<InstrumentEdit> {
        let due = matches!(&self.state, EngineState::Pending(p) if now >= p.deadline);
        if due {
            self.take_pending()
        } else {
            None
        }
    }

    pub fn take_pending(&mut self) -> Option<InstrumentEdit> {
        match std::mem::take(&mut self.state) {
            EngineState::Pending(p) => Some(p.edit),
            other => {
                self.state = other;
                None
            }
        }
    }

    pub fn cancel(&mut self) -> Option<InstrumentEdit> {
        self.take_pending()
    }

    /// Enter `Allocating`. The returned guard puts the engine back when it
    /// is dropped, whether the allocation succeeded, failed or unwound.
    pub fn begin_allocation(&mut self) -> NegotiationResult<AllocationGuard<'_>> {
        let resume = match std::mem::replace(&mut self.state, EngineState::Allocating) {
            EngineState::Allocating => return Err(NegotiationError::RedistributionBlocked),
            EngineState::Pending(p) => Some(p),
            EngineState::Idle => None,
        };
        Ok(AllocationGuard {
            state: &mut self.state,
            resume,
        })
    }
}

fn debounce_window(debounce_ms: u64) -> Duration {
    i64::try_from(debounce_ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .unwrap_or(Duration::MAX)
}

/// Holds the engine in `Allocating` for as long as it lives.
#[derive(Debug)]
pub struct AllocationGuard<'a> {
    state: &'a mut EngineState,
    resume: Option<PendingEdit>,
}

impl AllocationGuard<'_> {
    /// Port handed to observers while the result is being emitted.
    pub fn reentry_port(&self) -> ReentryPort<'_> {
        ReentryPort {
            state: &*self.state,
            dropped: Vec::new(),
        }
    }
}

impl Drop for AllocationGuard<'_> {
    fn drop(&mut self) {
        *self.state = match self.resume.take() {
            Some(p) => EngineState::Pending(p),
            None => EngineState::Idle,
        };
    }
}

/// Channel through which an observer may issue edits synchronously while an
/// allocation is being emitted. Such edits are dropped, never queued.
#[derive(Debug)]
pub struct ReentryPort<'g> {
    state: &'g EngineState,
    dropped: Vec<InstrumentEdit>,
}

impl ReentryPort<'_> {
    pub fn edit_instrument_value(
        &mut self,
        id: InstrumentId,
        new_face_value: Money,
    ) -> NegotiationResult<()> {
        debug_assert!(matches!(self.state, EngineState::Allocating));
        tracing::warn!(
            instrument = %id,
            new_face_value = %new_face_value,
            "re-entrant edit dropped while allocation in progress"
        );
        self.dropped.push(InstrumentEdit { id, new_face_value });
        Err(NegotiationError::RedistributionBlocked)
    }

    pub fn into_dropped(self) -> Vec<InstrumentEdit> {
        self.dropped
    }
}
