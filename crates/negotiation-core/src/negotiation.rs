use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::clock::{Clock, SystemClock};
use crate::config::NegotiationConfig;
use crate::error::NegotiationError;
use crate::history::{Snapshot, SnapshotHistory};
use crate::instrument::{InstrumentId, PaymentInstrument, PaymentKind, PlanTerms};
use crate::persistence::{NegotiationStore, NullStore};
use crate::present_value::implied_discount_percent;
use crate::redistribution::{
    over_allocation, plan_allocation, AllocationGuard, AllocationPolicy, InstrumentEdit,
    PendingEdit, RedistributionEngine, ReentryPort,
};
use crate::types::{total, Money, Percent};
use crate::validation::{validate_instrument, validate_plan, validate_terms, ValidationMode};
use crate::NegotiationResult;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Commercial terms supplied by the upstream budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationTerms {
    /// Pre-discount total of all contracted items
    pub gross_total: Money,
    pub discount_percent: Percent,
}

impl NegotiationTerms {
    pub fn new(gross_total: Money, discount_percent: Percent) -> Self {
        Self {
            gross_total,
            discount_percent,
        }
    }

    /// `gross_total * (1 - discount_percent / 100)`
    pub fn negotiated_total(&self) -> Money {
        self.gross_total * (Decimal::ONE - self.discount_percent / Decimal::ONE_HUNDRED)
    }
}

/// Everything that is persisted for one negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationState {
    pub terms: NegotiationTerms,
    #[serde(default)]
    pub config: NegotiationConfig,
    #[serde(default)]
    pub instruments: Vec<PaymentInstrument>,
    #[serde(default = "first_instrument_id")]
    pub next_id: u64,
}

fn first_instrument_id() -> u64 {
    1
}

impl NegotiationState {
    pub fn new(terms: NegotiationTerms, config: NegotiationConfig) -> Self {
        Self {
            terms,
            config,
            instruments: Vec::new(),
            next_id: first_instrument_id(),
        }
    }

    pub fn negotiated_total(&self) -> Money {
        self.terms.negotiated_total()
    }

    pub fn allocated_total(&self) -> Money {
        total(self.instruments.iter().map(|i| i.face_value))
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&PaymentInstrument> {
        self.instruments.iter().find(|i| i.id == id)
    }

    fn position(&self, id: InstrumentId) -> NegotiationResult<usize> {
        self.instruments
            .iter()
            .position(|i| i.id == id)
            .ok_or(NegotiationError::NotFound(id))
    }
}

// ---------------------------------------------------------------------------
// Outbound records
// ---------------------------------------------------------------------------

/// Figures consumed by summary and contract views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationSummary {
    pub gross_total: Money,
    pub discount_percent: Percent,
    pub negotiated_total: Money,
    pub allocated_total: Money,
    pub remaining_to_allocate: Money,
    pub present_value_total: Money,
    pub implied_discount_percent: Percent,
    pub instrument_count: usize,
    pub automatic_redistribution: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "instrument", rename_all = "snake_case")]
pub enum UpdateCause {
    Added(InstrumentId),
    Edited(InstrumentId),
    Redistributed(InstrumentId),
    LockToggled(InstrumentId),
    PlanChanged(InstrumentId),
    Removed(InstrumentId),
    Undone,
    TermsChanged,
    ConfigChanged,
}

/// What observers receive after every committed mutation.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentsUpdate<'a> {
    pub cause: UpdateCause,
    pub instruments: &'a [PaymentInstrument],
    pub negotiated_total: Money,
    pub remaining_to_allocate: Money,
}

/// Consumer of committed instrument sets (summary views, contract
/// rendering). Edits issued through `reentry` while the update is being
/// delivered are dropped.
pub trait NegotiationObserver {
    fn instruments_changed(
        &mut self,
        update: &InstrumentsUpdate<'_>,
        reentry: &mut ReentryPort<'_>,
    );
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllocationOutcome {
    pub edited: InstrumentId,
    pub policy: AllocationPolicy,
    pub remainder: Money,
    pub negotiated_total: Money,
    /// Edits observers attempted during emission
    pub dropped_edits: Vec<InstrumentEdit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    /// Automatic redistribution is off; only the edited instrument changed.
    Applied,
    Redistributed(AllocationOutcome),
    /// Waiting for the debounce window; see [`Negotiation::poll`].
    Deferred { due_at: DateTime<Utc> },
}

/// What a call to [`Negotiation::undo_last_edit`] reverted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "undone", rename_all = "snake_case")]
pub enum UndoOutcome {
    /// A deferred edit was still waiting for its window; it was dropped and
    /// history was left alone.
    PendingEditCancelled(InstrumentEdit),
    /// The most recent snapshot was applied and removed from history.
    Restored(Snapshot),
}

// ---------------------------------------------------------------------------
// Facade
// ---------------------------------------------------------------------------

/// One negotiation's payment plan. Each public operation either commits
/// completely (persisted, then emitted) or leaves the state untouched.
pub struct Negotiation {
    state: NegotiationState,
    history: SnapshotHistory,
    engine: RedistributionEngine,
    clock: Box<dyn Clock>,
    store: Box<dyn NegotiationStore>,
    observers: Vec<Box<dyn NegotiationObserver>>,
}

impl fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiation")
            .field("state", &self.state)
            .field("history", &self.history)
            .field("engine", &self.engine)
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Negotiation {
    pub fn new(terms: NegotiationTerms, config: NegotiationConfig) -> NegotiationResult<Self> {
        Self::from_state(NegotiationState::new(terms, config))
    }

    pub fn from_state(state: NegotiationState) -> NegotiationResult<Self> {
        validate_terms(&state.terms)?;
        state.config.validate()?;
        let next_free = state.instruments.iter().map(|i| i.id.0 + 1).max().unwrap_or(1);
        let state = NegotiationState {
            next_id: state.next_id.max(next_free),
            ..state
        };
        Ok(Self {
            history: SnapshotHistory::with_capacity(state.config.max_undo_depth),
            engine: RedistributionEngine::new(state.config.debounce_ms),
            state,
            clock: Box::new(SystemClock),
            store: Box::new(NullStore),
            observers: Vec::new(),
        })
    }

    /// Load a previously saved negotiation from `store`.
    pub fn restore(
        store: impl NegotiationStore + 'static,
        clock: impl Clock + 'static,
    ) -> NegotiationResult<Option<Self>> {
        match store.load()? {
            Some(state) => {
                let restored = Self::from_state(state)?.with_clock(clock).with_store(store);
                Ok(Some(restored))
            }
            None => Ok(None),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_store(mut self, store: impl NegotiationStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn subscribe(&mut self, observer: impl NegotiationObserver + 'static) {
        self.observers.push(Box::new(observer));
    }

    // -- Read access ---------------------------------------------------------

    pub fn state(&self) -> &NegotiationState {
        &self.state
    }

    pub fn config(&self) -> &NegotiationConfig {
        &self.state.config
    }

    pub fn instruments(&self) -> &[PaymentInstrument] {
        &self.state.instruments
    }

    pub fn instrument(&self, id: InstrumentId) -> Option<&PaymentInstrument> {
        self.state.instrument(id)
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn pending_edit(&self) -> Option<&PendingEdit> {
        self.engine.pending()
    }

    pub fn negotiated_total(&self) -> Money {
        self.state.negotiated_total()
    }

    pub fn remaining_to_allocate(&self) -> Money {
        self.state.negotiated_total() - self.state.allocated_total()
    }

    pub fn summary(&self) -> NegotiationSummary {
        let allocated_total = self.state.allocated_total();
        let present_value_total =
            total(self.state.instruments.iter().map(|i| i.present_value));
        NegotiationSummary {
            gross_total: self.state.terms.gross_total,
            discount_percent: self.state.terms.discount_percent,
            negotiated_total: self.state.negotiated_total(),
            allocated_total,
            remaining_to_allocate: self.state.negotiated_total() - allocated_total,
            present_value_total,
            implied_discount_percent: implied_discount_percent(
                allocated_total,
                present_value_total,
            ),
            instrument_count: self.state.instruments.len(),
            automatic_redistribution: self.state.config.automatic_redistribution,
        }
    }

    /// Discount the contract should present: the plan's implied discount, or
    /// the configured default while no payment plan exists.
    pub fn contract_discount_percent(&self) -> Percent {
        if self.state.instruments.is_empty() {
            return self.state.config.default_discount_percent;
        }
        self.summary().implied_discount_percent
    }

    // -- Mutations -----------------------------------------------------------

    pub fn add_instrument(
        &mut self,
        kind: PaymentKind,
        initial_value: Money,
    ) -> NegotiationResult<PaymentInstrument> {
        let plan = self.state.config.default_plan(kind);
        self.add_instrument_with_plan(kind, initial_value, plan)
    }

    pub fn add_instrument_with_plan(
        &mut self,
        kind: PaymentKind,
        initial_value: Money,
        plan: PlanTerms,
    ) -> NegotiationResult<PaymentInstrument> {
        validate_instrument(
            initial_value,
            self.state.negotiated_total(),
            self.state.allocated_total(),
            self.validation_mode(),
        )?;
        let plan = plan.normalized_for(kind);
        validate_plan(kind, &plan, self.clock.today())?;

        let id = InstrumentId(self.state.next_id);
        let instrument = PaymentInstrument::new(id, kind, initial_value, plan)?;

        let mut candidate = self.state.clone();
        candidate.next_id += 1;
        candidate.instruments.push(instrument.clone());

        self.commit_recorded(candidate, UpdateCause::Added(id), format!("add {kind} {id}"))?;
        Ok(instrument)
    }

    /// Set an instrument's face value.
    ///
    /// With automatic redistribution off the edit is applied as is. With it
    /// on, the other unlocked instruments are rebalanced, either immediately
    /// (`debounce_ms == 0`) or once the debounce window elapses.
    pub fn edit_instrument_value(
        &mut self,
        id: InstrumentId,
        new_value: Money,
    ) -> NegotiationResult<EditOutcome> {
        let idx = self.state.position(id)?;
        let current = &self.state.instruments[idx];
        let others = self.state.allocated_total() - current.face_value;
        validate_instrument(
            new_value,
            self.state.negotiated_total(),
            others,
            self.validation_mode(),
        )?;

        let edit = InstrumentEdit {
            id,
            new_face_value: new_value,
        };

        if !self.state.config.automatic_redistribution {
            let label = format!("edit {} {} to {}", current.kind, id, new_value);
            let mut candidate = self.state.clone();
            candidate.instruments[idx].face_value = new_value;
            candidate.instruments[idx].reprice()?;

            self.commit_recorded(candidate, UpdateCause::Edited(id), label)?;
            return Ok(EditOutcome::Applied);
        }

        if self.state.config.debounce_ms == 0 {
            return self.run_allocation(edit).map(EditOutcome::Redistributed);
        }

        // An edit to another instrument must not swallow the one in flight.
        if self.engine.pending().is_some_and(|p| p.edit.id != id) {
            self.flush_pending()?;
        }

        let now = self.clock.now();
        self.engine.schedule(edit, now)?;
        let due_at = self
            .engine
            .pending()
            .map(|p| p.deadline)
            .unwrap_or(now);
        tracing::debug!(
            instrument = %id,
            value = %new_value,
            due_at = %due_at,
            "redistribution deferred"
        );
        Ok(EditOutcome::Deferred { due_at })
    }

    /// Run the pending redistribution if its debounce window has elapsed.
    pub fn poll(&mut self) -> NegotiationResult<Option<AllocationOutcome>> {
        match self.engine.take_due(self.clock.now()) {
            Some(edit) => self.run_allocation(edit).map(Some),
            None => Ok(None),
        }
    }

    /// Run the pending redistribution now, without waiting for the window.
    pub fn flush_pending(&mut self) -> NegotiationResult<Option<AllocationOutcome>> {
        match self.engine.take_pending() {
            Some(edit) => self.run_allocation(edit).map(Some),
            None => Ok(None),
        }
    }

    /// Manual trigger: rebalance the others around `id`'s current value,
    /// whatever the automatic flag says.
    pub fn redistribute_from(&mut self, id: InstrumentId) -> NegotiationResult<AllocationOutcome> {
        if let Some(flushed) = self.flush_pending()? {
            if flushed.edited == id {
                return Ok(flushed);
            }
        }
        let value = self
            .state
            .instrument(id)
            .map(|i| i.face_value)
            .ok_or(NegotiationError::NotFound(id))?;
        self.run_allocation(InstrumentEdit {
            id,
            new_face_value: value,
        })
    }

    /// Flip the lock flag. Returns the new value.
    pub fn toggle_lock(&mut self, id: InstrumentId) -> NegotiationResult<bool> {
        let idx = self.state.position(id)?;
        let mut candidate = self.state.clone();
        let locked = !candidate.instruments[idx].locked;
        candidate.instruments[idx].locked = locked;
        self.commit_outside_allocation(candidate, UpdateCause::LockToggled(id))?;
        Ok(locked)
    }

    /// Change installments, rate or first due date and reprice.
    pub fn update_plan(
        &mut self,
        id: InstrumentId,
        plan: PlanTerms,
    ) -> NegotiationResult<PaymentInstrument> {
        let idx = self.state.position(id)?;
        let kind = self.state.instruments[idx].kind;
        let plan = plan.normalized_for(kind);
        validate_plan(kind, &plan, self.clock.today())?;

        let mut candidate = self.state.clone();
        candidate.instruments[idx].plan = plan;
        candidate.instruments[idx].reprice()?;
        let updated = candidate.instruments[idx].clone();

        let label = format!("plan {kind} {id}");
        self.commit_recorded(candidate, UpdateCause::PlanChanged(id), label)?;
        Ok(updated)
    }

    /// Remove an instrument. With automatic redistribution on, its value is
    /// first released to the remaining unlocked instruments.
    pub fn remove_instrument(&mut self, id: InstrumentId) -> NegotiationResult<PaymentInstrument> {
        let idx = self.state.position(id)?;
        let removed = self.state.instruments[idx].clone();
        let label = format!("remove {} {}", removed.kind, id);

        if self.engine.pending().is_some_and(|p| p.edit.id == id) {
            self.engine.cancel();
        }

        let mut candidate = self.state.clone();
        if self.state.config.automatic_redistribution && self.state.instruments.len() > 1 {
            let negotiated_total = self.state.negotiated_total();
            let allocation =
                plan_allocation(&self.state.instruments, id, Decimal::ZERO, negotiated_total)
                    .inspect_err(|e| {
                        tracing::warn!(
                            instrument = %id,
                            error = %e,
                            "redistribution on removal aborted"
                        )
                    })?;
            candidate.instruments = allocation.instruments;
        }
        candidate.instruments.retain(|i| i.id != id);

        self.commit_recorded(candidate, UpdateCause::Removed(id), label)?;
        Ok(removed)
    }

    pub fn set_automatic_redistribution(&mut self, enabled: bool) -> NegotiationResult<()> {
        let mut candidate = self.state.clone();
        candidate.config.automatic_redistribution = enabled;
        self.commit_outside_allocation(candidate, UpdateCause::ConfigChanged)?;
        if !enabled {
            if let Some(dropped) = self.engine.cancel() {
                tracing::info!(instrument = %dropped.id, "pending redistribution cancelled");
            }
        }
        Ok(())
    }

    /// Replace the commercial terms. Instruments are left as they are.
    pub fn set_terms(&mut self, terms: NegotiationTerms) -> NegotiationResult<()> {
        validate_terms(&terms)?;
        let mut candidate = self.state.clone();
        candidate.terms = terms;
        self.commit_outside_allocation(candidate, UpdateCause::TermsChanged)
    }

    /// Revert the most recent user action.
    ///
    /// A deferred edit still inside its debounce window has not touched the
    /// instruments yet, so undoing it only drops it. Otherwise the most
    /// recent snapshot is restored. Returns `None` when there is nothing to
    /// undo.
    pub fn undo_last_edit(&mut self) -> NegotiationResult<Option<UndoOutcome>> {
        if let Some(cancelled) = self.engine.cancel() {
            tracing::info!(
                instrument = %cancelled.id,
                value = %cancelled.new_face_value,
                "pending redistribution cancelled by undo"
            );
            return Ok(Some(UndoOutcome::PendingEditCancelled(cancelled)));
        }
        let Some(snapshot) = self.history.peek().cloned() else {
            return Ok(None);
        };

        let mut candidate = self.state.clone();
        candidate.instruments = snapshot.instruments.clone();
        self.commit_outside_allocation(candidate, UpdateCause::Undone)?;
        self.history.undo();
        tracing::info!(snapshot = snapshot.id, label = %snapshot.label, "undo applied");
        Ok(Some(UndoOutcome::Restored(snapshot)))
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    // -- Internals -----------------------------------------------------------

    fn validation_mode(&self) -> ValidationMode {
        ValidationMode::for_automatic_redistribution(self.state.config.automatic_redistribution)
    }

    fn capture(&mut self, label: String) {
        let now = self.clock.now();
        self.history.capture(label, &self.state.instruments, now);
    }

    /// Commit a user mutation and record the instruments it replaced. A
    /// rejected commit leaves history as it was.
    fn commit_recorded(
        &mut self,
        candidate: NegotiationState,
        cause: UpdateCause,
        label: String,
    ) -> NegotiationResult<()> {
        let replaced = self.state.instruments.clone();
        self.commit_outside_allocation(candidate, cause)?;
        let now = self.clock.now();
        self.history.capture(label, &replaced, now);
        Ok(())
    }

    /// Capture, allocate, check, persist and emit under the engine guard.
    fn run_allocation(&mut self, edit: InstrumentEdit) -> NegotiationResult<AllocationOutcome> {
        let kind = self
            .state
            .position(edit.id)
            .map(|idx| self.state.instruments[idx].kind)?;
        self.capture(format!("edit {} {} to {}", kind, edit.id, edit.new_face_value));

        let negotiated_total = self.state.negotiated_total();
        let guard = self.engine.begin_allocation()?;

        let allocation = plan_allocation(
            &self.state.instruments,
            edit.id,
            edit.new_face_value,
            negotiated_total,
        )
        .inspect_err(|e| {
            tracing::warn!(instrument = %edit.id, error = %e, "redistribution aborted")
        })?;

        let before = over_allocation(&self.state.instruments, negotiated_total);
        let after = over_allocation(&allocation.instruments, negotiated_total);
        if after > before {
            let err = NegotiationError::OverAllocated {
                allocated: total(allocation.instruments.iter().map(|i| i.face_value)),
                target: negotiated_total,
            };
            tracing::warn!(instrument = %edit.id, error = %err, "redistribution aborted");
            return Err(err);
        }

        let mut candidate = self.state.clone();
        candidate.instruments = allocation.instruments;
        let dropped_edits = commit(
            &mut self.state,
            self.store.as_mut(),
            &mut self.observers,
            &guard,
            candidate,
            UpdateCause::Redistributed(edit.id),
        )?;
        drop(guard);

        Ok(AllocationOutcome {
            edited: edit.id,
            policy: allocation.policy,
            remainder: allocation.remainder,
            negotiated_total,
            dropped_edits,
        })
    }

    fn commit_outside_allocation(
        &mut self,
        candidate: NegotiationState,
        cause: UpdateCause,
    ) -> NegotiationResult<()> {
        let guard = self.engine.begin_allocation()?;
        commit(
            &mut self.state,
            self.store.as_mut(),
            &mut self.observers,
            &guard,
            candidate,
            cause,
        )?;
        Ok(())
    }
}

/// Persist `candidate`, swap it in, then notify observers. Nothing changes
/// if the store rejects the save.
fn commit(
    state: &mut NegotiationState,
    store: &mut dyn NegotiationStore,
    observers: &mut [Box<dyn NegotiationObserver>],
    guard: &AllocationGuard<'_>,
    candidate: NegotiationState,
    cause: UpdateCause,
) -> NegotiationResult<Vec<InstrumentEdit>> {
    store
        .save(&candidate)
        .inspect_err(|e| {
            tracing::warn!(cause = ?cause, error = %e, "negotiation not saved; change rejected")
        })?;
    *state = candidate;

    let negotiated_total = state.negotiated_total();
    let update = InstrumentsUpdate {
        cause,
        instruments: &state.instruments,
        negotiated_total,
        remaining_to_allocate: negotiated_total - state.allocated_total(),
    };
    tracing::info!(
        cause = ?cause,
        instruments = update.instruments.len(),
        remaining = %update.remaining_to_allocate,
        "negotiation committed"
    );

    let mut port = guard.reentry_port();
    for observer in observers.iter_mut() {
        observer.instruments_changed(&update, &mut port);
    }
    Ok(port.into_dropped())
}
