use chrono::{DateTime, Utc};
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use negotiation_core::clock::{Clock, ManualClock, SystemClock};
use negotiation_core::config::NegotiationConfig;
use negotiation_core::instrument::{InstrumentId, PaymentKind, PlanTerms};
use negotiation_core::negotiation::{Negotiation, NegotiationTerms, UndoOutcome};
use negotiation_core::persistence::{JsonFileStore, NegotiationStore};
use negotiation_core::{Money, NegotiationResult, Percent};

use crate::input;

/// Arguments for replaying an edit script
#[derive(Args)]
pub struct SimulateArgs {
    /// Path to JSON/YAML script file
    #[arg(long)]
    pub input: Option<String>,

    /// Persist every committed step to this JSON file, resuming from it if
    /// it already exists
    #[arg(long)]
    pub state_file: Option<String>,

    /// Stop at the first failing step instead of recording it and moving on
    #[arg(long)]
    pub stop_on_error: bool,
}

#[derive(Debug, Deserialize)]
struct Script {
    terms: NegotiationTerms,
    #[serde(default)]
    config: NegotiationConfig,
    /// Virtual start time; defaults to now
    #[serde(default)]
    start: Option<DateTime<Utc>>,
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Step {
    Add {
        kind: PaymentKind,
        value: Money,
        #[serde(default)]
        plan: Option<PlanTerms>,
    },
    Edit {
        id: InstrumentId,
        value: Money,
    },
    Lock {
        id: InstrumentId,
    },
    Remove {
        id: InstrumentId,
    },
    Undo,
    Auto {
        enabled: bool,
    },
    /// Move the virtual clock and run a redistribution that became due.
    Advance {
        ms: u64,
    },
    Flush,
    Redistribute {
        id: InstrumentId,
    },
    Plan {
        id: InstrumentId,
        plan: PlanTerms,
    },
    Terms {
        gross_total: Money,
        discount_percent: Percent,
    },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Add { .. } => "add",
            Step::Edit { .. } => "edit",
            Step::Lock { .. } => "lock",
            Step::Remove { .. } => "remove",
            Step::Undo => "undo",
            Step::Auto { .. } => "auto",
            Step::Advance { .. } => "advance",
            Step::Flush => "flush",
            Step::Redistribute { .. } => "redistribute",
            Step::Plan { .. } => "plan",
            Step::Terms { .. } => "terms",
        }
    }
}

#[derive(Debug, Serialize)]
struct StepReport {
    step: usize,
    op: &'static str,
    ok: bool,
    detail: Value,
    remaining_to_allocate: Money,
}

fn apply(
    negotiation: &mut Negotiation,
    clock: &ManualClock,
    step: Step,
) -> NegotiationResult<Value> {
    let detail = match step {
        Step::Add { kind, value, plan } => {
            let added = match plan {
                Some(plan) => negotiation.add_instrument_with_plan(kind, value, plan)?,
                None => negotiation.add_instrument(kind, value)?,
            };
            serde_json::to_value(added)?
        }
        Step::Edit { id, value } => {
            serde_json::to_value(negotiation.edit_instrument_value(id, value)?)?
        }
        Step::Lock { id } => json!({ "locked": negotiation.toggle_lock(id)? }),
        Step::Remove { id } => serde_json::to_value(negotiation.remove_instrument(id)?)?,
        Step::Undo => match negotiation.undo_last_edit()? {
            Some(UndoOutcome::Restored(snapshot)) => json!({ "restored": snapshot.label }),
            Some(UndoOutcome::PendingEditCancelled(edit)) => json!({ "cancelled": edit }),
            None => json!({ "restored": null }),
        },
        Step::Auto { enabled } => {
            negotiation.set_automatic_redistribution(enabled)?;
            json!({ "automatic_redistribution": enabled })
        }
        Step::Advance { ms } => {
            clock.advance_ms(ms);
            json!({ "now": clock.now(), "redistributed": negotiation.poll()? })
        }
        Step::Flush => json!({ "redistributed": negotiation.flush_pending()? }),
        Step::Redistribute { id } => serde_json::to_value(negotiation.redistribute_from(id)?)?,
        Step::Plan { id, plan } => serde_json::to_value(negotiation.update_plan(id, plan)?)?,
        Step::Terms {
            gross_total,
            discount_percent,
        } => {
            negotiation.set_terms(NegotiationTerms::new(gross_total, discount_percent))?;
            json!({ "negotiated_total": negotiation.negotiated_total() })
        }
    };
    Ok(detail)
}

pub fn run_simulate(args: SimulateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let script: Script = input::read_input(args.input.as_deref())?
        .ok_or("--input <script.json> or stdin required for simulate")?;
    script.config.validate()?;

    let clock = ManualClock::new(script.start.unwrap_or_else(|| SystemClock.now()));
    let mut negotiation = match args.state_file.as_deref() {
        Some(path) => {
            let store = JsonFileStore::new(path);
            let resumed = match store.load()? {
                Some(state) => Negotiation::from_state(state)?,
                None => Negotiation::new(script.terms, script.config)?,
            };
            resumed.with_clock(clock.clone()).with_store(store)
        }
        None => Negotiation::new(script.terms, script.config)?.with_clock(clock.clone()),
    };

    let mut steps = Vec::with_capacity(script.steps.len());
    for (idx, step) in script.steps.into_iter().enumerate() {
        let op = step.name();
        let outcome = apply(&mut negotiation, &clock, step);
        let failed = outcome.is_err();
        let (ok, detail) = match outcome {
            Ok(detail) => (true, detail),
            Err(e) => (false, json!({ "error": e.to_string() })),
        };
        steps.push(StepReport {
            step: idx + 1,
            op,
            ok,
            detail,
            remaining_to_allocate: negotiation.remaining_to_allocate(),
        });
        if failed && args.stop_on_error {
            break;
        }
    }

    Ok(json!({
        "steps": steps,
        "instruments": negotiation.instruments(),
        "summary": negotiation.summary(),
        "pending_edit": negotiation.pending_edit().map(|p| json!({
            "id": p.edit.id,
            "new_face_value": p.edit.new_face_value,
            "due_at": p.deadline,
        })),
        "history": negotiation.history().labels(),
    }))
}
