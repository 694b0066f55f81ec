use chrono::NaiveDate;
use clap::Args;
use serde::Deserialize;
use serde_json::{json, Value};

use negotiation_core::clock::{Clock, SystemClock};
use negotiation_core::instrument::{InstrumentId, PaymentInstrument, PaymentKind, PlanTerms};
use negotiation_core::schedule::installment_schedule;
use negotiation_core::validation::validate_plan;
use negotiation_core::{total, Money, NegotiationResult};

use crate::input;

/// Arguments for building an installment calendar
#[derive(Args)]
pub struct ScheduleArgs {
    /// Path to JSON/YAML instrument file
    #[arg(long)]
    pub input: Option<String>,

    /// First due date (YYYY-MM-DD), overriding the file's anchor
    #[arg(long)]
    pub anchor_date: Option<String>,

    /// Reference date for the anchor check (YYYY-MM-DD, default today)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

/// An instrument as written by hand: no id or present value required.
#[derive(Debug, Deserialize)]
struct ScheduleInput {
    #[serde(default)]
    id: Option<InstrumentId>,
    kind: PaymentKind,
    face_value: Money,
    #[serde(flatten)]
    plan: PlanTerms,
}

pub fn run_schedule(args: ScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let schedule_input: ScheduleInput = input::read_input(args.input.as_deref())?
        .ok_or("--input <instrument.json> or stdin required for schedule")?;
    let today = args.today.unwrap_or_else(|| SystemClock.today());
    Ok(build_schedule(schedule_input, args.anchor_date, today)?)
}

fn build_schedule(
    schedule_input: ScheduleInput,
    anchor_date: Option<String>,
    today: NaiveDate,
) -> NegotiationResult<Value> {
    let kind = schedule_input.kind;
    let mut plan = schedule_input.plan.normalized_for(kind);
    if let Some(date) = anchor_date {
        plan = plan.anchored_at(date);
    }
    validate_plan(kind, &plan, today)?;

    let id = schedule_input.id.unwrap_or(InstrumentId(1));
    let instrument = PaymentInstrument::new(id, kind, schedule_input.face_value, plan)?;
    let installments = installment_schedule(&instrument)?;
    let total_present_value = total(installments.iter().map(|i| i.present_value));

    Ok(json!({
        "instrument": instrument,
        "total_present_value": total_present_value,
        "installments": installments,
    }))
}
