use chrono::NaiveDate;
use clap::Args;
use serde::Serialize;
use serde_json::Value;

use negotiation_core::clock::{Clock, SystemClock};
use negotiation_core::negotiation::NegotiationState;
use negotiation_core::validation::{
    validate_instrument, validate_plan, validate_sum_of_instruments, validate_terms, ValidationMode,
};
use negotiation_core::{Money, NegotiationResult};

use crate::input;

/// Arguments for validating a saved negotiation
#[derive(Args)]
pub struct ValidateArgs {
    /// Path to the negotiation JSON/YAML file
    #[arg(long)]
    pub input: Option<String>,

    /// Reference date for due-date checks (YYYY-MM-DD, default today)
    #[arg(long)]
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
struct Finding {
    check: &'static str,
    instrument: Option<String>,
    error: String,
}

#[derive(Debug, Serialize)]
struct ValidationReport {
    valid: bool,
    negotiated_total: Money,
    allocated_total: Money,
    findings: Vec<Finding>,
}

fn record(
    findings: &mut Vec<Finding>,
    check: &'static str,
    instrument: Option<String>,
    outcome: NegotiationResult<()>,
) {
    if let Err(e) = outcome {
        findings.push(Finding {
            check,
            instrument,
            error: e.to_string(),
        });
    }
}

pub fn run_validate(args: ValidateArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let state: NegotiationState = input::read_input(args.input.as_deref())?
        .ok_or("--input <negotiation.json> or stdin required for validate")?;
    let today = args.today.unwrap_or_else(|| SystemClock.today());

    let mut findings = Vec::new();
    record(&mut findings, "terms", None, validate_terms(&state.terms));
    record(&mut findings, "config", None, state.config.validate());

    let negotiated_total = state.negotiated_total();
    let allocated_total = state.allocated_total();
    let mode = ValidationMode::for_automatic_redistribution(state.config.automatic_redistribution);

    for instrument in &state.instruments {
        let label = Some(format!("{} {}", instrument.kind, instrument.id));
        let others = allocated_total - instrument.face_value;
        record(
            &mut findings,
            "amount",
            label.clone(),
            validate_instrument(instrument.face_value, negotiated_total, others, mode),
        );
        record(
            &mut findings,
            "plan",
            label,
            validate_plan(instrument.kind, &instrument.plan, today),
        );
    }
    record(
        &mut findings,
        "sum",
        None,
        validate_sum_of_instruments(&state.instruments, negotiated_total),
    );

    let report = ValidationReport {
        valid: findings.is_empty(),
        negotiated_total,
        allocated_total,
        findings,
    };
    Ok(serde_json::to_value(report)?)
}
