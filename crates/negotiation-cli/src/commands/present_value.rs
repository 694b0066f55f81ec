use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;

use negotiation_core::present_value::present_value;
use negotiation_core::types::with_metadata;
use negotiation_core::{Money, Percent};

use crate::input;

/// Arguments for discounting a single amount
#[derive(Args)]
pub struct PresentValueArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Amount due
    #[arg(long)]
    pub face: Option<Decimal>,

    /// Discount rate per period, in percent (e.g. 2.5)
    #[arg(long, allow_hyphen_values = true)]
    pub rate: Option<Decimal>,

    /// Number of periods until the amount is due
    #[arg(long)]
    pub periods: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PresentValueInput {
    face_value: Money,
    rate: Percent,
    periods: u32,
}

#[derive(Debug, Serialize)]
struct PresentValueOutput {
    face_value: Money,
    present_value: Money,
    discount_amount: Money,
}

pub fn run_present_value(args: PresentValueArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let pv_input: PresentValueInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => PresentValueInput {
            face_value: args.face.ok_or("--face is required (or provide --input)")?,
            rate: args.rate.ok_or("--rate is required (or provide --input)")?,
            periods: args.periods.ok_or("--periods is required (or provide --input)")?,
        },
    };

    let start = Instant::now();
    let pv = present_value(pv_input.face_value, pv_input.rate, pv_input.periods)?;
    let result = PresentValueOutput {
        face_value: pv_input.face_value,
        present_value: pv,
        discount_amount: pv_input.face_value - pv,
    };

    let output = with_metadata(
        "Compound periodic discount: FV / (1 + r)^n",
        &pv_input,
        Vec::new(),
        start.elapsed().as_micros() as u64,
        result,
    );
    Ok(serde_json::to_value(output)?)
}
