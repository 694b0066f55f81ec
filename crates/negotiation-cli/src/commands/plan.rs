use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use negotiation_core::instrument::PaymentKind;
use negotiation_core::present_value::{price_plan, PlanPricingInput};

use crate::input;

/// Arguments for pricing an installment plan
#[derive(Args)]
pub struct PlanArgs {
    /// Path to JSON/YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Payment kind: immediate, slip, card or financing
    #[arg(long)]
    pub kind: Option<PaymentKind>,

    /// Amount financed by the plan
    #[arg(long)]
    pub total: Option<Decimal>,

    /// Number of equal installments
    #[arg(long, default_value_t = 1)]
    pub installments: u32,

    /// Rate per period, in percent
    #[arg(long, default_value_t = Decimal::ZERO)]
    pub rate: Decimal,
}

pub fn run_plan(args: PlanArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let plan_input: PlanPricingInput = match input::read_input(args.input.as_deref())? {
        Some(parsed) => parsed,
        None => PlanPricingInput {
            kind: args.kind.ok_or("--kind is required (or provide --input)")?,
            total: args.total.ok_or("--total is required (or provide --input)")?,
            installment_count: args.installments,
            periodic_rate: args.rate,
        },
    };

    let result = price_plan(&plan_input)?;
    Ok(serde_json::to_value(result)?)
}
