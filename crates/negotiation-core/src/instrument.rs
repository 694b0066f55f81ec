use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::present_value::instrument_present_value;
use crate::types::{Money, Percent};
use crate::NegotiationResult;

/// Stable identifier of a payment line, unique within one negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(pub u64);

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The payment instruments a sale can be split across.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    /// Cash ("à vista"), settled on signature.
    Immediate,
    /// Bank slip ("boleto"), discounted at the cost of capital.
    Slip,
    /// Credit card, discounted at the card fee rate.
    Card,
    /// Third-party financing, discounted at the finance rate.
    Financing,
}

/// What a payment kind needs from its plan terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub installments: bool,
    pub periodic_rate: bool,
    pub single_shot: bool,
}

impl PaymentKind {
    pub const ALL: [PaymentKind; 4] = [
        PaymentKind::Immediate,
        PaymentKind::Slip,
        PaymentKind::Card,
        PaymentKind::Financing,
    ];

    pub fn capabilities(self) -> Capabilities {
        match self {
            PaymentKind::Immediate => Capabilities {
                installments: false,
                periodic_rate: false,
                single_shot: true,
            },
            PaymentKind::Slip | PaymentKind::Card | PaymentKind::Financing => Capabilities {
                installments: true,
                periodic_rate: true,
                single_shot: true,
            },
        }
    }

    pub fn max_installments(self) -> u32 {
        match self {
            PaymentKind::Immediate => 1,
            PaymentKind::Slip => 60,
            PaymentKind::Card => 12,
            PaymentKind::Financing => 60,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PaymentKind::Immediate => "immediate",
            PaymentKind::Slip => "slip",
            PaymentKind::Card => "card",
            PaymentKind::Financing => "financing",
        }
    }
}

impl fmt::Display for PaymentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for PaymentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "immediate" | "cash" | "avista" | "a_vista" => Ok(PaymentKind::Immediate),
            "slip" | "boleto" => Ok(PaymentKind::Slip),
            "card" | "credit_card" => Ok(PaymentKind::Card),
            "financing" => Ok(PaymentKind::Financing),
            other => Err(format!("unknown payment kind '{other}'")),
        }
    }
}

/// Plan-specific parameters of an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanTerms {
    pub installment_count: u32,
    /// Percentage per period
    pub periodic_rate: Percent,
    /// First due date as `YYYY-MM-DD`; opaque to the allocation math
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_anchor_date: Option<String>,
}

impl Default for PlanTerms {
    fn default() -> Self {
        Self {
            installment_count: 1,
            periodic_rate: Decimal::ZERO,
            schedule_anchor_date: None,
        }
    }
}

impl PlanTerms {
    pub fn new(installment_count: u32, periodic_rate: Percent) -> Self {
        Self {
            installment_count,
            periodic_rate,
            schedule_anchor_date: None,
        }
    }

    pub fn anchored_at(mut self, date: impl Into<String>) -> Self {
        self.schedule_anchor_date = Some(date.into());
        self
    }

    /// Immediate payments carry a single installment and no rate.
    pub fn normalized_for(mut self, kind: PaymentKind) -> Self {
        let caps = kind.capabilities();
        if !caps.installments {
            self.installment_count = 1;
        }
        if !caps.periodic_rate {
            self.periodic_rate = Decimal::ZERO;
        }
        self
    }
}

/// One payment line of a negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstrument {
    pub id: InstrumentId,
    pub kind: PaymentKind,
    pub face_value: Money,
    pub present_value: Money,
    #[serde(flatten)]
    pub plan: PlanTerms,
    #[serde(default)]
    pub locked: bool,
}

impl PaymentInstrument {
    pub fn new(
        id: InstrumentId,
        kind: PaymentKind,
        face_value: Money,
        plan: PlanTerms,
    ) -> NegotiationResult<Self> {
        let mut instrument = Self {
            id,
            kind,
            face_value,
            present_value: face_value,
            plan: plan.normalized_for(kind),
            locked: false,
        };
        instrument.reprice()?;
        Ok(instrument)
    }

    /// Recompute `present_value` from the current face value and plan.
    pub fn reprice(&mut self) -> NegotiationResult<()> {
        self.present_value = instrument_present_value(self.kind, self.face_value, &self.plan)?;
        Ok(())
    }

    /// Replace the face value and reprice.
    pub fn with_face_value(mut self, face_value: Money) -> NegotiationResult<Self> {
        self.face_value = face_value;
        self.reprice()?;
        Ok(self)
    }

    pub fn discount(&self) -> Money {
        self.face_value - self.present_value
    }
}
