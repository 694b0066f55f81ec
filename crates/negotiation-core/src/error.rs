use rust_decimal::Decimal;
use thiserror::Error;

use crate::instrument::{InstrumentId, PaymentKind};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NegotiationError {
    #[error("Invalid amount: {amount} (must be greater than zero)")]
    InvalidAmount { amount: Decimal },

    #[error("Amount {requested} exceeds the {available} still available to allocate")]
    ExceedsAvailable {
        requested: Decimal,
        available: Decimal,
    },

    #[error("Invalid installment count {count} for {kind:?} (allowed {min}..={max})")]
    InvalidInstallmentCount {
        kind: PaymentKind,
        count: u32,
        min: u32,
        max: u32,
    },

    #[error("Invalid rate: {0}% (must be between 0% and 50%)")]
    InvalidRate(Decimal),

    #[error("Schedule date {date} is before today ({today})")]
    PastDate { date: String, today: String },

    #[error("Instruments total {allocated} exceeds the negotiated total {target}")]
    OverAllocated { allocated: Decimal, target: Decimal },

    #[error("Redistribution already in progress; edit dropped")]
    RedistributionBlocked,

    #[error("Instrument not found: {0}")]
    NotFound(InstrumentId),

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Arithmetic overflow in {context}")]
    Overflow { context: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for NegotiationError {
    fn from(e: serde_json::Error) -> Self {
        NegotiationError::SerializationError(e.to_string())
    }
}

impl From<std::io::Error> for NegotiationError {
    fn from(e: std::io::Error) -> Self {
        NegotiationError::Persistence(e.to_string())
    }
}
