pub mod plan;
pub mod present_value;
pub mod schedule;
pub mod simulate;
pub mod validate;
