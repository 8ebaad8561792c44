// cadence-common: shared types and API protocol for the cadence workspace

pub mod protocol;
pub mod types;
