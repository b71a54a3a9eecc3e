//! CLI command implementations.

pub mod race;
pub mod simulate;
