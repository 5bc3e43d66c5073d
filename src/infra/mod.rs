//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod graphql;
pub mod identity;
pub mod memory;
pub mod telemetry;
