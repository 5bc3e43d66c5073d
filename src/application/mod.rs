//! Application layer: data source seams, the live channel, reconciliation
//! and optimistic mutations.

pub mod error;
pub mod live;
pub mod mutations;
pub mod pagination;
pub mod reconcile;
pub mod repos;
pub mod snapshot;
pub mod views;
