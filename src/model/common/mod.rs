//! Types shared between the database, API and voting layers.

pub mod audit;
pub mod election;
