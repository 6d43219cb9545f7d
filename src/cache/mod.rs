//! Cache implementation modules

pub mod config;
pub mod coordinator;
pub mod recency;
pub mod serde;
pub mod tier;
pub mod traits;
pub mod worker;
