//! Azure VM cost comparison library
//!
//! This crate provides the core functionality for:
//! - VM inventory, actual cost and CPU utilization collection
//! - Retail price resolution with a persistent cache
//! - Joining everything into one report row per VM
//! - JSON and HTML report rendering

pub mod aggregate;
pub mod arm;
pub mod collector;
pub mod credential;
pub mod error;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod pricing;
pub mod report;

pub use aggregate::{aggregate, classify, EffectiveRates};
pub use arm::{ArmClient, ArmConfig, RetryPolicy};
pub use collector::{Collection, Fetched};
pub use error::{ArmError, CredentialError, ReportError, SubscriptionError};
pub use models::*;
pub use observability::RunLogger;
pub use pipeline::{Pipeline, Progress, RunSummary, SubscriptionFailure, SubscriptionReport};
pub use pricing::{PriceCache, PriceSource, RetailPriceClient};
