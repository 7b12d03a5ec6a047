#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`SecurityError`)
//! - [`version`]: Version ordering, affected-range matching, npm range lower bounds
//! - [`advisory_db`]: Bundled and local advisory database (`AdvisoryDb`)
//! - [`targets`]: Scan target extraction from the dependents index
//! - [`provider`]: `SecurityProvider` trait, the four providers, `ProviderRegistry`
//! - [`aggregate`]: Concurrent provider execution, dedup, threshold filter (`Aggregator`)
//! - [`planner`]: Alert → override write plan with confirmation (`PatchPlanner`)
//!
//! # Architecture
//!
//! ```text
//! DependentsIndex + root Manifest --> collect_targets --> Vec<ScanTarget>
//!                                                              |
//!        ProviderRegistry [offline | github | snyk | npm-audit]
//!                  |  (JoinSet, per-provider timeout)
//!              Aggregator --> AggregateReport { alerts, outcomes }
//!                                      |
//!                  PatchPlanner + DecisionSource --> WritePlan
//! ```

pub mod advisory_db;
pub mod aggregate;
pub mod error;
pub mod planner;
pub mod provider;
pub mod targets;
pub mod version;

// --- Public API Re-exports ---

// Error
pub use error::SecurityError;

// Providers
pub use advisory_db::{AdvisoryDb, AdvisoryRecord};
pub use provider::{
    GithubProvider, NpmAuditProvider, OfflineProvider, Provider, ProviderRegistry,
    SecurityProvider, SnykProvider, StaticProvider,
};

// Aggregation + planning
pub use aggregate::{AggregateReport, Aggregator, ProviderOutcome, ProviderStatus};
pub use planner::{
    AcceptAll, Decision, DecisionSource, PatchCandidate, PatchPlanner, PlanMode, PlanOutcome,
    ScriptedDecisions, detect_lockfile,
};
pub use targets::collect_targets;
