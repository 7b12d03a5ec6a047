#![doc = include_str!("../README.md")]
//!
//! # Module Structure
//!
//! - [`error`]: Domain error type (`ManifestError`)
//! - [`manifest`]: `package.json` model, format detection, rendering (`Manifest`, `ManifestId`)
//! - [`overrides`]: Parsing of `overrides` / `resolutions` / `pnpm.overrides` (`OverrideEntry`)
//! - [`appendix`]: The `pinkeeper.appendix` block (`Appendix`, `AppendixEntry`)
//! - [`edits`]: Typed edit accumulator rendered in one pass (`ManifestEdits`)
//! - [`workspace`]: Workspace glob expansion (`WorkspaceResolver`, `WorkspaceSpec`)
//! - [`graph`]: Direct-dependency index (`DependentsIndex`, `IndexContribution`)
//! - [`plan`]: Write plan types (`WritePlan`, `PlanEntry`)
//! - [`reconcile`]: Appendix reconciliation (`Reconciler`, `Reconciliation`, `OrphanNotice`)
//! - [`writer`]: Staging and atomic replacement (`stage`, `ManifestWriter`)
//!
//! # Architecture
//!
//! ```text
//! WorkspaceResolver --> Vec<Manifest> --> IndexContribution (per manifest)
//!                                                  |
//!                                           DependentsIndex
//!                                                  |
//!                        WritePlan (security) --> Reconciler (per manifest)
//!                                                  |
//!                                            ManifestEdits
//!                                                  |
//!                                   stage --> StagedWrite --> ManifestWriter
//! ```

pub mod appendix;
pub mod edits;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod overrides;
pub mod plan;
pub mod reconcile;
mod splice;
pub mod workspace;
pub mod writer;

// --- Public API Re-exports ---

// Error
pub use error::ManifestError;

// Model
pub use appendix::{Appendix, AppendixEntry};
pub use edits::ManifestEdits;
pub use manifest::{Manifest, ManifestId};
pub use overrides::OverrideEntry;

// Workspace + graph
pub use graph::{Dependent, DependentsIndex, IndexContribution};
pub use workspace::{ResolvedWorkspace, WorkspaceResolver, WorkspaceSpec};

// Reconciliation + writing
pub use plan::{PlanEntry, WritePlan};
pub use reconcile::{OrphanNotice, Reconciler, Reconciliation, SkippedPlanEntry};
pub use writer::{ManifestWriter, StagedWrite, stage};
