//! # PairSync Engine
//!
//! Pass-based synchronization engine between two entity stores.
//!
//! This crate provides:
//! - The per-pair state machine deriving one action per entity pair
//! - Profile configuration: sync mode, conflict strategy, delete retry
//! - Content-aware initial matching for first contact after state loss
//! - Interception of spurious delete+create pairs via correlation keys
//! - Post-run duplicate detection and removal
//! - Relation persistence (JSON file and in-memory stores)
//! - The pass orchestrator tying it all together
//!
//! ## Architecture
//!
//! The engine implements a **derive-then-execute** model per pass:
//! 1. Load the persisted relation set and enumerate both stores
//! 2. Derive exactly one action per pair (pure, no I/O)
//! 3. Rewrite the action list (interception)
//! 4. Execute actions with per-entity error isolation
//! 5. Persist the updated relation set, then reconcile duplicates
//!
//! ## Key Invariants
//!
//! - At most one relation per A-id and per B-id
//! - Derivation is pure; only execution touches the repositories
//! - Passes are idempotent: a quiescent second pass changes nothing
//! - A failed or cancelled entity leaves its relation untouched, so the
//!   next pass re-derives the same action

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod deriver;
mod duplicates;
mod error;
mod intercept;
mod matcher;
mod orchestrator;
mod store;

pub use config::{AlwaysRetry, DeleteRetryPolicy, NeverRetry, ProfileConfig, SyncMode};
pub use conflict::ConflictStrategy;
pub use deriver::StateDeriver;
pub use duplicates::{reconcile_duplicates, DuplicateTracker, ReconcileOutcome};
pub use error::{EngineError, EngineResult, EntityError, StoreError, StoreResult};
pub use intercept::{intercept_actions, CorrelationKeySource};
pub use matcher::{EventFields, EventMatchCriteria, InitialMatcher, MatchCriteria, MatchOutcome};
pub use orchestrator::{PassSummary, Synchronizer};
pub use store::{JsonFileRelationStore, MemoryRelationStore, RelationStore};
