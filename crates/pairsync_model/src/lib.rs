//! # PairSync Model
//!
//! Pure data model for the PairSync engine.
//!
//! This crate provides:
//! - The persisted relation record linking one A-entity to one B-entity
//! - The closed set of synchronization actions the state deriver produces
//! - The repository and mapper traits the engine consumes
//! - Content fingerprints for duplicate detection
//!
//! Everything here is generic over the four identifier/version types
//! (`AId`, `AVersion`, `BId`, `BVersion`) so repository-specific types
//! never leak into the engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod action;
mod fingerprint;
mod relation;
mod repository;

pub use action::{ActionKind, SyncAction, SyncDirection};
pub use fingerprint::Fingerprint;
pub use relation::{EntityRelation, RelationError, RelationSet};
pub use repository::{EntityMapper, EntityRepository, MapError, RepoResult, RepositoryError};
