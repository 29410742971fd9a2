//! # PairSync Testkit
//!
//! Test utilities for PairSync.
//!
//! This crate provides:
//! - Calendar-event fixtures for both sides of a sync profile
//! - In-memory repositories with deterministic enumeration order
//! - One-shot failure injection for every repository operation
//! - A field mapper and a static correlation key source
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pairsync_testkit::prelude::*;
//!
//! let local = LocalEventRepository::new();
//! let remote = RemoteEventRepository::new();
//! local.insert(LocalEvent::new("Standup", start));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod mapper;
pub mod repos;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::events::*;
    pub use crate::mapper::*;
    pub use crate::repos::*;
}

pub use events::*;
pub use mapper::*;
pub use repos::*;
