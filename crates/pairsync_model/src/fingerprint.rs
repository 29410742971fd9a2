//! Content fingerprints for duplicate detection.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A content-derived value used only for duplicate detection.
///
/// Fingerprints are held in memory for the duration of a pass and never
/// persisted; change detection uses version tokens, not fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Digests an ordered sequence of byte fields.
    ///
    /// Each field is length-prefixed before hashing so that field
    /// boundaries cannot be shifted between inputs that concatenate to the
    /// same bytes.
    pub fn digest<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Fingerprints the common calendar-event shape: title plus UTC
    /// start/end instants.
    pub fn of_event(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self::digest([
            title.as_bytes(),
            &start.timestamp_millis().to_be_bytes()[..],
            &end.timestamp_millis().to_be_bytes()[..],
        ])
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
