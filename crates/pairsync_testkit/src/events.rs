//! Calendar-event fixtures used as the two sides' entity types.

use chrono::{DateTime, Duration, Utc};
use pairsync_engine::EventFields;
use pairsync_model::Fingerprint;

/// Side A entity: an event in the local store, identified by a numeric id
/// the store assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEvent {
    /// Store-assigned id; zero until inserted.
    pub id: u64,
    /// Event title.
    pub title: String,
    /// All-day flag.
    pub all_day: bool,
    /// UTC start instant.
    pub start: DateTime<Utc>,
    /// UTC end instant, if recorded explicitly.
    pub end: Option<DateTime<Utc>>,
    /// Last modification instant, if the store tracked one.
    pub modified: Option<DateTime<Utc>>,
    /// Application-maintained correlation key surviving id reassignment.
    pub correlation_id: Option<String>,
}

impl LocalEvent {
    /// A one-hour timed event starting at `start`.
    pub fn new(title: &str, start: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            all_day: false,
            start,
            end: Some(start + Duration::hours(1)),
            modified: None,
            correlation_id: None,
        }
    }

    /// Turns the event into an all-day entry with no explicit end.
    pub fn with_all_day(mut self) -> Self {
        self.all_day = true;
        self.end = None;
        self
    }

    /// Sets the modification instant.
    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified = Some(at);
        self
    }

    /// Sets the correlation key.
    pub fn with_correlation_id(mut self, key: &str) -> Self {
        self.correlation_id = Some(key.to_string());
        self
    }
}

impl EventFields for LocalEvent {
    fn title(&self) -> &str {
        &self.title
    }
    fn all_day(&self) -> bool {
        self.all_day
    }
    fn start(&self) -> DateTime<Utc> {
        self.start
    }
    fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }
}

/// Side B entity: an event in the remote store, identified by a string uid.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEvent {
    /// Store-assigned uid; empty until inserted.
    pub uid: String,
    /// Event title.
    pub title: String,
    /// All-day flag.
    pub all_day: bool,
    /// UTC start instant.
    pub start: DateTime<Utc>,
    /// UTC end instant, if recorded explicitly.
    pub end: Option<DateTime<Utc>>,
    /// Last modification instant, if the store tracked one.
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEvent {
    /// A one-hour timed event starting at `start`.
    pub fn new(title: &str, start: DateTime<Utc>) -> Self {
        Self {
            uid: String::new(),
            title: title.to_string(),
            all_day: false,
            start,
            end: Some(start + Duration::hours(1)),
            modified: None,
        }
    }

    /// Turns the event into an all-day entry with no explicit end.
    pub fn with_all_day(mut self) -> Self {
        self.all_day = true;
        self.end = None;
        self
    }

    /// Sets the modification instant.
    pub fn with_modified(mut self, at: DateTime<Utc>) -> Self {
        self.modified = Some(at);
        self
    }
}

impl EventFields for RemoteEvent {
    fn title(&self) -> &str {
        &self.title
    }
    fn all_day(&self) -> bool {
        self.all_day
    }
    fn start(&self) -> DateTime<Utc> {
        self.start
    }
    fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }
}

/// Content fingerprint of a local event: title plus the normalized
/// start/end interval.
pub fn local_fingerprint(event: &LocalEvent) -> Option<Fingerprint> {
    let end = event.end.unwrap_or_else(|| {
        if event.all_day {
            event.start + Duration::days(1)
        } else {
            event.start
        }
    });
    Some(Fingerprint::of_event(&event.title, event.start, end))
}
