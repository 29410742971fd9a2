//! Initial matching of unrelated entities on first contact.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tracing::debug;

/// The content comparison the initial matcher runs on unrelated entities.
///
/// `group_key_*` is a coarse derived key (e.g. a case-folded title) used to
/// bucket candidates cheaply; `is_match` is the exact equality predicate
/// tested inside each bucket.
pub trait MatchCriteria<A, B> {
    /// Coarse grouping key for an A-entity.
    fn group_key_a(&self, a: &A) -> String;

    /// Coarse grouping key for a B-entity.
    fn group_key_b(&self, b: &B) -> String;

    /// Exact equality over the semantically meaningful fields.
    fn is_match(&self, a: &A, b: &B) -> bool;
}

impl<T, A, B> MatchCriteria<A, B> for &T
where
    T: MatchCriteria<A, B> + ?Sized,
{
    fn group_key_a(&self, a: &A) -> String {
        (**self).group_key_a(a)
    }

    fn group_key_b(&self, b: &B) -> String {
        (**self).group_key_b(b)
    }

    fn is_match(&self, a: &A, b: &B) -> bool {
        (**self).is_match(a, b)
    }
}

/// The result of one matching run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome<AId, BId> {
    /// Matched (A-id, B-id) pairs.
    pub pairs: Vec<(AId, BId)>,
    /// A-ids with no counterpart; they fall through to create logic.
    pub unmatched_a: Vec<AId>,
    /// B-ids with no counterpart.
    pub unmatched_b: Vec<BId>,
}

/// Pairs up unrelated A/B entities on first contact, so that a lost
/// relation store (cache loss, reinstallation) re-pairs entities instead of
/// re-creating them.
///
/// Matching is 1:1 per group with first-available pairing: once a candidate
/// on either side is consumed it is removed from further matching in the
/// pass. The predicate is strict field equality, which can pair two
/// coincidentally identical entities (e.g. two all-day events with the same
/// title on the same day); that is an accepted heuristic tradeoff.
#[derive(Debug)]
pub struct InitialMatcher<C> {
    criteria: C,
}

impl<C> InitialMatcher<C> {
    /// Creates a matcher with the given criteria.
    pub fn new(criteria: C) -> Self {
        Self { criteria }
    }

    /// Matches the given unrelated entities. Input order is preserved in
    /// the outcome, which keeps the run deterministic for a stable
    /// enumeration order.
    pub fn match_entities<AId, A, BId, B>(
        &self,
        a_entities: &[(AId, &A)],
        b_entities: &[(BId, &B)],
    ) -> MatchOutcome<AId, BId>
    where
        AId: Clone,
        BId: Clone,
        C: MatchCriteria<A, B>,
    {
        // Bucket B candidates by coarse key; indices keep input order.
        let mut b_buckets: HashMap<String, Vec<usize>> = HashMap::new();
        for (index, (_, b)) in b_entities.iter().enumerate() {
            b_buckets
                .entry(self.criteria.group_key_b(b))
                .or_default()
                .push(index);
        }

        let mut b_consumed = vec![false; b_entities.len()];
        let mut pairs = Vec::new();
        let mut unmatched_a = Vec::new();

        for (a_id, a) in a_entities {
            let key = self.criteria.group_key_a(a);
            let candidate = b_buckets.get(&key).into_iter().flatten().find(|&&index| {
                !b_consumed[index] && self.criteria.is_match(a, b_entities[index].1)
            });
            match candidate {
                Some(&index) => {
                    b_consumed[index] = true;
                    pairs.push((a_id.clone(), b_entities[index].0.clone()));
                }
                None => unmatched_a.push(a_id.clone()),
            }
        }

        let unmatched_b = b_entities
            .iter()
            .enumerate()
            .filter(|(index, _)| !b_consumed[*index])
            .map(|(_, (b_id, _))| b_id.clone())
            .collect();

        debug!(
            matched = pairs.len(),
            unmatched_a = unmatched_a.len(),
            "initial matching complete"
        );

        MatchOutcome {
            pairs,
            unmatched_a,
            unmatched_b,
        }
    }
}

/// Field view over calendar-event-shaped entities, for
/// [`EventMatchCriteria`].
pub trait EventFields {
    /// The entity's title.
    fn title(&self) -> &str;
    /// Whether this is an all-day entry.
    fn all_day(&self) -> bool;
    /// UTC start instant.
    fn start(&self) -> DateTime<Utc>;
    /// UTC end instant, if the store records one explicitly.
    fn end(&self) -> Option<DateTime<Utc>>;
}

/// Criteria for event-shaped entities: case-folded title as the group key;
/// exact equality over the all-day flag and the normalized UTC start/end,
/// where a missing explicit end on an all-day item is treated as start plus
/// one day.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventMatchCriteria;

fn normalized_interval<E: EventFields>(entity: &E) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = entity.start();
    let end = entity.end().unwrap_or_else(|| {
        if entity.all_day() {
            start + Duration::days(1)
        } else {
            start
        }
    });
    (start, end)
}

impl<A: EventFields, B: EventFields> MatchCriteria<A, B> for EventMatchCriteria {
    fn group_key_a(&self, a: &A) -> String {
        a.title().trim().to_lowercase()
    }

    fn group_key_b(&self, b: &B) -> String {
        b.title().trim().to_lowercase()
    }

    fn is_match(&self, a: &A, b: &B) -> bool {
        a.all_day() == b.all_day() && normalized_interval(a) == normalized_interval(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone)]
    struct Event {
        title: String,
        all_day: bool,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    }

    impl EventFields for Event {
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

    fn timed(title: &str, hour: u32) -> Event {
        let start = Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap();
        Event {
            title: title.into(),
            all_day: false,
            start,
            end: Some(start + Duration::hours(1)),
        }
    }

    fn all_day(title: &str, end: Option<DateTime<Utc>>) -> Event {
        Event {
            title: title.into(),
            all_day: true,
            start: Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
            end,
        }
    }

    fn matcher() -> InitialMatcher<EventMatchCriteria> {
        InitialMatcher::new(EventMatchCriteria)
    }

    #[test]
    fn identical_events_pair_exactly_once() {
        let a = timed("Standup", 9);
        let b = timed("Standup", 9);
        let outcome = matcher().match_entities(&[(1u32, &a)], &[("b1".to_string(), &b)]);
        assert_eq!(outcome.pairs, vec![(1, "b1".to_string())]);
        assert!(outcome.unmatched_a.is_empty());
        assert!(outcome.unmatched_b.is_empty());
    }

    #[test]
    fn title_matching_is_case_folded_but_times_are_exact() {
        let a1 = timed("standup", 9);
        let a2 = timed("Standup", 10);
        let b = timed("STANDUP", 9);
        let outcome =
            matcher().match_entities(&[(1u32, &a1), (2, &a2)], &[("b1".to_string(), &b)]);
        assert_eq!(outcome.pairs, vec![(1, "b1".to_string())]);
        assert_eq!(outcome.unmatched_a, vec![2]);
    }

    #[test]
    fn consumed_candidates_are_not_reused() {
        // Two identical A events, one B candidate: first-available pairing.
        let a1 = timed("Review", 14);
        let a2 = timed("Review", 14);
        let b = timed("Review", 14);
        let outcome =
            matcher().match_entities(&[(1u32, &a1), (2, &a2)], &[("b1".to_string(), &b)]);
        assert_eq!(outcome.pairs, vec![(1, "b1".to_string())]);
        assert_eq!(outcome.unmatched_a, vec![2]);
    }

    #[test]
    fn all_day_missing_end_defaults_to_next_day() {
        let explicit_end = Utc.with_ymd_and_hms(2024, 6, 4, 0, 0, 0).unwrap();
        let a = all_day("Offsite", None);
        let b = all_day("Offsite", Some(explicit_end));
        let outcome = matcher().match_entities(&[(1u32, &a)], &[("b1".to_string(), &b)]);
        assert_eq!(outcome.pairs.len(), 1);
    }

    #[test]
    fn all_day_flag_must_agree() {
        let mut a = timed("Offsite", 0);
        a.end = Some(a.start + Duration::days(1));
        let b = all_day("Offsite", None);
        let outcome = matcher().match_entities(&[(1u32, &a)], &[("b1".to_string(), &b)]);
        assert!(outcome.pairs.is_empty());
        assert_eq!(outcome.unmatched_b, vec!["b1".to_string()]);
    }
}
