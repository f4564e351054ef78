//! Expiry bookkeeping for the sweeper.

use crate::types::{EmbeddingRecord, Identity};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

/// True once `created_at` is at least `validity_days` old at `now`.
///
/// A window too large to represent never expires anything.
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, validity_days: i64) -> bool {
    Duration::try_days(validity_days).is_some_and(|window| now - created_at >= window)
}

/// Split records into (expired, retained).
pub fn partition_expired(
    records: Vec<EmbeddingRecord>,
    now: DateTime<Utc>,
    validity_days: i64,
) -> (Vec<EmbeddingRecord>, Vec<EmbeddingRecord>) {
    records
        .into_iter()
        .partition(|r| is_expired(r.created_at, now, validity_days))
}

/// Identities that still own embeddings but fewer than `threshold`.
///
/// Identities with no records at all are not reported: they are either
/// never enrolled or already fully expired and signalled earlier.
pub fn low_coverage(records: &[EmbeddingRecord], threshold: usize) -> Vec<(Identity, usize)> {
    let mut counts: BTreeMap<&Identity, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(&record.identity).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count < threshold)
        .map(|(identity, count)| (identity.clone(), count))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn record(identity: &str, age_days: i64, now: DateTime<Utc>) -> EmbeddingRecord {
        EmbeddingRecord {
            id: Uuid::new_v4(),
            identity: Identity::parse(identity).unwrap(),
            created_at: now - Duration::days(age_days),
        }
    }

    #[test]
    fn test_eight_days_expires_six_days_retained() {
        let now = Utc::now();
        let old = record("S1", 8, now);
        let fresh = record("S1", 6, now);
        let (expired, retained) = partition_expired(vec![old.clone(), fresh.clone()], now, 7);
        assert_eq!(expired, vec![old]);
        assert_eq!(retained, vec![fresh]);
    }

    #[test]
    fn test_exact_window_expires() {
        let now = Utc::now();
        assert!(is_expired(now - Duration::days(7), now, 7));
        assert!(!is_expired(now - Duration::days(7) + Duration::seconds(1), now, 7));
    }

    #[test]
    fn test_unrepresentable_window_never_expires() {
        let now = Utc::now();
        assert!(!is_expired(now - Duration::days(365), now, i64::MAX));
    }

    #[test]
    fn test_low_coverage_counts_per_identity() {
        let now = Utc::now();
        let records = vec![
            record("S1", 0, now),
            record("S1", 1, now),
            record("S2", 0, now),
            record("S2", 0, now),
            record("S2", 0, now),
        ];
        let low = low_coverage(&records, 3);
        assert_eq!(low, vec![(Identity::parse("S1").unwrap(), 2)]);
    }

    #[test]
    fn test_low_coverage_empty() {
        assert!(low_coverage(&[], 3).is_empty());
    }
}
