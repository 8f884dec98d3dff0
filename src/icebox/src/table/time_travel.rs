use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::{Error, Result};
use crate::spec::TableMetadata;

/// A resolved as-of target: the snapshot id and its commit timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedSnapshot {
    pub snapshot_id: i64,
    pub timestamp_ms: i64,
}

/// Maps an as-of string to a concrete snapshot.
///
/// A string that parses as a 64-bit integer is a snapshot id. Anything else
/// is tried as a timestamp, first match wins: RFC 3339 (with offset or
/// fractional seconds), `YYYY-MM-DDThh:mm:ss` (UTC), `YYYY-MM-DD hh:mm:ss`
/// (UTC), `YYYY-MM-DD` (midnight UTC). For a timestamp T the snapshot with
/// the greatest `timestamp_ms <= T` wins.
pub fn resolve_as_of(metadata: &TableMetadata, as_of: &str) -> Result<ResolvedSnapshot> {
    let trimmed = as_of.trim();

    if let Some(snapshot_id) = parse_snapshot_id(trimmed) {
        let snapshot = metadata
            .snapshot_by_id(snapshot_id)
            .ok_or_else(|| Error::snapshot_not_found(snapshot_id))?;
        return Ok(ResolvedSnapshot {
            snapshot_id: snapshot.snapshot_id,
            timestamp_ms: snapshot.timestamp_ms,
        });
    }

    let timestamp_ms = parse_timestamp_ms(trimmed)?;
    snapshot_at(metadata, timestamp_ms)
}

/// The snapshot current at `timestamp_ms`: the one with the greatest commit
/// timestamp at or before it.
pub fn snapshot_at(metadata: &TableMetadata, timestamp_ms: i64) -> Result<ResolvedSnapshot> {
    metadata
        .snapshots
        .iter()
        .filter(|s| s.timestamp_ms <= timestamp_ms)
        .max_by_key(|s| s.timestamp_ms)
        .map(|s| ResolvedSnapshot {
            snapshot_id: s.snapshot_id,
            timestamp_ms: s.timestamp_ms,
        })
        .ok_or_else(|| Error::no_snapshot_before(timestamp_ms))
}

fn parse_snapshot_id(input: &str) -> Option<i64> {
    if let Ok(id) = input.parse::<i64>() {
        return Some(id);
    }
    // unsigned ids beyond i64 cannot name any snapshot but still parse as an
    // id, so they resolve (and fail) as one rather than as a timestamp
    input.parse::<u64>().ok().map(|id| id as i64)
}

fn parse_timestamp_ms(input: &str) -> Result<i64> {
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(input) {
        return Ok(with_offset.with_timezone(&Utc).timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0).expect("midnight is always valid");
        return Ok(midnight.and_utc().timestamp_millis());
    }
    Err(Error::invalid_timestamp(input))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::metadata::{apply_updates, new_table_metadata, TableUpdate};
    use crate::spec::{
        NestedField, Operation, PartitionSpec, PrimitiveType, Schema, Snapshot, SortOrder, Summary,
        Type,
    };

    fn metadata_with_snapshots(timestamps: &[(i64, i64)]) -> TableMetadata {
        let mut metadata = new_table_metadata(
            Schema::new(
                0,
                vec![NestedField::required(1, "id", Type::Primitive(PrimitiveType::Long))],
            ),
            PartitionSpec::unpartitioned(),
            SortOrder::unsorted(),
            "file:///wh/ns/t",
            HashMap::new(),
        );
        let mut parent = None;
        for (snapshot_id, timestamp_ms) in timestamps {
            metadata = apply_updates(
                &metadata,
                &[
                    TableUpdate::AddSnapshot {
                        snapshot: Snapshot {
                            snapshot_id: *snapshot_id,
                            parent_snapshot_id: parent,
                            sequence_number: metadata.last_sequence_number + 1,
                            timestamp_ms: *timestamp_ms,
                            manifest_list: format!(
                                "file:///wh/ns/t/metadata/snap-{snapshot_id}-manifest-list.avro"
                            ),
                            summary: Summary::new(Operation::Append),
                            schema_id: Some(0),
                        },
                    },
                    TableUpdate::SetCurrentSnapshot {
                        snapshot_id: *snapshot_id,
                    },
                ],
            )
            .unwrap();
            parent = Some(*snapshot_id);
        }
        metadata
    }

    #[test]
    fn test_resolve_by_snapshot_id() {
        let metadata = metadata_with_snapshots(&[(10, 1000), (20, 2000)]);
        let resolved = resolve_as_of(&metadata, "20").unwrap();
        assert_eq!(resolved.snapshot_id, 20);
        assert_eq!(resolved.timestamp_ms, 2000);

        assert!(matches!(
            resolve_as_of(&metadata, "99"),
            Err(Error::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_resolve_greatest_at_or_before() {
        let metadata = metadata_with_snapshots(&[
            (1, 1_700_000_000_000),
            (2, 1_700_000_100_000),
            (3, 1_700_000_200_000),
        ]);
        // 2024-ish timestamp far after all snapshots picks the latest
        let resolved = resolve_as_of(&metadata, "2024-01-01").unwrap();
        assert_eq!(resolved.snapshot_id, 3);

        // exactly at the middle snapshot
        let resolved = snapshot_at(&metadata, 1_700_000_100_000).unwrap();
        assert_eq!(resolved.snapshot_id, 2);

        // between the first two
        let resolved = snapshot_at(&metadata, 1_700_000_099_999).unwrap();
        assert_eq!(resolved.snapshot_id, 1);
    }

    #[test]
    fn test_before_earliest_snapshot() {
        let metadata = metadata_with_snapshots(&[(1, 1_700_000_000_000)]);
        assert!(matches!(
            resolve_as_of(&metadata, "2001-01-01"),
            Err(Error::NoSnapshotBefore(_))
        ));
    }

    #[test]
    fn test_timestamp_format_chain() {
        for input in [
            "2023-11-14T22:13:20+00:00",
            "2023-11-14T22:13:20.123456789Z",
            "2023-11-14T22:13:20",
            "2023-11-14 22:13:20",
            "2023-11-14",
        ] {
            assert!(parse_timestamp_ms(input).is_ok(), "failed to parse {input}");
        }
        assert!(matches!(
            parse_timestamp_ms("next tuesday"),
            Err(Error::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_offset_normalized_to_utc() {
        let with_offset = parse_timestamp_ms("2023-11-14T22:13:20+05:00").unwrap();
        let utc = parse_timestamp_ms("2023-11-14T17:13:20Z").unwrap();
        assert_eq!(with_offset, utc);
    }

    #[test]
    fn test_huge_unsigned_id_is_treated_as_snapshot_id() {
        let metadata = metadata_with_snapshots(&[(1, 1000)]);
        assert!(matches!(
            resolve_as_of(&metadata, "18446744073709551615"),
            Err(Error::SnapshotNotFound(_))
        ));
    }
}
