//! Line-level diffs across a chain of version snapshots.
//!
//! Snapshots are rendered as indented JSON (sorted keys, one-space indent)
//! and compared with a zero-context unified diff, older side first. The line
//! diff itself is Myers with a time bound, via `similar`.

use std::borrow::Cow;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use similar::{Algorithm, TextDiff};

use crate::asset::{Asset, UPDATED_BY};
use crate::error::CoreError;
use crate::types::Document;
use crate::version::{document_version, VERSION_FIELD};

/// Diff between one snapshot and the snapshot immediately before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDiff {
    pub version: i64,
    pub updated_by: Value,
    pub timestamp: Value,
    pub against_version: i64,
    pub diff: String,
}

/// Diff each adjacent pair of a newest-first snapshot list.
///
/// Produces `snapshots.len() - 1` records; fewer than two snapshots yield an
/// empty list. The input is not modified.
pub fn diff_versions(snapshots: &[Asset]) -> Result<Vec<VersionDiff>, CoreError> {
    snapshots
        .windows(2)
        .map(|pair| diff_pair(&pair[0], &pair[1]))
        .collect()
}

fn diff_pair(newer: &Asset, older: &Asset) -> Result<VersionDiff, CoreError> {
    let newer_version = document_version(&newer.data)?;
    let older_version = document_version(&older.data)?;

    let newer_text = render_without_version(&newer.data)?;
    let older_text = render_without_version(&older.data)?;

    let diff = unified_diff(
        &older_text,
        &newer_text,
        &format!("v{older_version}"),
        &format!("v{newer_version}"),
    );

    Ok(VersionDiff {
        version: newer_version,
        updated_by: newer.data.get(UPDATED_BY).cloned().unwrap_or(Value::Null),
        timestamp: newer.timestamp.clone().unwrap_or(Value::Null),
        against_version: older_version,
        diff,
    })
}

fn render_without_version(data: &Document) -> Result<String, CoreError> {
    let mut data = data.clone();
    data.remove(VERSION_FIELD);

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut ser)
        .map_err(|e| CoreError::Internal(format!("Failed to render snapshot: {e}")))?;
    String::from_utf8(buf)
        .map_err(|e| CoreError::Internal(format!("Rendered snapshot is not UTF-8: {e}")))
}

/// Upper bound on time spent searching for a minimal edit script. Past it
/// the diff is still correct, just coarser.
const DIFF_TIMEOUT: Duration = Duration::from_millis(500);

fn newline_terminated(text: &str) -> Cow<'_, str> {
    if text.is_empty() || text.ends_with('\n') {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(format!("{text}\n"))
    }
}

/// Render a unified diff with no context lines. Identical inputs give an
/// empty string.
pub fn unified_diff(old: &str, new: &str, from_label: &str, to_label: &str) -> String {
    let old = newline_terminated(old);
    let new = newline_terminated(new);
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .timeout(DIFF_TIMEOUT)
        .diff_lines(old.as_ref(), new.as_ref());

    diff.unified_diff()
        .context_radius(0)
        .missing_newline_hint(false)
        .header(from_label, to_label)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn snapshot(version: i64, data: Value) -> Asset {
        let mut asset = Asset::new("server", "srv1", data.as_object().cloned().unwrap());
        asset.set_version(version);
        asset
    }

    // -- unified_diff --------------------------------------------------------

    #[test]
    fn identical_texts_give_empty_diff() {
        assert_eq!(unified_diff("a\nb", "a\nb", "v1", "v2"), "");
    }

    #[test]
    fn changed_line_is_single_hunk() {
        let diff = unified_diff("a\nb\nc", "a\nB\nc", "v1", "v2");
        assert_eq!(diff, "--- v1\n+++ v2\n@@ -2 +2 @@\n-b\n+B\n");
    }

    #[test]
    fn pure_insertion_uses_zero_length_old_range() {
        let diff = unified_diff("a\nc", "a\nb\nc", "v1", "v2");
        assert_eq!(diff, "--- v1\n+++ v2\n@@ -1,0 +2 @@\n+b\n");
    }

    #[test]
    fn separate_changes_get_separate_hunks() {
        let diff = unified_diff("a\nb\nc\nd", "A\nb\nc\nD", "v1", "v2");
        assert_eq!(
            diff,
            "--- v1\n+++ v2\n@@ -1 +1 @@\n-a\n+A\n@@ -4 +4 @@\n-d\n+D\n"
        );
    }

    #[test]
    fn multi_line_removal_range() {
        let diff = unified_diff("a\nb\nc\nd", "a\nd", "v1", "v2");
        assert_eq!(diff, "--- v1\n+++ v2\n@@ -2,2 +1,0 @@\n-b\n-c\n");
    }

    #[test]
    fn trailing_newline_does_not_change_output() {
        assert_eq!(
            unified_diff("a\nb\n", "a\nB", "v1", "v2"),
            "--- v1\n+++ v2\n@@ -2 +2 @@\n-b\n+B\n"
        );
    }

    #[test]
    fn large_disjoint_snapshots_diff_quickly() {
        let old: String = (0..5000).map(|i| format!("old-{i}\n")).collect();
        let new: String = (0..5000).map(|i| format!("new-{i}\n")).collect();

        let started = std::time::Instant::now();
        let diff = unified_diff(&old, &new, "v1", "v2");

        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(diff.starts_with("--- v1\n+++ v2\n@@ "));
        let body = diff.lines().skip(2);
        let (removed, added) = body.fold((0, 0), |(r, a), line| {
            if line.starts_with("-old-") {
                (r + 1, a)
            } else if line.starts_with("+new-") {
                (r, a + 1)
            } else {
                (r, a)
            }
        });
        assert_eq!((removed, added), (5000, 5000));
    }

    // -- diff_versions -------------------------------------------------------

    #[test]
    fn fewer_than_two_snapshots_yield_nothing() {
        assert!(diff_versions(&[]).unwrap().is_empty());
        assert!(diff_versions(&[snapshot(1, json!({}))]).unwrap().is_empty());
    }

    #[test]
    fn three_snapshots_give_two_records_and_stay_intact() {
        let snapshots = vec![
            snapshot(3, json!({"status": "retired", "updated_by": "carol"})),
            snapshot(2, json!({"status": "disabled", "updated_by": "bob"})),
            snapshot(1, json!({"status": "enabled", "updated_by": "alice"})),
        ];

        let diffs = diff_versions(&snapshots).unwrap();

        assert_eq!(diffs.len(), 2);
        assert_eq!(
            diffs.iter().map(|d| d.against_version).collect::<Vec<_>>(),
            vec![2, 1]
        );
        assert_eq!(diffs[0].version, 3);
        assert_eq!(diffs[0].updated_by, json!("carol"));
        assert_eq!(
            snapshots.iter().map(|s| s.version()).collect::<Vec<_>>(),
            vec![Some(3), Some(2), Some(1)]
        );
    }

    #[test]
    fn diff_shows_field_change_without_version_line() {
        let snapshots = vec![
            snapshot(2, json!({"status": "disabled"})),
            snapshot(1, json!({"status": "enabled"})),
        ];
        let diffs = diff_versions(&snapshots).unwrap();
        let text = &diffs[0].diff;

        assert!(text.starts_with("--- v1\n+++ v2\n"));
        assert!(text.contains("- \"status\": \"enabled\"\n"));
        assert!(text.contains("+ \"status\": \"disabled\"\n"));
        assert!(!text.contains("version"));
    }

    #[test]
    fn missing_version_is_validation_error() {
        let snapshots = vec![
            snapshot(2, json!({})),
            Asset::new("server", "srv1", Document::new()),
        ];
        assert_matches!(diff_versions(&snapshots), Err(CoreError::Validation(_)));
    }

    #[test]
    fn timestamp_and_updated_by_default_to_null() {
        let snapshots = vec![snapshot(2, json!({})), snapshot(1, json!({}))];
        let diffs = diff_versions(&snapshots).unwrap();
        assert_eq!(diffs[0].updated_by, Value::Null);
        assert_eq!(diffs[0].timestamp, Value::Null);
        assert_eq!(diffs[0].diff, "");
    }
}
