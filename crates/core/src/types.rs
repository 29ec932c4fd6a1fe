/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Schema-flexible document body: field name to arbitrary JSON value.
///
/// Backed by `serde_json::Map`, which keeps keys sorted.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Current time as milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
