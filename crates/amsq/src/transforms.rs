//! 🔄 Transforms — turning a matrix into a pile of log records.
//!
//! ```text
//!   cols:    [ "_internal", "A",  "DUMMY",   "B" ]
//!   row:     [  9,          "x",  "ignored", "y" ]
//!                 skip ──┐   │       skip ──┐  │
//!                        ▼   ▼              ▼  ▼
//!   record:  { SAPMON_VERSION, PROVIDER_INSTANCE, METADATA, Time_Generated, A: "x", B: "y" }
//! ```
//!
//! ⚠️ The cursor advances on EVERY column, skipped or kept. The queue handler this replaces did
//! `continue` before `idx += 1`, which spins forever on the first `_` column. We walk the columns
//! with an iterator instead, so there is no cursor to forget about.

use chrono::Utc;
use serde_json::{Map, Value};

use crate::common::LogRecord;
use crate::error::TransformError;

/// 🏷️ Reserved field names stamped on every record, in this order.
pub const FIELD_VERSION: &str = "SAPMON_VERSION";
pub const FIELD_PROVIDER_INSTANCE: &str = "PROVIDER_INSTANCE";
pub const FIELD_METADATA: &str = "METADATA";
pub const FIELD_TIME_GENERATED: &str = "Time_Generated";

/// 🙈 Columns starting with this are internal to the data source and never shipped.
pub const INTERNAL_COLUMN_PREFIX: &str = "_";
/// 🙈 Placeholder column the source pads its queries with.
pub const SENTINEL_COLUMN: &str = "DUMMY";

/// 🏭 Stamps rows into records. Holds only the identity fields; cheap to share.
#[derive(Debug, Clone)]
pub struct RecordTransformer {
    provider_version: String,
    provider_instance: String,
    provider_metadata: Value,
}

impl RecordTransformer {
    pub fn new(provider_version: impl Into<String>, provider_instance: impl Into<String>, provider_metadata: Value) -> Self {
        Self {
            provider_version: provider_version.into(),
            provider_instance: provider_instance.into(),
            provider_metadata,
        }
    }

    /// 🔄 One record per row, same order as the rows.
    ///
    /// 💀 A row that is wider or narrower than the column index is an error for the whole batch:
    /// shipping half-aligned values into a table is worse than shipping nothing.
    pub fn transform(&self, cols: &[String], rows: &[Vec<Value>]) -> Result<Vec<LogRecord>, TransformError> {
        rows.iter()
            .enumerate()
            .map(|(row_number, row)| self.transform_row(row_number, cols, row))
            .collect()
    }

    fn transform_row(&self, row_number: usize, cols: &[String], row: &[Value]) -> Result<LogRecord, TransformError> {
        if row.len() != cols.len() {
            return Err(TransformError::RowWidth {
                row: row_number,
                expected: cols.len(),
                actual: row.len(),
            });
        }

        let mut fields = self.reserved_fields();
        for (column, value) in cols.iter().zip(row) {
            if is_skipped_column(column) {
                continue;
            }
            fields.insert(column.clone(), value.clone());
        }
        Ok(LogRecord::from_fields(fields))
    }

    fn reserved_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(FIELD_VERSION.into(), Value::String(self.provider_version.clone()));
        fields.insert(FIELD_PROVIDER_INSTANCE.into(), Value::String(self.provider_instance.clone()));
        fields.insert(FIELD_METADATA.into(), self.provider_metadata.clone());
        fields.insert(
            FIELD_TIME_GENERATED.into(),
            Value::String(Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()),
        );
        fields
    }
}

/// 🙈 Internal (`_`-prefixed) and sentinel columns stay home.
pub fn is_skipped_column(column: &str) -> bool {
    column.starts_with(INTERNAL_COLUMN_PREFIX) || column == SENTINEL_COLUMN
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transformer() -> RecordTransformer {
        RecordTransformer::new("8.1", "foobar", json!({}))
    }

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn the_one_where_skipped_columns_still_advance_the_cursor() {
        let records = transformer()
            .transform(
                &cols(&["_internal", "A", "DUMMY", "B"]),
                &[vec![json!(9), json!("x"), json!("ignored"), json!("y")]],
            )
            .expect("💀 aligned rows should transform");

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.get("A"), Some(&json!("x")));
        assert_eq!(record.get("B"), Some(&json!("y")));
        assert!(!record.contains("_internal"));
        assert!(!record.contains("DUMMY"));
        // -- four reserved + A + B, nothing sneaked in
        assert_eq!(record.len(), 6);
    }

    #[test]
    fn the_one_where_reserved_fields_come_first() {
        let records = transformer()
            .transform(&cols(&["A"]), &[vec![json!(1)]])
            .unwrap();
        let names: Vec<&str> = records[0].field_names().collect();
        assert_eq!(
            names,
            vec![FIELD_VERSION, FIELD_PROVIDER_INSTANCE, FIELD_METADATA, FIELD_TIME_GENERATED, "A"]
        );
        assert_eq!(records[0].get(FIELD_VERSION), Some(&json!("8.1")));
        assert_eq!(records[0].get(FIELD_PROVIDER_INSTANCE), Some(&json!("foobar")));
        assert_eq!(records[0].get(FIELD_METADATA), Some(&json!({})));
    }

    #[test]
    fn the_one_where_rows_keep_their_order() {
        let rows: Vec<Vec<Value>> = (0..5).map(|i| vec![json!(i)]).collect();
        let records = transformer().transform(&cols(&["N"]), &rows).unwrap();
        let seen: Vec<&Value> = records.iter().filter_map(|r| r.get("N")).collect();
        assert_eq!(seen, vec![&json!(0), &json!(1), &json!(2), &json!(3), &json!(4)]);
    }

    #[test]
    fn the_one_where_a_short_row_is_refused() {
        let err = transformer()
            .transform(&cols(&["A", "B"]), &[vec![json!(1), json!(2)], vec![json!(3)]])
            .unwrap_err();
        assert_eq!(err, TransformError::RowWidth { row: 1, expected: 2, actual: 1 });
    }

    #[test]
    fn the_one_where_no_rows_means_no_records() {
        let records = transformer().transform(&cols(&["A"]), &[]).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn the_one_where_only_the_sentinel_and_underscores_are_skipped() {
        assert!(is_skipped_column("_CORRELATION_ID"));
        assert!(is_skipped_column("DUMMY"));
        assert!(!is_skipped_column("dummy"));
        assert!(!is_skipped_column("A_"));
    }
}
