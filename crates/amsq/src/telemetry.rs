//! 📊 Cycle telemetry — the one JSON line per cycle that operators actually read.
//!
//! 🧠 Knowledge graph:
//! - Built in ONE struct expression at the end of `CollectionPipeline::run_cycle`, so the compiler
//!   enforces "every field set exactly once". No builder, no Options, no forgetting.
//! - Failure counters are `FailureFlag`s: they go from 0 to 1 and stop. Three overlapping causes in
//!   one cycle still read as `1`.
//! - Wire names are the ones the dashboards already query. Renaming them is a breaking change.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::info;

/// 🚩 A counter that can only ever be 0 or 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailureFlag(bool);

impl FailureFlag {
    /// 🚩 Raise it. Raising it again changes nothing, which is the point.
    pub fn raise(&mut self) {
        self.0 = true;
    }

    pub fn is_raised(&self) -> bool {
        self.0
    }

    pub fn count(&self) -> u8 {
        u8::from(self.0)
    }
}

impl Serialize for FailureFlag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.count())
    }
}

/// 📊 Everything one cycle has to say for itself. Durations are seconds as `f64`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleTelemetry {
    pub msg: Value,
    pub parent_invocation_id: String,
    pub start_time_from_queue_push: i64,
    pub read_blob_time: f64,
    pub laws_finish_time: f64,
    pub ams_code_execution_time: f64,
    pub ams_code_sleep_time: f64,
    pub queue_sleep_time: f64,
    pub time_used_by_ams: f64,
    pub ams_control_start_time_epoch: String,
    pub ams_control_end_time_epoch: String,
    pub finish_time_from_queue_push: i64,
    pub provider_version: String,
    pub log_type: String,
    pub record_count: usize,
    pub read_blob_failure_count: FailureFlag,
    pub laws_insertion_failure_count: FailureFlag,
}

impl CycleTelemetry {
    /// 📝 One line of JSON. Serializing plain fields and a `Value` does not fail in practice, but
    /// if it ever does we still log something rather than nothing.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|err| format!(r#"{{"telemetry_error":"{err}","parent_invocation_id":"{}"}}"#, self.parent_invocation_id))
    }

    /// 📣 Emit on the `amsq::telemetry` target so it can be filtered on its own.
    pub fn emit(&self) {
        info!(target: "amsq::telemetry", "{}", self.to_json_line());
    }
}

/// 🕰️ `%Y-%m-%d %H:%M:%S`, UTC, whole seconds.
pub fn wall_clock(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}
