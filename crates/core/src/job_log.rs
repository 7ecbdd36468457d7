//! Entries of the per-job output log (one JSON object per line).

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

/// `jobType` value written on every log line.
pub const LOG_JOB_TYPE: &str = "Import";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLogEntry {
    pub timestamp: Timestamp,
    pub job_id: JobId,
    pub job_type: String,
    pub log_type: LogType,
    pub details: serde_json::Value,
}

impl ImportLogEntry {
    pub fn new(job_id: &str, log_type: LogType, details: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            job_id: job_id.to_string(),
            job_type: LOG_JOB_TYPE.to_string(),
            log_type,
            details,
        }
    }

    pub fn info(job_id: &str, details: serde_json::Value) -> Self {
        Self::new(job_id, LogType::Info, details)
    }

    pub fn warning(job_id: &str, details: serde_json::Value) -> Self {
        Self::new(job_id, LogType::Warning, details)
    }

    pub fn error(job_id: &str, details: serde_json::Value) -> Self {
        Self::new(job_id, LogType::Error, details)
    }

    /// Serialize as a single newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_shape() {
        let entry = ImportLogEntry::error(
            "job-1",
            serde_json::json!({"section": "Twins", "lineNumber": 7}),
        );
        let line = entry.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let json: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["jobType"], "Import");
        assert_eq!(json["logType"], "Error");
        assert_eq!(json["details"]["lineNumber"], 7);
        assert!(json["timestamp"].is_string());
    }
}
