//! Notifications emitted while a batch runs.
//!
//! Callers receive one [`RunEvent::Progress`] per processed file and a
//! [`RunEvent::Log`] for every file that was moved, failed or restored.

use crate::mover::{MoveRecord, MoveStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum RunEvent {
    Progress {
        /// 1-based index of the file just processed.
        index: usize,
        total: usize,
        percent: f64,
    },
    Log(LogEntry),
}

impl RunEvent {
    pub fn progress(index: usize, total: usize) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            index as f64 * 100.0 / total as f64
        };
        RunEvent::Progress {
            index,
            total,
            percent,
        }
    }
}

/// One line of the activity log shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    pub file: String,
    pub category: String,
    pub status: MoveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&MoveRecord> for LogEntry {
    fn from(record: &MoveRecord) -> Self {
        Self {
            file: record.file_name(),
            category: record.category.clone(),
            status: record.status,
            details: record.error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_percent() {
        assert_eq!(
            RunEvent::progress(1, 4),
            RunEvent::Progress {
                index: 1,
                total: 4,
                percent: 25.0
            }
        );
        assert!(matches!(
            RunEvent::progress(0, 0),
            RunEvent::Progress { percent, .. } if percent == 100.0
        ));
    }

    #[test]
    fn test_log_entry_from_record() {
        let record = MoveRecord::success("/in/a.jpg".into(), "/out/a.jpg".into(), "Images");
        let entry = LogEntry::from(&record);
        assert_eq!(entry.file, "a.jpg");
        assert_eq!(entry.category, "Images");
        assert_eq!(entry.status, MoveStatus::Success);
        assert!(entry.details.is_none());
    }
}
