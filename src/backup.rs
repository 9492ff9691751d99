use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::models::{Job, Resume};
use crate::state::ImportError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BackupFile<'a> {
    jobs: &'a [Job],
    resume: &'a Resume,
    exported_at: DateTime<Utc>,
}

/// A parsed backup. Presence of `jobs` and `resume` is checked by the importer.
#[derive(Debug, Default)]
pub struct ImportPayload {
    pub jobs: Option<Vec<Job>>,
    pub resume: Option<Resume>,
    pub exported_at: Option<DateTime<Utc>>,
}

impl ImportPayload {
    /// Both collections are required; checked before anything is overwritten.
    pub fn ensure_complete(&self) -> Result<(), ImportError> {
        if self.jobs.is_none() {
            return Err(ImportError::MissingField("jobs"));
        }
        if self.resume.is_none() {
            return Err(ImportError::MissingField("resume"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBackup {
    #[serde(default)]
    jobs: Option<Value>,
    #[serde(default)]
    resume: Option<Value>,
    #[serde(default)]
    exported_at: Option<Value>,
}

pub fn export(jobs: &[Job], resume: &Resume, exported_at: DateTime<Utc>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&BackupFile {
        jobs,
        resume,
        exported_at,
    })
}

pub fn default_file_name(now: DateTime<Utc>) -> String {
    format!("jobsearch_backup_{}.json", now.format("%Y-%m-%d"))
}

/// Parses backup text. Malformed JSON or malformed records are rejected here;
/// absent fields come back as `None`.
pub fn parse(text: &str) -> Result<ImportPayload, ImportError> {
    let raw: RawBackup = serde_json::from_str(text).map_err(|e| ImportError::Malformed(e.to_string()))?;

    let jobs = match raw.jobs {
        None | Some(Value::Null) => None,
        Some(value) => {
            let jobs: Vec<Job> =
                serde_json::from_value(value).map_err(|e| ImportError::Malformed(format!("jobs: {}", e)))?;
            let mut ids = HashSet::new();
            if let Some(dup) = jobs.iter().find(|j| !ids.insert(j.id.as_str())) {
                return Err(ImportError::Malformed(format!("duplicate job id '{}'", dup.id)));
            }
            Some(jobs)
        }
    };

    let resume = match raw.resume {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            serde_json::from_value::<Resume>(value).map_err(|e| ImportError::Malformed(format!("resume: {}", e)))?,
        ),
    };

    // The timestamp is informational; a bad one does not invalidate the file.
    let exported_at = raw
        .exported_at
        .and_then(|v| serde_json::from_value::<DateTime<Utc>>(v).ok());

    Ok(ImportPayload {
        jobs,
        resume,
        exported_at,
    })
}
