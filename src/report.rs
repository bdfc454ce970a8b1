//! Test results and attachments in the Allure 2 results-directory layout:
//! one `<uuid>-result.json` per test plus attachment files next to it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ReportingSettings;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    /// The test could not run to an assertion (setup error, crash).
    Broken,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    /// File name relative to the results directory.
    pub source: String,
    #[serde(rename = "type")]
    pub mime: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusDetails {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub uuid: String,
    pub history_id: String,
    pub name: String,
    pub full_name: String,
    pub status: Option<Status>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_details: Option<StatusDetails>,
    pub stage: String,
    pub start: i64,
    pub stop: Option<i64>,
    pub labels: Vec<Label>,
    pub parameters: Vec<Parameter>,
    pub attachments: Vec<Attachment>,
}

impl TestResult {
    pub fn parameter(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.parameters.push(Parameter {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn label(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.labels.push(Label {
            name: name.into(),
            value: value.into(),
        });
    }
}

/// Writes results and artifacts under `reporting.results_dir`.
///
/// Artifacts are always saved; result JSON and attachment links are only
/// produced when `allure_enabled` is set.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    enabled: bool,
}

impl ReportWriter {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn from_settings(settings: &ReportingSettings) -> Self {
        Self::new(&settings.results_dir, settings.allure_enabled)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A running result for `name`, stamped with the current time.
    pub fn start(&self, name: &str) -> TestResult {
        TestResult {
            uuid: Uuid::new_v4().to_string(),
            history_id: name.to_string(),
            name: short_name(name).to_string(),
            full_name: name.to_string(),
            status: None,
            status_details: None,
            stage: "running".into(),
            start: Utc::now().timestamp_millis(),
            stop: None,
            labels: Vec::new(),
            parameters: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Save `bytes` as `<test>-<timestamp>-<kind>.<ext>` and return its path.
    pub fn save_artifact(&self, test: &str, kind: &str, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let stamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
        let path = self
            .dir
            .join(format!("{}-{stamp}-{kind}.{ext}", sanitize(test)));
        fs::write(&path, bytes)?;
        debug!(path = %path.display(), "artifact saved");
        Ok(path)
    }

    /// Link a saved artifact to `result`.
    pub fn attach(&self, result: &mut TestResult, name: &str, mime: &str, path: &Path) {
        if !self.enabled {
            return;
        }
        let source = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        result.attachments.push(Attachment {
            name: name.to_string(),
            source,
            mime: mime.to_string(),
        });
    }

    /// Close `result` with `status` and write it. Returns the file written,
    /// or `None` when reporting is disabled.
    pub fn finish(
        &self,
        result: &mut TestResult,
        status: Status,
        message: Option<String>,
    ) -> Result<Option<PathBuf>> {
        result.status = Some(status);
        result.status_details = message.map(|message| StatusDetails { message });
        result.stage = "finished".into();
        result.stop = Some(Utc::now().timestamp_millis());
        if !self.enabled {
            return Ok(None);
        }
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}-result.json", result.uuid));
        fs::write(&path, serde_json::to_vec_pretty(result)?)?;
        debug!(path = %path.display(), status = ?status, "result written");
        Ok(Some(path))
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit("::").next().unwrap_or(name)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
