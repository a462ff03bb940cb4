//! Telemetry messages sent by the engine over UDP.
//!
//! Every run-status datagram is a full snapshot of the run: the newest one
//! received replaces whatever was shown before. Nothing here merges two
//! snapshots.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Status of a suite, script, test or instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Waiting,
    Active,
    Stopped,
    Passed,
    Failed,
    Error,
    Timeout,
    Aborted,
    Disabled,
    /// Any status string this build does not know about.
    Unknown,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Waiting => "waiting",
            RunStatus::Active => "active",
            RunStatus::Stopped => "stopped",
            RunStatus::Passed => "passed",
            RunStatus::Failed => "failed",
            RunStatus::Error => "error",
            RunStatus::Timeout => "timeout",
            RunStatus::Aborted => "aborted",
            RunStatus::Disabled => "disabled",
            RunStatus::Unknown => "unknown",
        }
    }

    /// Whether a node with this status will not change again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            RunStatus::Waiting | RunStatus::Active | RunStatus::Unknown
        )
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed | RunStatus::Error | RunStatus::Timeout | RunStatus::Aborted
        )
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "waiting" => RunStatus::Waiting,
            "active" => RunStatus::Active,
            "stopped" => RunStatus::Stopped,
            "passed" => RunStatus::Passed,
            "failed" => RunStatus::Failed,
            "error" => RunStatus::Error,
            "timeout" => RunStatus::Timeout,
            "aborted" => RunStatus::Aborted,
            "disabled" => RunStatus::Disabled,
            _ => RunStatus::Unknown,
        }
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        value.as_str().to_string()
    }
}

impl Display for RunStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The engine is not consistent about numbering fields; accept both forms.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Label::deserialize(deserializer)? {
        Label::Text(text) => text,
        Label::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionStatus {
    pub instruction: String,
    pub status: RunStatus,
    #[serde(default)]
    pub data: serde_json::Value,
    pub details: Option<String>,
    pub comment: Option<String>,
    pub description: Option<String>,
    pub wait: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestStatus {
    #[serde(deserialize_with = "string_or_number")]
    pub test_number: String,
    pub status: RunStatus,
    pub details: Option<String>,
    pub description: Option<String>,
    pub comment: Option<String>,
    pub instructions: Vec<InstructionStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptStatus {
    pub path: String,
    #[serde(deserialize_with = "string_or_number")]
    pub test_script_number: String,
    pub status: RunStatus,
    pub details: Option<String>,
    pub tests: Vec<TestStatus>,
}

/// A full snapshot of run progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusMessage {
    pub elapsed_time: f64,
    pub status: RunStatus,
    pub details: Option<String>,
    pub scripts: Vec<ScriptStatus>,
}

/// Position of the instruction currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStep<'a> {
    pub script: &'a str,
    pub test_number: &'a str,
    pub instruction_index: usize,
    pub instruction: &'a str,
}

/// Count of nodes per status at one level of the tree.
pub type StatusTally = BTreeMap<RunStatus, usize>;

impl RunStatusMessage {
    pub fn tests(&self) -> impl Iterator<Item = &TestStatus> {
        self.scripts.iter().flat_map(|script| script.tests.iter())
    }

    pub fn instructions(&self) -> impl Iterator<Item = &InstructionStatus> {
        self.tests().flat_map(|test| test.instructions.iter())
    }

    #[must_use]
    pub fn script_tally(&self) -> StatusTally {
        tally(self.scripts.iter().map(|script| script.status))
    }

    #[must_use]
    pub fn test_tally(&self) -> StatusTally {
        tally(self.tests().map(|test| test.status))
    }

    #[must_use]
    pub fn instruction_tally(&self) -> StatusTally {
        tally(self.instructions().map(|instruction| instruction.status))
    }

    /// First instruction reported as active, if any.
    #[must_use]
    pub fn active_step(&self) -> Option<ActiveStep<'_>> {
        for script in &self.scripts {
            for test in &script.tests {
                let found = test
                    .instructions
                    .iter()
                    .enumerate()
                    .find(|(_, instruction)| instruction.status == RunStatus::Active);

                if let Some((instruction_index, instruction)) = found {
                    return Some(ActiveStep {
                        script: &script.path,
                        test_number: &test.test_number,
                        instruction_index,
                        instruction: &instruction.instruction,
                    });
                }
            }
        }

        None
    }
}

fn tally(statuses: impl Iterator<Item = RunStatus>) -> StatusTally {
    let mut counts = StatusTally::new();
    for status in statuses {
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}

/// Request for interactive input over the network.
///
/// Decoded so it can be told apart from garbage, but not acted upon yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    pub path: Option<String>,
    pub test_name: Option<String>,
    pub test_number: Option<serde_json::Value>,
    pub instruction_index: Option<usize>,
    #[serde(rename = "continue")]
    pub proceed: bool,
}

/// Every datagram shape the listener recognizes.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    RunStatus(Box<RunStatusMessage>),
    InputRequest(InputRequest),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Datagram is not valid JSON: {}", .0)]
    InvalidJson(#[from] serde_json::Error),

    #[error("Datagram is neither a run status nor an input request")]
    Unrecognized,
}

impl TelemetryMessage {
    /// Decodes one datagram: first as a run status, then as an input request.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for invalid JSON or an unrecognized shape.
    pub fn decode(datagram: &[u8]) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_slice(datagram)?;

        if let Ok(status) = RunStatusMessage::deserialize(&value) {
            return Ok(TelemetryMessage::RunStatus(Box::new(status)));
        }

        if let Ok(request) = InputRequest::deserialize(&value) {
            return Ok(TelemetryMessage::InputRequest(request));
        }

        Err(DecodeError::Unrecognized)
    }
}
