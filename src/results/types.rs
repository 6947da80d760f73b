use crate::{Result, VoxopError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of work an agent reports on
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(alias = "TestCreated", alias = "testCreated")]
    TestCreated,
    #[serde(alias = "TestExecuted", alias = "testExecuted")]
    TestExecuted,
    #[serde(alias = "DefectFixed", alias = "defectFixed")]
    DefectFixed,
    #[serde(alias = "TestValidated", alias = "testValidated")]
    TestValidated,
    #[serde(alias = "StatusReport", alias = "statusReport")]
    StatusReport,
    #[serde(alias = "PipelineRun", alias = "pipelineRun")]
    PipelineRun,
    /// Anything an agent sends that this crate does not recognize
    #[default]
    #[serde(other)]
    Unknown,
}

impl ActionKind {
    pub const ALL: [ActionKind; 6] = [
        ActionKind::TestCreated,
        ActionKind::TestExecuted,
        ActionKind::DefectFixed,
        ActionKind::TestValidated,
        ActionKind::StatusReport,
        ActionKind::PipelineRun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::TestCreated => "test_created",
            ActionKind::TestExecuted => "test_executed",
            ActionKind::DefectFixed => "defect_fixed",
            ActionKind::TestValidated => "test_validated",
            ActionKind::StatusReport => "status_report",
            ActionKind::PipelineRun => "pipeline_run",
            ActionKind::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActionKind::Unknown)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action-specific fields of a result
///
/// Agents disagree on key names, so every accessor takes a list of aliases and
/// returns the first usable value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn first<'a>(&'a self, keys: &[&str]) -> impl Iterator<Item = &'a Value> + 'a {
        let found: Vec<&Value> = keys
            .iter()
            .filter_map(|k| self.0.get(*k))
            .filter(|v| !v.is_null())
            .collect();
        found.into_iter()
    }

    /// First non-empty string under any of `keys`
    pub fn get_str(&self, keys: &[&str]) -> Option<&str> {
        self.first(keys)
            .filter_map(Value::as_str)
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// First non-negative integer under any of `keys`; numeric strings count
    pub fn get_u64(&self, keys: &[&str]) -> Option<u64> {
        self.first(keys).find_map(|v| match v {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64)),
            Value::String(s) => s.trim().parse::<u64>().ok(),
            _ => None,
        })
    }

    pub fn get_f64(&self, keys: &[&str]) -> Option<f64> {
        self.first(keys).find_map(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
    }

    /// Booleans, or the usual status words agents put in their place
    pub fn get_bool(&self, keys: &[&str]) -> Option<bool> {
        self.first(keys).find_map(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "pass" | "passed" | "ok" | "success" | "yes" => Some(true),
                "false" | "fail" | "failed" | "error" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub fn get_array(&self, keys: &[&str]) -> Option<&Vec<Value>> {
        self.first(keys).find_map(Value::as_array)
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Outcome record produced by an agent per completed unit of work
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub success: bool,

    #[serde(default)]
    pub action_kind: ActionKind,

    #[serde(default)]
    pub payload: Payload,

    /// Raw failure text as the agent reported it; never shown to the user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,

    #[serde(default)]
    pub cost_usd: f64,

    #[serde(default)]
    pub duration_ms: u64,
}

impl TaskResult {
    pub fn succeeded(action_kind: ActionKind, payload: Payload) -> Self {
        Self {
            success: true,
            action_kind,
            payload,
            error_text: None,
            cost_usd: 0.0,
            duration_ms: 0,
        }
    }

    pub fn failed(action_kind: ActionKind, error_text: impl Into<String>) -> Self {
        Self {
            success: false,
            action_kind,
            payload: Payload::new(),
            error_text: Some(error_text.into()),
            cost_usd: 0.0,
            duration_ms: 0,
        }
    }

    pub fn with_cost(mut self, cost_usd: f64) -> Self {
        self.cost_usd = cost_usd;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Decode a result as agents emit it (camelCase JSON)
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| VoxopError::InvalidResult(e.to_string()))
    }

    /// Check that the record is either a recognized success or a described failure
    pub fn validate(&self) -> Result<()> {
        if self.success {
            if !self.action_kind.is_known() {
                return Err(VoxopError::InvalidResult(
                    "successful result with an unrecognized action kind".to_string(),
                ));
            }
        } else if self.error_text.as_deref().map_or(true, |t| t.trim().is_empty()) {
            return Err(VoxopError::InvalidResult(
                "failed result without error text".to_string(),
            ));
        }
        Ok(())
    }

    /// Duration of the unit of work, preferring the payload's own figure
    pub fn effective_duration_ms(&self) -> u64 {
        self.payload
            .get_u64(&["durationMs", "duration_ms", "duration"])
            .unwrap_or(self.duration_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_camel_case_result() {
        let result = TaskResult::from_json(
            r#"{"success":true,"actionKind":"TestExecuted","payload":{"file":"tests/login.spec","passed":true,"assertions":6,"durationMs":3500},"costUsd":0.02,"durationMs":4100}"#,
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.action_kind, ActionKind::TestExecuted);
        assert_eq!(result.payload.get_str(&["file"]), Some("tests/login.spec"));
        assert_eq!(result.payload.get_u64(&["assertions"]), Some(6));
        assert_eq!(result.effective_duration_ms(), 3500);
        assert_eq!(result.duration_ms, 4100);
    }

    #[test]
    fn test_decode_snake_case_kind() {
        let result =
            TaskResult::from_json(r#"{"success":true,"actionKind":"pipeline_run"}"#).unwrap();
        assert_eq!(result.action_kind, ActionKind::PipelineRun);
    }

    #[test]
    fn test_unknown_kind_decodes() {
        let result =
            TaskResult::from_json(r#"{"success":true,"actionKind":"deployed_to_mars"}"#).unwrap();
        assert_eq!(result.action_kind, ActionKind::Unknown);
        assert!(result.validate().is_err());
    }

    #[test]
    fn test_malformed_json_is_invalid_result() {
        let err = TaskResult::from_json("{not json").unwrap_err();
        assert!(matches!(err, VoxopError::InvalidResult(_)));
    }

    #[test]
    fn test_validate_failure_needs_text() {
        assert!(TaskResult::failed(ActionKind::TestExecuted, "boom").validate().is_ok());
        assert!(TaskResult::failed(ActionKind::TestExecuted, "   ").validate().is_err());

        let mut missing = TaskResult::failed(ActionKind::TestExecuted, "x");
        missing.error_text = None;
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_payload_aliases_and_coercion() {
        let payload = Payload::new()
            .with("filePath", "tests/cart.spec")
            .with("assertions", "12")
            .with("passed", "FAILED")
            .with("cost", json!(1.5))
            .with("empty", "  ");

        assert_eq!(payload.get_str(&["file", "filePath"]), Some("tests/cart.spec"));
        assert_eq!(payload.get_u64(&["assertions"]), Some(12));
        assert_eq!(payload.get_bool(&["passed"]), Some(false));
        assert_eq!(payload.get_f64(&["cost"]), Some(1.5));
        assert_eq!(payload.get_str(&["empty"]), None);
        assert_eq!(payload.get_u64(&["missing"]), None);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(ActionKind::DefectFixed.to_string(), "defect_fixed");
        assert!(ActionKind::ALL.iter().all(ActionKind::is_known));
    }
}
