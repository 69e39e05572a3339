//! Defensive parsing of the planner model's next-action recommendation.
//!
//! The model is asked for `{"action": ..., "summary": ...}` but its reply is
//! free text. The first flat object mentioning `"action"` is extracted and
//! validated; anything unusable falls back to the status-based rule in
//! `NextAction::for_status`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::text::truncate_chars;
use crate::types::{NextAction, TestStatus};

/// Summary used when the model's JSON lacks a usable one.
pub const DEFAULT_DECISION_SUMMARY: &str = "Proceeding with CI workflow";

/// Characters of an unstructured reply kept as the summary.
pub const MAX_UNSTRUCTURED_SUMMARY_CHARS: usize = 200;

static ACTION_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"action"[^{}]*\}"#).expect("action object pattern is valid")
});

/// Where a decision came from. Logged by the planner step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionSource {
    /// The model returned a valid action.
    Model,
    /// An action object was found but was not valid JSON.
    MalformedJson,
    /// The object parsed but its action was missing or unknown.
    InvalidAction,
    /// No action object in the reply.
    Unstructured,
    /// The model call itself failed.
    ModelUnavailable,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::MalformedJson => "malformed_json",
            Self::InvalidAction => "invalid_action",
            Self::Unstructured => "unstructured",
            Self::ModelUnavailable => "model_unavailable",
        }
    }

    pub fn is_fallback(&self) -> bool {
        !matches!(self, Self::Model)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerDecision {
    pub action: NextAction,
    pub summary: String,
    pub source: DecisionSource,
}

/// Interpret a model reply for a run whose tests are in `status`.
pub fn parse_decision(response: &str, status: TestStatus) -> PlannerDecision {
    let fallback_action = NextAction::for_status(status);

    let Some(found) = ACTION_OBJECT.find(response) else {
        return PlannerDecision {
            action: fallback_action,
            summary: truncate_chars(response, MAX_UNSTRUCTURED_SUMMARY_CHARS).to_string(),
            source: DecisionSource::Unstructured,
        };
    };

    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(found.as_str()) else {
        return PlannerDecision {
            action: fallback_action,
            summary: DEFAULT_DECISION_SUMMARY.to_string(),
            source: DecisionSource::MalformedJson,
        };
    };

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_DECISION_SUMMARY)
        .to_string();

    match object
        .get("action")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<NextAction>().ok())
    {
        Some(action) => PlannerDecision {
            action,
            summary,
            source: DecisionSource::Model,
        },
        None => PlannerDecision {
            action: fallback_action,
            summary,
            source: DecisionSource::InvalidAction,
        },
    }
}

/// Decision used when the model could not be reached at all.
pub fn fallback_decision(status: TestStatus) -> PlannerDecision {
    let summary = match status {
        TestStatus::Pending => "Starting test execution",
        TestStatus::Failed => "Analyzing test failures",
        TestStatus::Passed => "Completing CI workflow",
    };
    PlannerDecision {
        action: NextAction::for_status(status),
        summary: summary.to_string(),
        source: DecisionSource::ModelUnavailable,
    }
}
