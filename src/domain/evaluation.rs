// Evaluation items and their results
use super::condition::{Condition, ConditionLogic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a passing item looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    /// The combined condition must be true at every evaluated instant
    #[default]
    MustHold,
    /// The combined condition must never become true
    MustNeverOccur,
}

impl Expectation {
    /// Whether a combined condition value violates this expectation
    pub fn is_violated_by(&self, combined: bool) -> bool {
        match self {
            Expectation::MustHold => !combined,
            Expectation::MustNeverOccur => combined,
        }
    }
}

/// Instant at which an event check is evaluated
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum EventAnchor {
    /// Last timestamp of the item's channels
    #[default]
    LastSample,
    AtTime { time: f64 },
    /// Timestamp produced by a functional_result item
    Item { item_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum ItemKind {
    ContinuousCheck {
        #[serde(default)]
        expectation: Expectation,
    },
    EventCheck {
        #[serde(default)]
        expectation: Expectation,
        #[serde(default)]
        anchor: EventAnchor,
    },
    FunctionalResult,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::ContinuousCheck { .. } => "continuous_check",
            ItemKind::EventCheck { .. } => "event_check",
            ItemKind::FunctionalResult => "functional_result",
        }
    }

    pub fn expectation(&self) -> Option<Expectation> {
        match self {
            ItemKind::ContinuousCheck { expectation } | ItemKind::EventCheck { expectation, .. } => {
                Some(*expectation)
            }
            ItemKind::FunctionalResult => None,
        }
    }
}

/// One report checkpoint: a group of conditions combined by AND/OR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluationItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub logic: ConditionLogic,
    pub conditions: Vec<Condition>,
}

impl EvaluationItem {
    /// Distinct channel names referenced by the conditions, in order of appearance
    pub fn channels(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for condition in &self.conditions {
            if !names.contains(&condition.channel.as_str()) {
                names.push(&condition.channel);
            }
        }
        names
    }

    pub fn describe(&self) -> String {
        let joiner = format!(" {} ", self.logic.as_str());
        self.conditions
            .iter()
            .map(Condition::describe)
            .collect::<Vec<_>>()
            .join(&joiner)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Pass,
    /// Flipped to fail at `at`; permanently failed
    Fail { at: f64 },
    /// Derived timestamp of a functional result
    Timestamp { at: f64 },
    /// A functional result whose trigger never occurred
    NotFound,
    /// The item could not be evaluated; the rest of the report is unaffected
    Error { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub item_id: String,
    pub name: String,
    pub kind: String,
    pub outcome: ItemOutcome,
    pub description: String,
}

impl EvaluationResult {
    pub fn new(item: &EvaluationItem, outcome: ItemOutcome) -> Self {
        Self {
            item_id: item.id.clone(),
            name: item.name.clone(),
            kind: item.kind.as_str().to_string(),
            outcome,
            description: item.describe(),
        }
    }

    /// Boolean verdict for continuous/event checks
    pub fn verdict(&self) -> Option<bool> {
        match self.outcome {
            ItemOutcome::Pass => Some(true),
            ItemOutcome::Fail { .. } => Some(false),
            _ => None,
        }
    }

    pub fn failure_time(&self) -> Option<f64> {
        match self.outcome {
            ItemOutcome::Fail { at } => Some(at),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<f64> {
        match self.outcome {
            ItemOutcome::Timestamp { at } => Some(at),
            _ => None,
        }
    }
}

/// Values of the display channels captured when the steady-state trigger fired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: f64,
    pub values: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SteadyStateResult {
    pub snapshots: Vec<Snapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One detected start-up / run-down cycle. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionalCycle {
    pub index: usize,
    pub time_base: Option<f64>,
    pub startup_time: Option<f64>,
    pub ignition_time: Option<f64>,
    pub ng_rundown: Option<f64>,
    pub np_rundown: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionalCalcResult {
    pub cycles: Vec<FunctionalCycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything produced for one ReportConfig
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReportResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steady_state: Option<SteadyStateResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functional_calc: Option<FunctionalCalcResult>,
    pub status_eval: Vec<EvaluationResult>,
}
