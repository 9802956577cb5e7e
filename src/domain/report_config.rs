// Report configuration: the validated, typed tree consumed by the evaluation engine
use super::condition::{Condition, StatisticKind};
use super::evaluation::{EvaluationItem, EventAnchor, ItemKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{ReportError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    SteadyState,
    FunctionalCalc,
    StatusEval,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::SteadyState => "steady_state",
            Section::FunctionalCalc => "functional_calc",
            Section::StatusEval => "status_eval",
        }
    }
}

impl FromStr for Section {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "steady_state" | "stableState" | "stable_state" => Ok(Section::SteadyState),
            "functional_calc" | "function_calc" | "functionalCalc" => Ok(Section::FunctionalCalc),
            "status_eval" | "statusEval" => Ok(Section::StatusEval),
            other => Err(ReportError::invalid_value(
                "report_type",
                format!("unknown report type '{}'", other),
            )),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which steady-state conditions define the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCombination {
    #[default]
    Cond1Only,
    Cond2Only,
    And,
}

impl TriggerCombination {
    pub const ALL: [TriggerCombination; 3] = [
        TriggerCombination::Cond1Only,
        TriggerCombination::Cond2Only,
        TriggerCombination::And,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCombination::Cond1Only => "cond1_only",
            TriggerCombination::Cond2Only => "cond2_only",
            TriggerCombination::And => "and",
        }
    }

    pub fn uses_condition1(&self) -> bool {
        matches!(self, TriggerCombination::Cond1Only | TriggerCombination::And)
    }

    pub fn uses_condition2(&self) -> bool {
        matches!(self, TriggerCombination::Cond2Only | TriggerCombination::And)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SteadyStateConfig {
    pub display_channels: Vec<String>,
    #[serde(default)]
    pub combination: TriggerCombination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition1: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition2: Option<Condition>,
}

impl SteadyStateConfig {
    fn missing_fields(&self, out: &mut Vec<String>) {
        if self.display_channels.is_empty() {
            out.push("steady_state.display_channels".to_string());
        }
        for (used, condition, path) in [
            (self.combination.uses_condition1(), &self.condition1, "steady_state.condition1"),
            (self.combination.uses_condition2(), &self.condition2, "steady_state.condition2"),
        ] {
            if !used {
                continue;
            }
            match condition {
                Some(condition) => out.extend(condition.problems(path)),
                None => out.push(path.to_string()),
            }
        }
    }
}

/// Run-down thresholds: T1 when the statistic drops below `threshold1`,
/// T2 when it drops below `threshold2`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RundownConfig {
    pub channel: String,
    pub statistic: StatisticKind,
    pub duration: f64,
    pub threshold1: f64,
    pub threshold2: f64,
}

impl RundownConfig {
    fn problems(&self, path: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.channel.trim().is_empty() {
            problems.push(format!("{}.channel", path));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            problems.push(format!("{}.duration", path));
        }
        if !self.threshold1.is_finite() {
            problems.push(format!("{}.threshold1", path));
        }
        if !self.threshold2.is_finite() {
            problems.push(format!("{}.threshold2", path));
        }
        problems
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FunctionalCalcConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_base: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startup_time: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignition_time: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rundown_ng: Option<RundownConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rundown_np: Option<RundownConfig>,
}

impl FunctionalCalcConfig {
    fn missing_fields(&self, out: &mut Vec<String>) {
        for (condition, path, required) in [
            (&self.time_base, "functional_calc.time_base", true),
            (&self.startup_time, "functional_calc.startup_time", true),
            (&self.ignition_time, "functional_calc.ignition_time", false),
        ] {
            match condition {
                Some(condition) => out.extend(condition.problems(path)),
                None if required => out.push(path.to_string()),
                None => {}
            }
        }
        for (rundown, path) in [
            (&self.rundown_ng, "functional_calc.rundown_ng"),
            (&self.rundown_np, "functional_calc.rundown_np"),
        ] {
            if let Some(rundown) = rundown {
                out.extend(rundown.problems(path));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusEvalConfig {
    pub items: Vec<EvaluationItem>,
}

impl StatusEvalConfig {
    fn missing_fields(&self, out: &mut Vec<String>) {
        if self.items.is_empty() {
            out.push("status_eval.items".to_string());
        }
        let mut seen = BTreeSet::new();
        for (idx, item) in self.items.iter().enumerate() {
            let path = format!("status_eval.items[{}]", idx);
            if item.id.trim().is_empty() || !seen.insert(item.id.as_str()) {
                out.push(format!("{}.id", path));
            }
            if item.conditions.is_empty() {
                out.push(format!("{}.conditions", path));
            }
            for (cidx, condition) in item.conditions.iter().enumerate() {
                out.extend(condition.problems(&format!("{}.conditions[{}]", path, cidx)));
            }
            if let ItemKind::EventCheck {
                anchor: EventAnchor::Item { item_id },
                ..
            } = &item.kind
            {
                let resolves = self
                    .items
                    .iter()
                    .any(|other| &other.id == item_id && other.kind == ItemKind::FunctionalResult);
                if !resolves {
                    out.push(format!("{}.kind.anchor", path));
                }
            }
        }
    }
}

/// Complete or partial report specification
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub source_file_id: String,
    pub sections: BTreeSet<Section>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steady_state: Option<SteadyStateConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functional_calc: Option<FunctionalCalcConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_eval: Option<StatusEvalConfig>,
}

impl ReportConfig {
    pub fn new(source_file_id: impl Into<String>) -> Self {
        Self {
            source_file_id: source_file_id.into(),
            ..Default::default()
        }
    }

    /// Required fields of the selected sections that are absent or malformed
    pub fn missing_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if self.source_file_id.trim().is_empty() {
            missing.push("source_file_id".to_string());
        }
        if self.sections.is_empty() {
            missing.push("sections".to_string());
        }
        for section in &self.sections {
            match section {
                Section::SteadyState => match &self.steady_state {
                    Some(config) => config.missing_fields(&mut missing),
                    None => missing.push("steady_state".to_string()),
                },
                Section::FunctionalCalc => match &self.functional_calc {
                    Some(config) => config.missing_fields(&mut missing),
                    None => missing.push("functional_calc".to_string()),
                },
                Section::StatusEval => match &self.status_eval {
                    Some(config) => config.missing_fields(&mut missing),
                    None => missing.push("status_eval".to_string()),
                },
            }
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Every channel name referenced by the selected sections
    pub fn referenced_channels(&self) -> BTreeSet<String> {
        let mut channels = BTreeSet::new();
        if self.sections.contains(&Section::SteadyState) {
            if let Some(config) = &self.steady_state {
                channels.extend(config.display_channels.iter().cloned());
                if config.combination.uses_condition1() {
                    channels.extend(config.condition1.iter().map(|c| c.channel.clone()));
                }
                if config.combination.uses_condition2() {
                    channels.extend(config.condition2.iter().map(|c| c.channel.clone()));
                }
            }
        }
        if self.sections.contains(&Section::FunctionalCalc) {
            if let Some(config) = &self.functional_calc {
                for condition in [&config.time_base, &config.startup_time, &config.ignition_time]
                    .into_iter()
                    .flatten()
                {
                    channels.insert(condition.channel.clone());
                }
                for rundown in [&config.rundown_ng, &config.rundown_np].into_iter().flatten() {
                    channels.insert(rundown.channel.clone());
                }
            }
        }
        if self.sections.contains(&Section::StatusEval) {
            if let Some(config) = &self.status_eval {
                for item in &config.items {
                    channels.extend(item.conditions.iter().map(|c| c.channel.clone()));
                }
            }
        }
        channels
    }
}
