// Configuration wizard: per-report-type steps, structured actions and the
// session transition function
use super::condition::{Condition, ConditionLogic, Operator, StatisticKind};
use super::defaults;
use super::evaluation::{Expectation, ItemKind};
use super::report_config::{ReportConfig, RundownConfig, Section, StatusEvalConfig, TriggerCombination};
use crate::error::{ReportError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionalMetric {
    TimeBase,
    StartupTime,
    IgnitionTime,
    RundownNg,
    RundownNp,
}

impl FunctionalMetric {
    pub const ORDER: [FunctionalMetric; 5] = [
        FunctionalMetric::TimeBase,
        FunctionalMetric::StartupTime,
        FunctionalMetric::IgnitionTime,
        FunctionalMetric::RundownNg,
        FunctionalMetric::RundownNp,
    ];

    /// Field name inside `FunctionalCalcConfig`
    pub fn field(&self) -> &'static str {
        match self {
            FunctionalMetric::TimeBase => "time_base",
            FunctionalMetric::StartupTime => "startup_time",
            FunctionalMetric::IgnitionTime => "ignition_time",
            FunctionalMetric::RundownNg => "rundown_ng",
            FunctionalMetric::RundownNp => "rundown_np",
        }
    }

    pub fn step_name(&self) -> &'static str {
        match self {
            FunctionalMetric::TimeBase => "time_base_config",
            FunctionalMetric::StartupTime => "startup_time_config",
            FunctionalMetric::IgnitionTime => "ignition_time_config",
            FunctionalMetric::RundownNg => "rundown_ng_config",
            FunctionalMetric::RundownNp => "rundown_np_config",
        }
    }

    pub fn is_required(&self) -> bool {
        matches!(self, FunctionalMetric::TimeBase | FunctionalMetric::StartupTime)
    }

    pub fn is_rundown(&self) -> bool {
        matches!(self, FunctionalMetric::RundownNg | FunctionalMetric::RundownNp)
    }

    pub fn next(&self) -> Option<FunctionalMetric> {
        let idx = Self::ORDER.iter().position(|m| m == self)?;
        Self::ORDER.get(idx + 1).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SteadyStep {
    DisplayChannels,
    TriggerCombo,
    /// Editing condition 1 or 2
    ParameterConfig { condition: usize },
    Confirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum FunctionalStep {
    SelectRpmStandard,
    MetricConfig { metric: FunctionalMetric },
    Confirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StatusStep {
    SelectItems,
    /// Zero-based indices of the item being configured and its focused condition
    ConfigItem { item: usize, condition: usize },
    Confirmation,
}

/// Current wizard position. Each report type has its own step type so a
/// state only carries the fields meaningful at that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardState {
    Initial,
    SteadyState(SteadyStep),
    FunctionalCalc(FunctionalStep),
    StatusEval(StatusStep),
    Completed,
    Cancelled,
}

impl WizardState {
    /// Wire name of the step
    pub fn name(&self) -> &'static str {
        match self {
            WizardState::Initial => "initial",
            WizardState::SteadyState(step) => match step {
                SteadyStep::DisplayChannels => "display_channels",
                SteadyStep::TriggerCombo => "trigger_combo",
                SteadyStep::ParameterConfig { .. } => "parameter_config",
                SteadyStep::Confirmation => "confirmation",
            },
            WizardState::FunctionalCalc(step) => match step {
                FunctionalStep::SelectRpmStandard => "select_rpm_standard",
                FunctionalStep::MetricConfig { metric } => metric.step_name(),
                FunctionalStep::Confirmation => "confirmation",
            },
            WizardState::StatusEval(step) => match step {
                StatusStep::SelectItems => "status_eval_select_items",
                StatusStep::ConfigItem { .. } => "status_eval_config_item",
                StatusStep::Confirmation => "confirmation",
            },
            WizardState::Completed => "completed",
            WizardState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WizardState::Completed | WizardState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SelectChannel,
    DeselectChannel,
    SetCombination,
    FocusCondition,
    AddCondition,
    RemoveCondition,
    SetChannel,
    SetStatistic,
    SetDuration,
    SetOperator,
    SetThreshold,
    SetSecondaryThreshold,
    SetMetricEnabled,
    SelectItem,
    DeselectItem,
    SetLogic,
    SetExpectation,
    NextStep,
    PreviousStep,
    Complete,
    Cancel,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::SelectChannel => "select_channel",
            ActionKind::DeselectChannel => "deselect_channel",
            ActionKind::SetCombination => "set_combination",
            ActionKind::FocusCondition => "focus_condition",
            ActionKind::AddCondition => "add_condition",
            ActionKind::RemoveCondition => "remove_condition",
            ActionKind::SetChannel => "set_channel",
            ActionKind::SetStatistic => "set_statistic",
            ActionKind::SetDuration => "set_duration",
            ActionKind::SetOperator => "set_operator",
            ActionKind::SetThreshold => "set_threshold",
            ActionKind::SetSecondaryThreshold => "set_secondary_threshold",
            ActionKind::SetMetricEnabled => "set_metric_enabled",
            ActionKind::SelectItem => "select_item",
            ActionKind::DeselectItem => "deselect_item",
            ActionKind::SetLogic => "set_logic",
            ActionKind::SetExpectation => "set_expectation",
            ActionKind::NextStep => "next_step",
            ActionKind::PreviousStep => "previous_step",
            ActionKind::Complete => "complete",
            ActionKind::Cancel => "cancel",
        }
    }
}

const CONDITION_EDITS: [ActionKind; 5] = [
    ActionKind::SetChannel,
    ActionKind::SetStatistic,
    ActionKind::SetDuration,
    ActionKind::SetOperator,
    ActionKind::SetThreshold,
];

const RUNDOWN_EDITS: [ActionKind; 5] = [
    ActionKind::SetChannel,
    ActionKind::SetStatistic,
    ActionKind::SetDuration,
    ActionKind::SetThreshold,
    ActionKind::SetSecondaryThreshold,
];

/// One structured update. Natural-language input is resolved into a list
/// of these before it reaches the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum ConfigAction {
    SelectChannel(String),
    DeselectChannel(String),
    SetCombination(TriggerCombination),
    /// 1-based condition number
    FocusCondition(usize),
    AddCondition,
    /// 1-based condition number
    RemoveCondition(usize),
    SetChannel(String),
    SetStatistic(StatisticKind),
    SetDuration(f64),
    SetOperator(Operator),
    SetThreshold(f64),
    SetSecondaryThreshold(f64),
    SetMetricEnabled(bool),
    SelectItem(String),
    DeselectItem(String),
    SetLogic(ConditionLogic),
    SetExpectation(Expectation),
    NextStep,
    PreviousStep,
    Complete,
    Cancel,
}

impl ConfigAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ConfigAction::SelectChannel(_) => ActionKind::SelectChannel,
            ConfigAction::DeselectChannel(_) => ActionKind::DeselectChannel,
            ConfigAction::SetCombination(_) => ActionKind::SetCombination,
            ConfigAction::FocusCondition(_) => ActionKind::FocusCondition,
            ConfigAction::AddCondition => ActionKind::AddCondition,
            ConfigAction::RemoveCondition(_) => ActionKind::RemoveCondition,
            ConfigAction::SetChannel(_) => ActionKind::SetChannel,
            ConfigAction::SetStatistic(_) => ActionKind::SetStatistic,
            ConfigAction::SetDuration(_) => ActionKind::SetDuration,
            ConfigAction::SetOperator(_) => ActionKind::SetOperator,
            ConfigAction::SetThreshold(_) => ActionKind::SetThreshold,
            ConfigAction::SetSecondaryThreshold(_) => ActionKind::SetSecondaryThreshold,
            ConfigAction::SetMetricEnabled(_) => ActionKind::SetMetricEnabled,
            ConfigAction::SelectItem(_) => ActionKind::SelectItem,
            ConfigAction::DeselectItem(_) => ActionKind::DeselectItem,
            ConfigAction::SetLogic(_) => ActionKind::SetLogic,
            ConfigAction::SetExpectation(_) => ActionKind::SetExpectation,
            ConfigAction::NextStep => ActionKind::NextStep,
            ConfigAction::PreviousStep => ActionKind::PreviousStep,
            ConfigAction::Complete => ActionKind::Complete,
            ConfigAction::Cancel => ActionKind::Cancel,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct HistoryEntry {
    state: WizardState,
    config: ReportConfig,
}

/// How a handled action moves the wizard
enum Move {
    Stay,
    /// Refocus within the same step; no history entry
    Lateral(WizardState),
    Advance(WizardState),
}

/// A wizard run accumulating one ReportConfig
#[derive(Debug, Clone)]
pub struct ConfigSession {
    pub id: String,
    pub report_type: Section,
    pub file_id: String,
    state: WizardState,
    config: ReportConfig,
    history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    version: u64,
}

impl ConfigSession {
    pub fn new(id: impl Into<String>, report_type: Section, file_id: impl Into<String>) -> Self {
        let file_id = file_id.into();
        let now = Utc::now();
        Self {
            id: id.into(),
            report_type,
            config: ReportConfig::new(file_id.clone()),
            file_id,
            state: WizardState::Initial,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn state(&self) -> WizardState {
        self.state
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The finished configuration, once the session completed
    pub fn completed_config(&self) -> Option<&ReportConfig> {
        (self.state == WizardState::Completed).then_some(&self.config)
    }

    /// Actions accepted in the current state
    pub fn legal_actions(&self) -> Vec<ActionKind> {
        use ActionKind::*;
        let mut actions = match self.state {
            WizardState::Completed | WizardState::Cancelled => return Vec::new(),
            WizardState::Initial => vec![NextStep],
            WizardState::SteadyState(step) => match step {
                SteadyStep::DisplayChannels => vec![SelectChannel, DeselectChannel, NextStep],
                SteadyStep::TriggerCombo => vec![SetCombination],
                SteadyStep::ParameterConfig { .. } => {
                    let mut actions = CONDITION_EDITS.to_vec();
                    let and = self
                        .config
                        .steady_state
                        .as_ref()
                        .is_some_and(|s| s.combination == TriggerCombination::And);
                    if and {
                        actions.push(FocusCondition);
                    }
                    actions.push(NextStep);
                    actions
                }
                SteadyStep::Confirmation => vec![Complete],
            },
            WizardState::FunctionalCalc(step) => match step {
                FunctionalStep::SelectRpmStandard => vec![SelectChannel, NextStep],
                FunctionalStep::MetricConfig { metric } => {
                    let mut actions = Vec::new();
                    if self.metric_enabled(metric) {
                        if metric.is_rundown() {
                            actions.extend(RUNDOWN_EDITS);
                        } else {
                            actions.extend(CONDITION_EDITS);
                        }
                    }
                    if !metric.is_required() {
                        actions.push(SetMetricEnabled);
                    }
                    actions.push(NextStep);
                    actions
                }
                FunctionalStep::Confirmation => vec![Complete],
            },
            WizardState::StatusEval(step) => match step {
                StatusStep::SelectItems => vec![SelectItem, DeselectItem, NextStep],
                StatusStep::ConfigItem { item, .. } => {
                    let mut actions = CONDITION_EDITS.to_vec();
                    actions.push(AddCondition);
                    let entry = self
                        .config
                        .status_eval
                        .as_ref()
                        .and_then(|s| s.items.get(item));
                    if let Some(entry) = entry {
                        if entry.conditions.len() > 1 {
                            actions.extend([RemoveCondition, FocusCondition, SetLogic]);
                        }
                        if entry.kind.expectation().is_some() {
                            actions.push(SetExpectation);
                        }
                    }
                    actions.push(NextStep);
                    actions
                }
                StatusStep::Confirmation => vec![Complete],
            },
        };
        if !self.history.is_empty() {
            actions.push(PreviousStep);
        }
        actions.push(Cancel);
        actions
    }

    fn metric_enabled(&self, metric: FunctionalMetric) -> bool {
        let Some(functional) = &self.config.functional_calc else {
            return false;
        };
        match metric {
            FunctionalMetric::TimeBase => functional.time_base.is_some(),
            FunctionalMetric::StartupTime => functional.startup_time.is_some(),
            FunctionalMetric::IgnitionTime => functional.ignition_time.is_some(),
            FunctionalMetric::RundownNg => functional.rundown_ng.is_some(),
            FunctionalMetric::RundownNp => functional.rundown_np.is_some(),
        }
    }

    pub fn invalid_transition(&self, action: ActionKind) -> ReportError {
        ReportError::InvalidTransition {
            session_id: self.id.clone(),
            state: self.state.name().to_string(),
            action: action.as_str().to_string(),
            valid_actions: self
                .legal_actions()
                .iter()
                .map(|a| a.as_str().to_string())
                .collect(),
        }
    }

    /// Apply one action. Returns whether the session changed; a failed
    /// action leaves the session untouched.
    pub fn apply(&mut self, action: &ConfigAction, channels: &[String]) -> Result<bool> {
        self.apply_all(std::slice::from_ref(action), channels)
    }

    /// Apply every action or none of them
    pub fn apply_all(&mut self, actions: &[ConfigAction], channels: &[String]) -> Result<bool> {
        let mut next = self.clone();
        for action in actions {
            next.transition(action, channels)?;
        }
        let changed = next.state != self.state || next.config != self.config || next.history != self.history;
        if changed {
            next.version = self.version + 1;
            next.updated_at = Utc::now();
            *self = next;
        }
        Ok(changed)
    }

    fn transition(&mut self, action: &ConfigAction, channels: &[String]) -> Result<()> {
        let kind = action.kind();
        if !self.legal_actions().contains(&kind) {
            return Err(self.invalid_transition(kind));
        }
        let movement = match action {
            ConfigAction::Cancel => {
                self.cancel();
                return Ok(());
            }
            ConfigAction::PreviousStep => return self.go_back(),
            ConfigAction::Complete => return self.finalize(channels),
            _ => match self.state {
                WizardState::Initial => self.enter_first_step(channels),
                WizardState::SteadyState(step) => self.apply_steady(step, action, channels)?,
                WizardState::FunctionalCalc(step) => self.apply_functional(step, action, channels)?,
                WizardState::StatusEval(step) => self.apply_status(step, action, channels)?,
                WizardState::Completed | WizardState::Cancelled => {
                    return Err(self.invalid_transition(kind));
                }
            },
        };
        match movement {
            Move::Stay => {}
            Move::Lateral(state) => self.state = state,
            Move::Advance(state) => {
                self.history.push(HistoryEntry {
                    state: self.state,
                    config: self.config.clone(),
                });
                self.state = state;
            }
        }
        Ok(())
    }

    /// `Initial` is not recorded in history: there is nothing to go back to
    fn enter_first_step(&mut self, channels: &[String]) -> Move {
        self.config.sections.insert(self.report_type);
        let first = match self.report_type {
            Section::SteadyState => {
                self.config.steady_state = Some(defaults::steady_state(channels));
                WizardState::SteadyState(SteadyStep::DisplayChannels)
            }
            Section::FunctionalCalc => {
                self.config.functional_calc = Some(defaults::functional_calc(channels));
                WizardState::FunctionalCalc(FunctionalStep::SelectRpmStandard)
            }
            Section::StatusEval => {
                self.config.status_eval = Some(StatusEvalConfig::default());
                WizardState::StatusEval(StatusStep::SelectItems)
            }
        };
        self.state = first;
        Move::Stay
    }

    /// Finalize from any live step once the configuration is complete.
    /// Missing fields are reported before the step is considered.
    pub fn complete(&mut self, channels: &[String]) -> Result<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_transition(ActionKind::Complete));
        }
        self.finalize(channels)?;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    fn go_back(&mut self) -> Result<()> {
        let entry = self
            .history
            .pop()
            .ok_or_else(|| self.invalid_transition(ActionKind::PreviousStep))?;
        self.state = entry.state;
        self.config = entry.config;
        Ok(())
    }

    /// Irreversible: clears the accumulated configuration and history
    fn cancel(&mut self) {
        self.state = WizardState::Cancelled;
        self.config = ReportConfig::new(self.file_id.clone());
        self.history.clear();
    }

    fn finalize(&mut self, channels: &[String]) -> Result<()> {
        let missing = self.config.missing_fields();
        if !missing.is_empty() {
            return Err(ReportError::IncompleteConfig {
                session_id: self.id.clone(),
                missing,
            });
        }
        if let Some(channel) = self
            .config
            .referenced_channels()
            .into_iter()
            .find(|c| !channels.contains(c))
        {
            return Err(ReportError::ChannelNotFound { channel });
        }
        self.state = WizardState::Completed;
        Ok(())
    }

    fn apply_steady(&mut self, step: SteadyStep, action: &ConfigAction, channels: &[String]) -> Result<Move> {
        let steady = self
            .config
            .steady_state
            .get_or_insert_with(|| defaults::steady_state(channels));
        let movement = match (step, action) {
            (SteadyStep::DisplayChannels, ConfigAction::SelectChannel(name)) => {
                let name = ensure_channel(name, channels)?;
                if !steady.display_channels.contains(&name) {
                    steady.display_channels.push(name);
                }
                Move::Stay
            }
            (SteadyStep::DisplayChannels, ConfigAction::DeselectChannel(name)) => {
                let name = defaults::resolve_channel(name, channels).unwrap_or_else(|| name.clone());
                steady.display_channels.retain(|c| *c != name);
                Move::Stay
            }
            (SteadyStep::DisplayChannels, ConfigAction::NextStep) => {
                if steady.display_channels.is_empty() {
                    return Err(ReportError::invalid_value(
                        "steady_state.display_channels",
                        "select at least one channel",
                    ));
                }
                Move::Advance(WizardState::SteadyState(SteadyStep::TriggerCombo))
            }
            (SteadyStep::TriggerCombo, ConfigAction::SetCombination(combination)) => {
                steady.combination = *combination;
                if combination.uses_condition1() && steady.condition1.is_none() {
                    steady.condition1 = Some(defaults::steady_condition(1, channels));
                }
                if combination.uses_condition2() && steady.condition2.is_none() {
                    steady.condition2 = Some(defaults::steady_condition(2, channels));
                }
                let first = if *combination == TriggerCombination::Cond2Only { 2 } else { 1 };
                Move::Advance(WizardState::SteadyState(SteadyStep::ParameterConfig { condition: first }))
            }
            (SteadyStep::ParameterConfig { condition }, ConfigAction::NextStep) => {
                if condition == 1 && steady.combination == TriggerCombination::And {
                    Move::Advance(WizardState::SteadyState(SteadyStep::ParameterConfig { condition: 2 }))
                } else {
                    Move::Advance(WizardState::SteadyState(SteadyStep::Confirmation))
                }
            }
            (SteadyStep::ParameterConfig { .. }, ConfigAction::FocusCondition(slot)) => {
                let usable = match slot {
                    1 => steady.combination.uses_condition1(),
                    2 => steady.combination.uses_condition2(),
                    _ => false,
                };
                if !usable {
                    return Err(ReportError::invalid_value(
                        "condition",
                        format!(
                            "condition {} is not part of the '{}' combination",
                            slot,
                            steady.combination.as_str()
                        ),
                    ));
                }
                Move::Lateral(WizardState::SteadyState(SteadyStep::ParameterConfig { condition: *slot }))
            }
            (SteadyStep::ParameterConfig { condition: slot }, edit) => {
                let path = format!("steady_state.condition{}", slot);
                let target = if slot == 2 {
                    &mut steady.condition2
                } else {
                    &mut steady.condition1
                };
                let condition = target.get_or_insert_with(|| defaults::steady_condition(slot, channels));
                edit_condition(condition, edit, channels, &path)?;
                Move::Stay
            }
            (_, other) => return Err(not_applicable(other, "steady_state")),
        };
        Ok(movement)
    }

    fn apply_functional(
        &mut self,
        step: FunctionalStep,
        action: &ConfigAction,
        channels: &[String],
    ) -> Result<Move> {
        let functional = self
            .config
            .functional_calc
            .get_or_insert_with(|| defaults::functional_calc(channels));
        let movement = match (step, action) {
            (FunctionalStep::SelectRpmStandard, ConfigAction::SelectChannel(name)) => {
                let name = ensure_channel(name, channels)?;
                functional
                    .time_base
                    .get_or_insert_with(|| defaults::time_base(channels))
                    .channel = name;
                Move::Stay
            }
            (FunctionalStep::SelectRpmStandard, ConfigAction::NextStep) => {
                Move::Advance(WizardState::FunctionalCalc(FunctionalStep::MetricConfig {
                    metric: FunctionalMetric::TimeBase,
                }))
            }
            (FunctionalStep::MetricConfig { metric }, ConfigAction::NextStep) => {
                let next = match metric.next() {
                    Some(metric) => FunctionalStep::MetricConfig { metric },
                    None => FunctionalStep::Confirmation,
                };
                Move::Advance(WizardState::FunctionalCalc(next))
            }
            (FunctionalStep::MetricConfig { metric }, ConfigAction::SetMetricEnabled(enabled)) => {
                let path = format!("functional_calc.{}", metric.field());
                match metric {
                    FunctionalMetric::IgnitionTime => {
                        toggle(&mut functional.ignition_time, *enabled, || defaults::ignition_time(channels))
                    }
                    FunctionalMetric::RundownNg => {
                        toggle(&mut functional.rundown_ng, *enabled, || defaults::rundown_ng(channels))
                    }
                    FunctionalMetric::RundownNp => {
                        toggle(&mut functional.rundown_np, *enabled, || defaults::rundown_np(channels))
                    }
                    FunctionalMetric::TimeBase | FunctionalMetric::StartupTime => {
                        return Err(ReportError::invalid_value(path, "this metric is required"));
                    }
                }
                Move::Stay
            }
            (FunctionalStep::MetricConfig { metric }, edit) => {
                let path = format!("functional_calc.{}", metric.field());
                let disabled = || ReportError::invalid_value(path.clone(), "metric is disabled");
                match metric {
                    FunctionalMetric::TimeBase => {
                        let condition = functional
                            .time_base
                            .get_or_insert_with(|| defaults::time_base(channels));
                        edit_condition(condition, edit, channels, &path)?
                    }
                    FunctionalMetric::StartupTime => {
                        let condition = functional
                            .startup_time
                            .get_or_insert_with(|| defaults::startup_time(channels));
                        edit_condition(condition, edit, channels, &path)?
                    }
                    FunctionalMetric::IgnitionTime => {
                        let condition = functional.ignition_time.as_mut().ok_or_else(disabled)?;
                        edit_condition(condition, edit, channels, &path)?
                    }
                    FunctionalMetric::RundownNg => {
                        let rundown = functional.rundown_ng.as_mut().ok_or_else(disabled)?;
                        edit_rundown(rundown, edit, channels, &path)?
                    }
                    FunctionalMetric::RundownNp => {
                        let rundown = functional.rundown_np.as_mut().ok_or_else(disabled)?;
                        edit_rundown(rundown, edit, channels, &path)?
                    }
                }
                Move::Stay
            }
            (_, other) => return Err(not_applicable(other, "functional_calc")),
        };
        Ok(movement)
    }

    fn apply_status(&mut self, step: StatusStep, action: &ConfigAction, channels: &[String]) -> Result<Move> {
        let status = self.config.status_eval.get_or_insert_with(StatusEvalConfig::default);
        let movement = match (step, action) {
            (StatusStep::SelectItems, ConfigAction::SelectItem(id)) => {
                let id = id.trim();
                if !status.items.iter().any(|item| item.id == id) {
                    let item = defaults::status_item(id, channels).ok_or_else(|| {
                        ReportError::invalid_value(
                            "status_eval.items",
                            format!(
                                "unknown item '{}', available: {}",
                                id,
                                defaults::STATUS_CATALOG_IDS.join(", ")
                            ),
                        )
                    })?;
                    status.items.push(item);
                }
                Move::Stay
            }
            (StatusStep::SelectItems, ConfigAction::DeselectItem(id)) => {
                status.items.retain(|item| item.id != id.trim());
                Move::Stay
            }
            (StatusStep::SelectItems, ConfigAction::NextStep) => {
                if status.items.is_empty() {
                    return Err(ReportError::invalid_value(
                        "status_eval.items",
                        "select at least one item",
                    ));
                }
                Move::Advance(WizardState::StatusEval(StatusStep::ConfigItem { item: 0, condition: 0 }))
            }
            (StatusStep::ConfigItem { item, .. }, ConfigAction::NextStep) => {
                if item + 1 < status.items.len() {
                    Move::Advance(WizardState::StatusEval(StatusStep::ConfigItem {
                        item: item + 1,
                        condition: 0,
                    }))
                } else {
                    Move::Advance(WizardState::StatusEval(StatusStep::Confirmation))
                }
            }
            (StatusStep::ConfigItem { item, condition }, edit) => {
                let path = format!("status_eval.items[{}]", item);
                let entry = status
                    .items
                    .get_mut(item)
                    .ok_or_else(|| ReportError::invalid_value(path.clone(), "no such item"))?;
                match edit {
                    ConfigAction::FocusCondition(number) => {
                        let index = condition_index(*number, entry.conditions.len(), &path)?;
                        Move::Lateral(WizardState::StatusEval(StatusStep::ConfigItem { item, condition: index }))
                    }
                    ConfigAction::AddCondition => {
                        let template = entry.conditions.get(condition).cloned().unwrap_or_else(|| {
                            Condition::new(String::new(), StatisticKind::Instantaneous, 0.0, Operator::Gt, 0.0)
                        });
                        entry.conditions.push(template);
                        Move::Lateral(WizardState::StatusEval(StatusStep::ConfigItem {
                            item,
                            condition: entry.conditions.len() - 1,
                        }))
                    }
                    ConfigAction::RemoveCondition(number) => {
                        let index = condition_index(*number, entry.conditions.len(), &path)?;
                        if entry.conditions.len() == 1 {
                            return Err(ReportError::invalid_value(
                                format!("{}.conditions", path),
                                "an item needs at least one condition",
                            ));
                        }
                        entry.conditions.remove(index);
                        Move::Lateral(WizardState::StatusEval(StatusStep::ConfigItem {
                            item,
                            condition: condition.min(entry.conditions.len() - 1),
                        }))
                    }
                    ConfigAction::SetLogic(logic) => {
                        entry.logic = *logic;
                        Move::Stay
                    }
                    ConfigAction::SetExpectation(expected) => {
                        match &mut entry.kind {
                            ItemKind::ContinuousCheck { expectation } | ItemKind::EventCheck { expectation, .. } => {
                                *expectation = *expected
                            }
                            ItemKind::FunctionalResult => {
                                return Err(ReportError::invalid_value(
                                    format!("{}.kind", path),
                                    "functional results have no expectation",
                                ));
                            }
                        }
                        Move::Stay
                    }
                    edit => {
                        let path = format!("{}.conditions[{}]", path, condition);
                        let target = entry
                            .conditions
                            .get_mut(condition)
                            .ok_or_else(|| ReportError::invalid_value(path.clone(), "no such condition"))?;
                        edit_condition(target, edit, channels, &path)?;
                        Move::Stay
                    }
                }
            }
            (_, other) => return Err(not_applicable(other, "status_eval")),
        };
        Ok(movement)
    }
}

fn ensure_channel(name: &str, channels: &[String]) -> Result<String> {
    defaults::resolve_channel(name, channels).ok_or_else(|| ReportError::ChannelNotFound {
        channel: name.trim().to_string(),
    })
}

fn checked_number(value: f64, field: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReportError::invalid_value(field, "must be a finite number"))
    }
}

fn checked_duration(value: f64, field: &str) -> Result<f64> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ReportError::invalid_value(field, "must be a non-negative number of seconds"))
    }
}

fn condition_index(number: usize, count: usize, path: &str) -> Result<usize> {
    if number == 0 || number > count {
        return Err(ReportError::invalid_value(
            format!("{}.conditions", path),
            format!("condition {} does not exist (1..={})", number, count),
        ));
    }
    Ok(number - 1)
}

fn toggle<T>(slot: &mut Option<T>, enabled: bool, template: impl FnOnce() -> T) {
    if !enabled {
        *slot = None;
    } else if slot.is_none() {
        *slot = Some(template());
    }
}

fn not_applicable(action: &ConfigAction, section: &str) -> ReportError {
    ReportError::invalid_value(
        section,
        format!("'{}' cannot be applied at this step", action.kind().as_str()),
    )
}

fn edit_condition(condition: &mut Condition, action: &ConfigAction, channels: &[String], path: &str) -> Result<()> {
    match action {
        ConfigAction::SetChannel(name) => condition.channel = ensure_channel(name, channels)?,
        ConfigAction::SetStatistic(kind) => condition.statistic = *kind,
        ConfigAction::SetDuration(seconds) => {
            condition.duration = checked_duration(*seconds, &format!("{}.duration", path))?
        }
        ConfigAction::SetOperator(operator) => condition.operator = *operator,
        ConfigAction::SetThreshold(value) => {
            condition.threshold = checked_number(*value, &format!("{}.threshold", path))?
        }
        other => return Err(not_applicable(other, path)),
    }
    Ok(())
}

fn edit_rundown(rundown: &mut RundownConfig, action: &ConfigAction, channels: &[String], path: &str) -> Result<()> {
    match action {
        ConfigAction::SetChannel(name) => rundown.channel = ensure_channel(name, channels)?,
        ConfigAction::SetStatistic(kind) => rundown.statistic = *kind,
        ConfigAction::SetDuration(seconds) => {
            rundown.duration = checked_duration(*seconds, &format!("{}.duration", path))?
        }
        ConfigAction::SetThreshold(value) => {
            rundown.threshold1 = checked_number(*value, &format!("{}.threshold1", path))?
        }
        ConfigAction::SetSecondaryThreshold(value) => {
            rundown.threshold2 = checked_number(*value, &format!("{}.threshold2", path))?
        }
        other => return Err(not_applicable(other, path)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels() -> Vec<String> {
        ["Ng", "Np", "Temperature", "Pressure"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn started(report_type: Section) -> ConfigSession {
        let mut session = ConfigSession::new("s1", report_type, "run-1");
        session.apply(&ConfigAction::NextStep, &channels()).unwrap();
        session
    }

    #[test]
    fn test_start_enters_first_step_with_templates() {
        let session = started(Section::SteadyState);
        assert_eq!(session.state().name(), "display_channels");
        let steady = session.config().steady_state.as_ref().unwrap();
        assert_eq!(steady.condition1.as_ref().unwrap().channel, "Ng");
        assert_eq!(session.version(), 1);
    }

    #[test]
    fn test_first_step_offers_no_previous_step() {
        let session = started(Section::StatusEval);
        assert_eq!(session.history_len(), 0);
        assert!(!session.legal_actions().contains(&ActionKind::PreviousStep));

        let mut session = started(Section::SteadyState);
        let ch = channels();
        session.apply(&ConfigAction::SelectChannel("Ng".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::PreviousStep, &ch).unwrap();
        assert_eq!(session.state().name(), "display_channels");
        let err = session.apply(&ConfigAction::PreviousStep, &ch).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_from_any_step_reports_missing_fields() {
        let ch = channels();
        let mut session = started(Section::StatusEval);
        let before = session.version();
        let err = session.complete(&ch).unwrap_err();
        match err {
            ReportError::IncompleteConfig { missing, .. } => assert_eq!(missing, vec!["status_eval.items"]),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(session.state().name(), "status_eval_select_items");
        assert_eq!(session.version(), before);

        // A complete configuration finalizes without visiting confirmation
        let mut session = started(Section::SteadyState);
        session.apply(&ConfigAction::SelectChannel("Np".to_string()), &ch).unwrap();
        session.complete(&ch).unwrap();
        assert_eq!(session.state(), WizardState::Completed);
        assert!(session.completed_config().is_some());

        let err = session.complete(&ch).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
    }

    #[test]
    fn test_selecting_a_channel_twice_is_a_no_op() {
        let mut session = started(Section::SteadyState);
        let select = ConfigAction::SelectChannel("Ng".to_string());
        assert!(session.apply(&select, &channels()).unwrap());
        let once = session.clone();

        assert!(!session.apply(&select, &channels()).unwrap());
        assert_eq!(session.state(), once.state());
        assert_eq!(session.config(), once.config());
        assert_eq!(session.version(), once.version());
        assert_eq!(session.history_len(), once.history_len());
    }

    #[test]
    fn test_channel_names_resolve_case_insensitively() {
        let mut session = started(Section::SteadyState);
        session
            .apply(&ConfigAction::SelectChannel("ng".to_string()), &channels())
            .unwrap();
        session
            .apply(&ConfigAction::SelectChannel("Ng".to_string()), &channels())
            .unwrap();
        let steady = session.config().steady_state.as_ref().unwrap();
        assert_eq!(steady.display_channels, vec!["Ng"]);
    }

    #[test]
    fn test_illegal_action_lists_valid_actions_and_changes_nothing() {
        let mut session = started(Section::SteadyState);
        let before = session.clone();
        let err = session
            .apply(&ConfigAction::SetThreshold(1.0), &channels())
            .unwrap_err();
        match err {
            ReportError::InvalidTransition {
                state, valid_actions, ..
            } => {
                assert_eq!(state, "display_channels");
                assert!(valid_actions.contains(&"select_channel".to_string()));
                assert!(valid_actions.contains(&"cancel".to_string()));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(session.config(), before.config());
        assert_eq!(session.version(), before.version());
    }

    #[test]
    fn test_atomic_batch_with_invalid_middle_delta() {
        let mut session = started(Section::SteadyState);
        let before = session.clone();
        let deltas = vec![
            ConfigAction::SelectChannel("Ng".to_string()),
            ConfigAction::SelectChannel("Bogus".to_string()),
            ConfigAction::SelectChannel("Np".to_string()),
        ];
        let err = session.apply_all(&deltas, &channels()).unwrap_err();
        assert!(matches!(err, ReportError::ChannelNotFound { .. }));
        assert_eq!(session.state(), before.state());
        assert_eq!(session.config(), before.config());
        assert_eq!(session.version(), before.version());
    }

    #[test]
    fn test_steady_state_walkthrough_with_and_combination() {
        let mut session = started(Section::SteadyState);
        let ch = channels();
        session.apply(&ConfigAction::SelectChannel("Np".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        assert_eq!(session.state().name(), "trigger_combo");

        session
            .apply(&ConfigAction::SetCombination(TriggerCombination::And), &ch)
            .unwrap();
        assert_eq!(
            session.state(),
            WizardState::SteadyState(SteadyStep::ParameterConfig { condition: 1 })
        );
        session.apply(&ConfigAction::SetThreshold(15000.0), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        assert_eq!(
            session.state(),
            WizardState::SteadyState(SteadyStep::ParameterConfig { condition: 2 })
        );
        session
            .apply(&ConfigAction::SetStatistic(StatisticKind::StdDev), &ch)
            .unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::Complete, &ch).unwrap();

        assert_eq!(session.state(), WizardState::Completed);
        let config = session.completed_config().unwrap();
        let steady = config.steady_state.as_ref().unwrap();
        assert_eq!(steady.condition1.as_ref().unwrap().threshold, 15000.0);
        assert_eq!(steady.condition2.as_ref().unwrap().statistic, StatisticKind::StdDev);
        assert!(config.is_complete());
    }

    #[test]
    fn test_focus_is_lateral_and_edits_do_not_push_history() {
        let mut session = started(Section::SteadyState);
        let ch = channels();
        session.apply(&ConfigAction::SelectChannel("Ng".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session
            .apply(&ConfigAction::SetCombination(TriggerCombination::And), &ch)
            .unwrap();
        let depth = session.history_len();
        session.apply(&ConfigAction::FocusCondition(2), &ch).unwrap();
        session.apply(&ConfigAction::SetThreshold(10.0), &ch).unwrap();
        assert_eq!(session.history_len(), depth);
        assert_eq!(
            session.state(),
            WizardState::SteadyState(SteadyStep::ParameterConfig { condition: 2 })
        );
    }

    #[test]
    fn test_focus_outside_combination_rejected() {
        let mut session = started(Section::SteadyState);
        let ch = channels();
        session.apply(&ConfigAction::SelectChannel("Ng".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session
            .apply(&ConfigAction::SetCombination(TriggerCombination::Cond1Only), &ch)
            .unwrap();
        // focus is only offered for the AND combination
        let err = session.apply(&ConfigAction::FocusCondition(2), &ch).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
    }

    #[test]
    fn test_previous_step_restores_state_and_config() {
        let mut session = started(Section::SteadyState);
        let ch = channels();
        session.apply(&ConfigAction::SelectChannel("Ng".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session
            .apply(&ConfigAction::SetCombination(TriggerCombination::Cond2Only), &ch)
            .unwrap();
        session.apply(&ConfigAction::SetThreshold(1.0), &ch).unwrap();

        session.apply(&ConfigAction::PreviousStep, &ch).unwrap();
        assert_eq!(session.state().name(), "trigger_combo");
        let steady = session.config().steady_state.as_ref().unwrap();
        assert_eq!(steady.combination, TriggerCombination::Cond1Only);
        assert_eq!(steady.condition2.as_ref().unwrap().threshold, 200.0);

        session.apply(&ConfigAction::PreviousStep, &ch).unwrap();
        assert_eq!(session.state().name(), "display_channels");
        assert_eq!(
            session.config().steady_state.as_ref().unwrap().display_channels,
            vec!["Ng"]
        );
    }

    #[test]
    fn test_cancel_is_irreversible() {
        let mut session = started(Section::StatusEval);
        session.apply(&ConfigAction::Cancel, &channels()).unwrap();
        assert_eq!(session.state(), WizardState::Cancelled);
        assert!(session.legal_actions().is_empty());
        let err = session
            .apply(&ConfigAction::PreviousStep, &channels())
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
    }

    #[test]
    fn test_functional_calc_walkthrough() {
        let mut session = started(Section::FunctionalCalc);
        let ch = channels();
        assert_eq!(session.state().name(), "select_rpm_standard");
        session.apply(&ConfigAction::SelectChannel("Ng".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        assert_eq!(session.state().name(), "time_base_config");
        session.apply(&ConfigAction::SetThreshold(5000.0), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        assert_eq!(session.state().name(), "startup_time_config");
        let err = session
            .apply(&ConfigAction::SetMetricEnabled(false), &ch)
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
        session.apply(&ConfigAction::NextStep, &ch).unwrap();

        session.apply(&ConfigAction::SetMetricEnabled(false), &ch).unwrap();
        let err = session.apply(&ConfigAction::SetThreshold(1.0), &ch).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
        session.apply(&ConfigAction::NextStep, &ch).unwrap();

        assert_eq!(session.state().name(), "rundown_ng_config");
        session.apply(&ConfigAction::SetSecondaryThreshold(7000.0), &ch).unwrap();
        let err = session
            .apply(&ConfigAction::SetOperator(Operator::Lt), &ch)
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidTransition { .. }));
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::Complete, &ch).unwrap();

        let functional = session.config().functional_calc.as_ref().unwrap();
        assert_eq!(functional.time_base.as_ref().unwrap().channel, "Ng");
        assert_eq!(functional.time_base.as_ref().unwrap().threshold, 5000.0);
        assert!(functional.ignition_time.is_none());
        assert_eq!(functional.rundown_ng.as_ref().unwrap().threshold2, 7000.0);
    }

    #[test]
    fn test_status_eval_walkthrough() {
        let mut session = started(Section::StatusEval);
        let ch = channels();
        session
            .apply(&ConfigAction::SelectItem("over_temperature".to_string()), &ch)
            .unwrap();
        session.apply(&ConfigAction::SelectItem("surge".to_string()), &ch).unwrap();
        let err = session
            .apply(&ConfigAction::SelectItem("vibration".to_string()), &ch)
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidValue { .. }));
        session.apply(&ConfigAction::NextStep, &ch).unwrap();

        assert_eq!(
            session.state(),
            WizardState::StatusEval(StatusStep::ConfigItem { item: 0, condition: 0 })
        );
        session.apply(&ConfigAction::SetThreshold(900.0), &ch).unwrap();
        session.apply(&ConfigAction::AddCondition, &ch).unwrap();
        session.apply(&ConfigAction::SetChannel("Ng".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::SetLogic(ConditionLogic::Or), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session
            .apply(&ConfigAction::SetExpectation(Expectation::MustHold), &ch)
            .unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::Complete, &ch).unwrap();

        let items = &session.config().status_eval.as_ref().unwrap().items;
        assert_eq!(items[0].conditions.len(), 2);
        assert_eq!(items[0].conditions[0].threshold, 900.0);
        assert_eq!(items[0].conditions[1].channel, "Ng");
        assert_eq!(items[0].logic, ConditionLogic::Or);
        assert_eq!(items[1].conditions[0].channel, "Pressure");
    }

    #[test]
    fn test_complete_rejects_unknown_channel() {
        let ch: Vec<String> = vec!["Temperature".to_string()];
        let mut session = ConfigSession::new("s2", Section::StatusEval, "run-1");
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::SelectItem("surge".to_string()), &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        session.apply(&ConfigAction::NextStep, &ch).unwrap();
        let err = session.apply(&ConfigAction::Complete, &ch).unwrap_err();
        assert!(matches!(err, ReportError::ChannelNotFound { channel } if channel == "Pressure(kPa)"));
        assert_eq!(session.state().name(), "confirmation");
    }

    #[test]
    fn test_action_wire_format() {
        let action: ConfigAction =
            serde_json::from_str(r#"{"action":"set_threshold","value":850}"#).unwrap();
        assert_eq!(action, ConfigAction::SetThreshold(850.0));
        let action: ConfigAction = serde_json::from_str(r#"{"action":"next_step"}"#).unwrap();
        assert_eq!(action, ConfigAction::NextStep);
        let action: ConfigAction =
            serde_json::from_str(r#"{"action":"set_statistic","value":"平均值"}"#).unwrap();
        assert_eq!(action, ConfigAction::SetStatistic(StatisticKind::Average));
    }
}
