// Configuration dialogue: drives wizard sessions from structured actions or free text
use crate::application::channel_repository::ChannelRepository;
use crate::application::nl_parser::{NlParser, ParseContext};
use crate::application::session_store::{SessionStore, SharedSession};
use crate::domain::defaults::STATUS_CATALOG_IDS;
use crate::domain::report_config::{ReportConfig, RundownConfig, Section, TriggerCombination};
use crate::domain::session::{
    ActionKind, ConfigAction, ConfigSession, FunctionalMetric, FunctionalStep, StatusStep, SteadyStep,
    WizardState,
};
use crate::error::{ReportError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// A clickable next step rendered by the chat client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestedAction {
    pub action: ActionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub label: String,
}

impl SuggestedAction {
    fn new(action: ActionKind, label: impl Into<String>) -> Self {
        Self {
            action,
            value: None,
            label: label.into(),
        }
    }

    fn with_value(action: ActionKind, value: Value, label: impl Into<String>) -> Self {
        Self {
            action,
            value: Some(value),
            label: label.into(),
        }
    }
}

/// Session view returned after every dialogue turn
#[derive(Debug, Clone, Serialize)]
pub struct DialogueResponse {
    pub session_id: String,
    pub report_type: Section,
    pub state: &'static str,
    pub step: WizardState,
    pub prompt: String,
    pub suggested_actions: Vec<SuggestedAction>,
    pub partial_config: ReportConfig,
    pub version: u64,
    /// False when free text produced no applicable update
    pub understood: bool,
}

impl DialogueResponse {
    pub fn from_session(session: &ConfigSession, channels: &[String], understood: bool) -> Self {
        Self {
            session_id: session.id.clone(),
            report_type: session.report_type,
            state: session.state().name(),
            step: session.state(),
            prompt: prompt(session),
            suggested_actions: suggested_actions(session, channels),
            partial_config: session.config().clone(),
            version: session.version(),
            understood,
        }
    }
}

pub struct ConfigDialogueController {
    store: Arc<SessionStore>,
    channels: Arc<dyn ChannelRepository>,
    parser: Arc<dyn NlParser>,
}

impl ConfigDialogueController {
    pub fn new(
        store: Arc<SessionStore>,
        channels: Arc<dyn ChannelRepository>,
        parser: Arc<dyn NlParser>,
    ) -> Self {
        Self {
            store,
            channels,
            parser,
        }
    }

    /// Start a wizard, or resume the live session with the same id and report type
    pub async fn start_config(
        &self,
        session_id: &str,
        report_type: Section,
        file_id: &str,
    ) -> Result<DialogueResponse> {
        if session_id.trim().is_empty() {
            return Err(ReportError::invalid_value("session_id", "must not be empty"));
        }
        let channels = self.channels.channel_names(file_id).await?;
        let (shared, created) = self
            .store
            .get_or_create(session_id, || ConfigSession::new(session_id, report_type, file_id));
        let mut session = shared.lock().await;

        if !created {
            if session.report_type != report_type || session.file_id != file_id {
                return Err(ReportError::invalid_value(
                    "session_id",
                    format!(
                        "session {} is configuring '{}' for file '{}'",
                        session_id, session.report_type, session.file_id
                    ),
                ));
            }
            if !session.state().is_terminal() {
                info!("Resuming session {} at '{}'", session_id, session.state().name());
                return Ok(DialogueResponse::from_session(&session, &channels, true));
            }
            *session = ConfigSession::new(session_id, report_type, file_id);
        }

        session.apply(&ConfigAction::NextStep, &channels)?;
        info!(
            "Started {} configuration session {} on file {}",
            report_type, session_id, file_id
        );
        Ok(DialogueResponse::from_session(&session, &channels, true))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<DialogueResponse> {
        let shared = self.session(session_id)?;
        let session = shared.lock().await;
        let channels = self.channels.channel_names(&session.file_id).await?;
        Ok(DialogueResponse::from_session(&session, &channels, true))
    }

    /// Apply one structured action. With `expected_version` the call fails
    /// with `ConcurrentModification` if the session moved on meanwhile.
    pub async fn apply_action(
        &self,
        session_id: &str,
        action: ConfigAction,
        expected_version: Option<u64>,
    ) -> Result<DialogueResponse> {
        let shared = self.session(session_id)?;
        let mut session = shared.lock().await;
        if let Some(expected) = expected_version {
            check_version(&session, expected)?;
        }
        let channels = self.channels.channel_names(&session.file_id).await?;
        let changed = session.apply(&action, &channels)?;
        debug!(
            "Session {}: '{}' applied (changed: {}), now at '{}'",
            session_id,
            action.kind().as_str(),
            changed,
            session.state().name()
        );
        self.archive_if_completed(&session);
        Ok(DialogueResponse::from_session(&session, &channels, true))
    }

    /// Resolve free text into deltas and apply them all or none. The parser
    /// runs without holding the session lock.
    pub async fn apply_natural_language(&self, session_id: &str, text: &str) -> Result<DialogueResponse> {
        let shared = self.session(session_id)?;
        let (file_id, state, legal_actions, version) = {
            let session = shared.lock().await;
            (
                session.file_id.clone(),
                session.state(),
                session.legal_actions(),
                session.version(),
            )
        };
        let channels = self.channels.channel_names(&file_id).await?;
        let context = ParseContext {
            state,
            legal_actions,
            channels: channels.clone(),
        };
        let deltas = self.parser.extract_deltas(&context, text).await?;

        let mut session = shared.lock().await;
        check_version(&session, version)?;
        if deltas.is_empty() {
            debug!("Session {}: message not understood", session_id);
            return Ok(DialogueResponse::from_session(&session, &channels, false));
        }
        session.apply_all(&deltas, &channels)?;
        debug!(
            "Session {}: {} deltas applied, now at '{}'",
            session_id,
            deltas.len(),
            session.state().name()
        );
        self.archive_if_completed(&session);
        Ok(DialogueResponse::from_session(&session, &channels, true))
    }

    /// Finalize the session from any step and return its configuration.
    /// Fails with `IncompleteConfig` listing what is still missing.
    pub async fn complete_config(&self, session_id: &str) -> Result<ReportConfig> {
        let shared = self.session(session_id)?;
        let mut session = shared.lock().await;
        if let Some(config) = session.completed_config() {
            return Ok(config.clone());
        }
        let channels = self.channels.channel_names(&session.file_id).await?;
        session.complete(&channels)?;
        self.archive_if_completed(&session);
        Ok(session.config().clone())
    }

    /// Cancel and forget the session
    pub async fn cancel(&self, session_id: &str) -> Result<DialogueResponse> {
        let shared = self.session(session_id)?;
        let response = {
            let mut session = shared.lock().await;
            session.apply(&ConfigAction::Cancel, &[])?;
            DialogueResponse::from_session(&session, &[], true)
        };
        self.store.remove(session_id);
        info!("Cancelled configuration session {}", session_id);
        Ok(response)
    }

    /// Configuration archived when the session completed
    pub fn completed_config(&self, session_id: &str) -> Result<ReportConfig> {
        self.store
            .completed(session_id)
            .ok_or_else(|| ReportError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    fn session(&self, session_id: &str) -> Result<SharedSession> {
        self.store.get(session_id).ok_or_else(|| ReportError::SessionNotFound {
            session_id: session_id.to_string(),
        })
    }

    fn archive_if_completed(&self, session: &ConfigSession) {
        if let Some(config) = session.completed_config() {
            self.store.archive(&session.id, config.clone());
            info!("Configuration session {} completed", session.id);
        }
    }
}

fn check_version(session: &ConfigSession, expected: u64) -> Result<()> {
    if session.version() != expected {
        return Err(ReportError::ConcurrentModification {
            session_id: session.id.clone(),
            expected,
            actual: session.version(),
        });
    }
    Ok(())
}

fn prompt(session: &ConfigSession) -> String {
    let config = session.config();
    match session.state() {
        WizardState::Initial => "Say 'next' to begin".to_string(),
        WizardState::SteadyState(step) => {
            let steady = config.steady_state.as_ref();
            match step {
                SteadyStep::DisplayChannels => {
                    let selected = steady.map(|s| s.display_channels.join(", ")).unwrap_or_default();
                    if selected.is_empty() {
                        "Select the channels to record in the steady-state table".to_string()
                    } else {
                        format!("Selected channels: {}. Add more or continue", selected)
                    }
                }
                SteadyStep::TriggerCombo => {
                    "Choose the steady-state trigger: condition 1 only, condition 2 only, or both".to_string()
                }
                SteadyStep::ParameterConfig { condition } => {
                    let current = steady.and_then(|s| {
                        if condition == 2 {
                            s.condition2.as_ref()
                        } else {
                            s.condition1.as_ref()
                        }
                    });
                    match current {
                        Some(c) => format!("Condition {}: {}. Adjust it or continue", condition, c.describe()),
                        None => format!("Configure condition {}", condition),
                    }
                }
                SteadyStep::Confirmation => confirmation_prompt(config),
            }
        }
        WizardState::FunctionalCalc(step) => {
            let functional = config.functional_calc.as_ref();
            match step {
                FunctionalStep::SelectRpmStandard => {
                    let channel = functional
                        .and_then(|f| f.time_base.as_ref())
                        .map(|c| c.channel.as_str())
                        .unwrap_or("-");
                    format!("Speed channel used as the time base: {}. Pick another or continue", channel)
                }
                FunctionalStep::MetricConfig { metric } => {
                    let rundown = |r: &RundownConfig| {
                        format!("{} falls below {} then {}", r.channel, r.threshold1, r.threshold2)
                    };
                    let current = functional.and_then(|f| match metric {
                        FunctionalMetric::TimeBase => f.time_base.as_ref().map(|c| c.describe()),
                        FunctionalMetric::StartupTime => f.startup_time.as_ref().map(|c| c.describe()),
                        FunctionalMetric::IgnitionTime => f.ignition_time.as_ref().map(|c| c.describe()),
                        FunctionalMetric::RundownNg => f.rundown_ng.as_ref().map(rundown),
                        FunctionalMetric::RundownNp => f.rundown_np.as_ref().map(rundown),
                    });
                    match current {
                        Some(description) => format!("{}: {}. Adjust it or continue", metric.field(), description),
                        None => format!("{} is disabled. Enable it or continue", metric.field()),
                    }
                }
                FunctionalStep::Confirmation => confirmation_prompt(config),
            }
        }
        WizardState::StatusEval(step) => {
            let status = config.status_eval.as_ref();
            match step {
                StatusStep::SelectItems => {
                    let selected: Vec<&str> = status
                        .map(|s| s.items.iter().map(|item| item.id.as_str()).collect())
                        .unwrap_or_default();
                    format!(
                        "Select status checks ({}). Selected: {}",
                        STATUS_CATALOG_IDS.join(", "),
                        if selected.is_empty() { "none".to_string() } else { selected.join(", ") }
                    )
                }
                StatusStep::ConfigItem { item, condition } => match status.and_then(|s| s.items.get(item)) {
                    Some(entry) => format!(
                        "{} ({}), condition {} of {}: {}",
                        entry.name,
                        entry.kind.as_str(),
                        condition + 1,
                        entry.conditions.len(),
                        entry.describe()
                    ),
                    None => "Configure the selected item".to_string(),
                },
                StatusStep::Confirmation => confirmation_prompt(config),
            }
        }
        WizardState::Completed => "Configuration complete".to_string(),
        WizardState::Cancelled => "Configuration cancelled".to_string(),
    }
}

fn confirmation_prompt(config: &ReportConfig) -> String {
    let missing = config.missing_fields();
    if missing.is_empty() {
        "Everything is set. Confirm to finish".to_string()
    } else {
        format!("Still missing: {}", missing.join(", "))
    }
}

fn suggested_actions(session: &ConfigSession, channels: &[String]) -> Vec<SuggestedAction> {
    let config = session.config();
    let mut suggestions = Vec::new();
    for kind in session.legal_actions() {
        match (session.state(), kind) {
            (WizardState::SteadyState(_), ActionKind::SelectChannel) => {
                let selected = config
                    .steady_state
                    .as_ref()
                    .map(|s| s.display_channels.clone())
                    .unwrap_or_default();
                suggestions.extend(channels.iter().filter(|c| !selected.contains(c)).map(|c| {
                    SuggestedAction::with_value(kind, json!(c), format!("Select {}", c))
                }));
            }
            (_, ActionKind::DeselectChannel) => {
                let selected = config
                    .steady_state
                    .as_ref()
                    .map(|s| s.display_channels.clone())
                    .unwrap_or_default();
                suggestions.extend(selected.iter().map(|c| {
                    SuggestedAction::with_value(kind, json!(c), format!("Remove {}", c))
                }));
            }
            (_, ActionKind::SelectChannel) => {
                suggestions.extend(channels.iter().map(|c| {
                    SuggestedAction::with_value(kind, json!(c), format!("Use {}", c))
                }));
            }
            (_, ActionKind::SetCombination) => {
                suggestions.extend(TriggerCombination::ALL.iter().map(|combination| {
                    let label = match combination {
                        TriggerCombination::Cond1Only => "Condition 1 only",
                        TriggerCombination::Cond2Only => "Condition 2 only",
                        TriggerCombination::And => "Both conditions",
                    };
                    SuggestedAction::with_value(kind, json!(combination), label)
                }));
            }
            (_, ActionKind::SelectItem) => {
                let selected: Vec<String> = config
                    .status_eval
                    .as_ref()
                    .map(|s| s.items.iter().map(|item| item.id.clone()).collect())
                    .unwrap_or_default();
                suggestions.extend(
                    STATUS_CATALOG_IDS
                        .iter()
                        .filter(|id| !selected.iter().any(|s| s == *id))
                        .map(|id| SuggestedAction::with_value(kind, json!(id), format!("Check {}", id))),
                );
            }
            (_, ActionKind::DeselectItem) => {
                if let Some(status) = &config.status_eval {
                    suggestions.extend(status.items.iter().map(|item| {
                        SuggestedAction::with_value(kind, json!(item.id), format!("Drop {}", item.id))
                    }));
                }
            }
            (_, ActionKind::SetMetricEnabled) => {
                suggestions.push(SuggestedAction::with_value(kind, json!(true), "Enable"));
                suggestions.push(SuggestedAction::with_value(kind, json!(false), "Disable"));
            }
            (_, ActionKind::FocusCondition) => {
                let count = match session.state() {
                    WizardState::StatusEval(StatusStep::ConfigItem { item, .. }) => config
                        .status_eval
                        .as_ref()
                        .and_then(|s| s.items.get(item))
                        .map(|entry| entry.conditions.len())
                        .unwrap_or(0),
                    _ => 2,
                };
                suggestions.extend((1..=count).map(|n| {
                    SuggestedAction::with_value(kind, json!(n), format!("Edit condition {}", n))
                }));
            }
            (_, kind) => suggestions.push(SuggestedAction::new(kind, label(kind))),
        }
    }
    suggestions
}

fn label(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::AddCondition => "Add a condition",
        ActionKind::RemoveCondition => "Remove a condition",
        ActionKind::SetChannel => "Change channel",
        ActionKind::SetStatistic => "Change statistic",
        ActionKind::SetDuration => "Change window",
        ActionKind::SetOperator => "Change comparison",
        ActionKind::SetThreshold => "Change threshold",
        ActionKind::SetSecondaryThreshold => "Change second threshold",
        ActionKind::SetLogic => "Switch AND/OR",
        ActionKind::SetExpectation => "Change expectation",
        ActionKind::NextStep => "Next",
        ActionKind::PreviousStep => "Back",
        ActionKind::Complete => "Confirm",
        ActionKind::Cancel => "Cancel",
        other => other.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::nl_parser::KeywordParser;
    use crate::domain::channel::{Channel, ChannelSet};
    use crate::infrastructure::memory_repository::InMemoryChannelRepository;
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn repository() -> Arc<InMemoryChannelRepository> {
        let ng = Channel::from_pairs("Ng", &[(0.0, 14000.0), (1.0, 15200.0)]).unwrap();
        let np = Channel::from_pairs("Np", &[(0.0, 9000.0), (1.0, 9100.0)]).unwrap();
        let repository = InMemoryChannelRepository::new();
        repository.insert("run-1", ChannelSet::new(vec![ng, np]).unwrap());
        Arc::new(repository)
    }

    fn controller_with(parser: Arc<dyn NlParser>) -> ConfigDialogueController {
        ConfigDialogueController::new(
            Arc::new(SessionStore::new(Duration::from_secs(60))),
            repository(),
            parser,
        )
    }

    fn controller() -> ConfigDialogueController {
        controller_with(Arc::new(KeywordParser::new().unwrap()))
    }

    #[tokio::test]
    async fn test_start_and_resume() {
        let controller = controller();
        let view = controller
            .start_config("s1", Section::SteadyState, "run-1")
            .await
            .unwrap();
        assert_eq!(view.state, "display_channels");
        assert!(view
            .suggested_actions
            .iter()
            .any(|a| a.action == ActionKind::SelectChannel && a.value == Some(json!("Ng"))));

        controller
            .apply_action("s1", ConfigAction::SelectChannel("Ng".to_string()), None)
            .await
            .unwrap();
        let resumed = controller
            .start_config("s1", Section::SteadyState, "run-1")
            .await
            .unwrap();
        assert_eq!(resumed.partial_config.steady_state.unwrap().display_channels, vec!["Ng"]);

        let err = controller
            .start_config("s1", Section::StatusEval, "run-1")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_unknown_file_and_session() {
        let controller = controller();
        let err = controller
            .start_config("s1", Section::SteadyState, "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::FileNotFound { .. }));
        let err = controller.get_session("nope").await.unwrap_err();
        assert!(matches!(err, ReportError::SessionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_natural_language_and_structured_paths_agree() {
        let controller = controller();
        controller.start_config("text", Section::SteadyState, "run-1").await.unwrap();
        controller.start_config("form", Section::SteadyState, "run-1").await.unwrap();

        let by_text = controller
            .apply_natural_language("text", "select Ng and Np, then next")
            .await
            .unwrap();
        for action in [
            ConfigAction::SelectChannel("Ng".to_string()),
            ConfigAction::SelectChannel("Np".to_string()),
            ConfigAction::NextStep,
        ] {
            controller.apply_action("form", action, None).await.unwrap();
        }
        let by_form = controller.get_session("form").await.unwrap();

        assert!(by_text.understood);
        assert_eq!(by_text.state, "trigger_combo");
        assert_eq!(by_text.step, by_form.step);
        assert_eq!(by_text.partial_config, by_form.partial_config);
    }

    #[tokio::test]
    async fn test_not_understood_leaves_session_unchanged() {
        let controller = controller();
        let start = controller.start_config("s1", Section::SteadyState, "run-1").await.unwrap();
        let view = controller.apply_natural_language("s1", "what a lovely day").await.unwrap();
        assert!(!view.understood);
        assert_eq!(view.version, start.version);
    }

    /// Parser returning three deltas, the second of which names an unknown channel
    struct FixedParser;

    #[async_trait]
    impl NlParser for FixedParser {
        async fn extract_deltas(&self, _: &ParseContext, _: &str) -> Result<Vec<ConfigAction>> {
            Ok(vec![
                ConfigAction::SelectChannel("Ng".to_string()),
                ConfigAction::SelectChannel("Bogus".to_string()),
                ConfigAction::SelectChannel("Np".to_string()),
            ])
        }
    }

    #[tokio::test]
    async fn test_invalid_delta_rejects_whole_message() {
        let controller = controller_with(Arc::new(FixedParser));
        let start = controller.start_config("s1", Section::SteadyState, "run-1").await.unwrap();
        let err = controller.apply_natural_language("s1", "anything").await.unwrap_err();
        assert!(matches!(err, ReportError::ChannelNotFound { .. }));
        let after = controller.get_session("s1").await.unwrap();
        assert_eq!(after.version, start.version);
        assert_eq!(after.partial_config, start.partial_config);
    }

    /// Parser that blocks until released, so another request can slip in
    struct SlowParser {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl NlParser for SlowParser {
        async fn extract_deltas(&self, _: &ParseContext, _: &str) -> Result<Vec<ConfigAction>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(vec![ConfigAction::SelectChannel("Np".to_string())])
        }
    }

    #[tokio::test]
    async fn test_concurrent_update_during_parse_is_rejected() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let controller = Arc::new(controller_with(Arc::new(SlowParser {
            entered: entered.clone(),
            release: release.clone(),
        })));
        controller.start_config("s1", Section::SteadyState, "run-1").await.unwrap();

        let background = controller.clone();
        let pending = tokio::spawn(async move { background.apply_natural_language("s1", "np").await });
        entered.notified().await;
        controller
            .apply_action("s1", ConfigAction::SelectChannel("Ng".to_string()), None)
            .await
            .unwrap();
        release.notify_one();

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ReportError::ConcurrentModification { .. }));
        let view = controller.get_session("s1").await.unwrap();
        assert_eq!(view.partial_config.steady_state.unwrap().display_channels, vec!["Ng"]);
    }

    #[tokio::test]
    async fn test_expected_version_mismatch() {
        let controller = controller();
        let view = controller.start_config("s1", Section::SteadyState, "run-1").await.unwrap();
        let err = controller
            .apply_action("s1", ConfigAction::NextStep, Some(view.version + 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::ConcurrentModification { .. }));
    }

    #[tokio::test]
    async fn test_complete_archives_and_cancel_forgets() {
        let controller = controller();
        controller.start_config("s1", Section::StatusEval, "run-1").await.unwrap();
        let err = controller.complete_config("s1").await.unwrap_err();
        match err {
            ReportError::IncompleteConfig { missing, .. } => assert_eq!(missing, vec!["status_eval.items"]),
            other => panic!("unexpected error {:?}", other),
        }
        let view = controller.get_session("s1").await.unwrap();
        assert_eq!(view.state, "status_eval_select_items");

        for action in [
            ConfigAction::SelectItem("over_speed".to_string()),
            ConfigAction::NextStep,
            ConfigAction::NextStep,
        ] {
            controller.apply_action("s1", action, None).await.unwrap();
        }
        let config = controller.complete_config("s1").await.unwrap();
        assert!(config.is_complete());
        assert_eq!(controller.completed_config("s1").unwrap(), config);
        assert_eq!(controller.complete_config("s1").await.unwrap(), config);

        controller.start_config("s2", Section::SteadyState, "run-1").await.unwrap();
        let view = controller.cancel("s2").await.unwrap();
        assert_eq!(view.state, "cancelled");
        assert!(view.suggested_actions.is_empty());
        assert!(matches!(
            controller.get_session("s2").await.unwrap_err(),
            ReportError::SessionNotFound { .. }
        ));
    }
}
