// Report generation - evaluates a finished configuration and writes the result
use crate::application::channel_repository::ChannelRepository;
use crate::application::evaluation_engine::EvaluationEngine;
use crate::application::functional_calc::FunctionalCalculator;
use crate::application::report_writer::{ReportArtifact, ReportWriter};
use crate::application::steady_state::SteadyStateScanner;
use crate::domain::channel::ChannelSet;
use crate::domain::evaluation::{EvaluationItem, EvaluationResult, ItemKind, ReportResult};
use crate::domain::report_config::{ReportConfig, Section};
use crate::error::{ReportError, Result};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub artifact: ReportArtifact,
    pub result: ReportResult,
}

/// A generation in flight for one session
struct Run {
    id: Uuid,
    token: CancellationToken,
}

/// Unregisters a run however `generate` ends, including when the caller
/// drops its future midway
struct RunGuard<'a> {
    running: &'a DashMap<String, Run>,
    session_id: &'a str,
    run_id: Uuid,
    token: CancellationToken,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        // stops blocking tasks still working for an abandoned request
        self.token.cancel();
        self.running.remove_if(self.session_id, |_, run| run.id == self.run_id);
    }
}

#[derive(Clone)]
pub struct ReportService {
    repository: Arc<dyn ChannelRepository>,
    writer: Arc<dyn ReportWriter>,
    running: Arc<DashMap<String, Run>>,
}

/// Run CPU-bound work off the async workers
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ReportError::Task(e.to_string()))?
}

impl ReportService {
    pub fn new(repository: Arc<dyn ChannelRepository>, writer: Arc<dyn ReportWriter>) -> Self {
        Self {
            repository,
            writer,
            running: Arc::new(DashMap::new()),
        }
    }

    /// Evaluate `config` against a snapshot of its source file and write the
    /// report. `session_id` keys the run for [`cancel`](Self::cancel).
    pub async fn generate(&self, session_id: &str, config: ReportConfig) -> Result<GeneratedReport> {
        let missing = config.missing_fields();
        if !missing.is_empty() {
            return Err(ReportError::IncompleteConfig {
                session_id: session_id.to_string(),
                missing,
            });
        }

        let run_id = Uuid::new_v4();
        let token = CancellationToken::new();
        let previous = self.running.insert(
            session_id.to_string(),
            Run {
                id: run_id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        let _guard = RunGuard {
            running: &self.running,
            session_id,
            run_id,
            token: token.clone(),
        };
        self.evaluate_and_write(&run_id.to_string(), &config, &token).await
    }

    /// Abandon the running generation for `session_id`; false when none runs
    pub fn cancel(&self, session_id: &str) -> bool {
        match self.running.get(session_id) {
            Some(run) => {
                run.token.cancel();
                tracing::info!("Cancelling report generation for session {}", session_id);
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.running.contains_key(session_id)
    }

    async fn evaluate_and_write(
        &self,
        report_id: &str,
        config: &ReportConfig,
        token: &CancellationToken,
    ) -> Result<GeneratedReport> {
        let start = Instant::now();
        let channels = self.repository.snapshot(&config.source_file_id).await?;
        let result = self.evaluate(config, channels, token).await?;

        let artifact = self.writer.write(report_id, config, &result).await?;
        tracing::info!(
            "Report {} for file {} generated in {:?} ({} status items)",
            report_id,
            config.source_file_id,
            start.elapsed(),
            result.status_eval.len()
        );
        Ok(GeneratedReport { artifact, result })
    }

    /// Functional-result items first (they anchor event checks), then every
    /// other item and the two scan sections concurrently
    async fn evaluate(
        &self,
        config: &ReportConfig,
        channels: Arc<ChannelSet>,
        token: &CancellationToken,
    ) -> Result<ReportResult> {
        let items: Arc<Vec<EvaluationItem>> = Arc::new(
            config
                .sections
                .contains(&Section::StatusEval)
                .then(|| config.status_eval.as_ref().map(|s| s.items.clone()))
                .flatten()
                .unwrap_or_default(),
        );

        let anchors = {
            let (channels, items, token) = (channels.clone(), items.clone(), token.clone());
            Arc::new(
                blocking(move || EvaluationEngine::new(channels.as_ref()).functional_anchors(&items, &token))
                    .await?,
            )
        };

        let item_tasks = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.kind != ItemKind::FunctionalResult)
            .map(|(idx, _)| {
                let (channels, items, anchors, token) =
                    (channels.clone(), items.clone(), anchors.clone(), token.clone());
                blocking(move || {
                    if token.is_cancelled() {
                        return Err(ReportError::Cancelled);
                    }
                    let item = &items[idx];
                    let outcome = EvaluationEngine::new(channels.as_ref()).evaluate_item(item, &anchors);
                    Ok((idx, EvaluationResult::new(item, outcome)))
                })
            });

        let steady = config
            .steady_state
            .clone()
            .filter(|_| config.sections.contains(&Section::SteadyState));
        let steady_task = {
            let (channels, token) = (channels.clone(), token.clone());
            async move {
                match steady {
                    Some(steady) => blocking(move || {
                        if token.is_cancelled() {
                            return Err(ReportError::Cancelled);
                        }
                        Ok(Some(SteadyStateScanner::new(channels.as_ref()).scan(&steady)))
                    })
                    .await,
                    None => Ok(None),
                }
            }
        };

        let functional = config
            .functional_calc
            .clone()
            .filter(|_| config.sections.contains(&Section::FunctionalCalc));
        let functional_task = {
            let (channels, token) = (channels.clone(), token.clone());
            async move {
                match functional {
                    Some(functional) => blocking(move || {
                        if token.is_cancelled() {
                            return Err(ReportError::Cancelled);
                        }
                        Ok(Some(FunctionalCalculator::new(channels.as_ref()).calculate(&functional)))
                    })
                    .await,
                    None => Ok(None),
                }
            }
        };

        let (evaluated, steady_state, functional_calc) =
            tokio::join!(join_all(item_tasks), steady_task, functional_task);

        let mut status_eval: Vec<Option<EvaluationResult>> = vec![None; items.len()];
        for entry in evaluated {
            let (idx, result) = entry?;
            status_eval[idx] = Some(result);
        }
        for (idx, item) in items.iter().enumerate() {
            if let Some(outcome) = anchors.get(&item.id).filter(|_| item.kind == ItemKind::FunctionalResult) {
                status_eval[idx] = Some(EvaluationResult::new(item, outcome.clone()));
            }
        }

        Ok(ReportResult {
            steady_state: steady_state?,
            functional_calc: functional_calc?,
            status_eval: status_eval.into_iter().flatten().collect(),
        })
    }
}
