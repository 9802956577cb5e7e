// Status evaluation: one-vote-veto scans, event checks and first-trigger timestamps
use crate::application::condition_evaluator::ConditionEvaluator;
use crate::domain::channel::{merged_timeline, ChannelSource};
use crate::domain::evaluation::{
    EvaluationItem, EvaluationResult, EventAnchor, Expectation, ItemKind, ItemOutcome,
};
use crate::error::{ReportError, Result};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Outcomes of functional_result items, keyed by item id, used to resolve
/// event-check anchors
pub type AnchorMap = HashMap<String, ItemOutcome>;

pub struct EvaluationEngine<'a, S: ChannelSource + ?Sized> {
    source: &'a S,
    conditions: ConditionEvaluator<'a, S>,
}

impl<'a, S: ChannelSource + ?Sized> EvaluationEngine<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            conditions: ConditionEvaluator::new(source),
        }
    }

    /// Evaluate every item, returning results in item order
    pub fn run(&self, items: &[EvaluationItem]) -> Vec<EvaluationResult> {
        // a fresh token is never cancelled
        self.run_with_cancel(items, &CancellationToken::new())
            .unwrap_or_default()
    }

    /// Like [`run`](Self::run) but checks `cancel` before every item
    pub fn run_with_cancel(
        &self,
        items: &[EvaluationItem],
        cancel: &CancellationToken,
    ) -> Result<Vec<EvaluationResult>> {
        let anchors = self.functional_anchors(items, cancel)?;
        let mut results = Vec::with_capacity(items.len());
        for item in items {
            let outcome = match anchors.get(&item.id) {
                Some(outcome) if item.kind == ItemKind::FunctionalResult => outcome.clone(),
                _ => {
                    if cancel.is_cancelled() {
                        return Err(ReportError::Cancelled);
                    }
                    self.evaluate_item(item, &anchors)
                }
            };
            results.push(EvaluationResult::new(item, outcome));
        }
        Ok(results)
    }

    /// Timestamps of the functional_result items, computed first so event
    /// checks can anchor on them
    pub fn functional_anchors(
        &self,
        items: &[EvaluationItem],
        cancel: &CancellationToken,
    ) -> Result<AnchorMap> {
        let mut anchors = AnchorMap::new();
        for item in items.iter().filter(|item| item.kind == ItemKind::FunctionalResult) {
            if cancel.is_cancelled() {
                return Err(ReportError::Cancelled);
            }
            let outcome = self.evaluate_item(item, &anchors);
            anchors.insert(item.id.clone(), outcome);
        }
        Ok(anchors)
    }

    /// Evaluate one item. Errors never escape: they become `ItemOutcome::Error`
    /// so one bad item does not block the rest of the report.
    pub fn evaluate_item(&self, item: &EvaluationItem, anchors: &AnchorMap) -> ItemOutcome {
        if item.conditions.is_empty() {
            return ItemOutcome::Error {
                reason: format!("item '{}' has no conditions", item.id),
            };
        }
        // Unknown channels are a configuration error, reported before scanning
        if let Some(missing) = item
            .channels()
            .into_iter()
            .find(|name| self.source.channel(name).is_none())
        {
            let err = ReportError::ChannelNotFound {
                channel: missing.to_string(),
            };
            tracing::warn!("Item {} not evaluated: {}", item.id, err);
            return ItemOutcome::Error {
                reason: err.to_string(),
            };
        }

        match &item.kind {
            ItemKind::ContinuousCheck { expectation } => self.scan_continuous(item, *expectation),
            ItemKind::EventCheck { expectation, anchor } => {
                self.check_event(item, *expectation, anchor, anchors)
            }
            ItemKind::FunctionalResult => self.first_trigger(item),
        }
    }

    /// One-vote veto: stop at the first violating timestamp
    fn scan_continuous(&self, item: &EvaluationItem, expectation: Expectation) -> ItemOutcome {
        let timeline = merged_timeline(self.source, &item.channels());
        for t in timeline {
            match self.conditions.combine(&item.conditions, item.logic, t) {
                Ok(combined) => {
                    if expectation.is_violated_by(combined) {
                        tracing::debug!("Item {} failed at t={}", item.id, t);
                        return ItemOutcome::Fail { at: t };
                    }
                }
                Err(ReportError::InsufficientData { .. }) => continue,
                Err(err) => {
                    return ItemOutcome::Error {
                        reason: err.to_string(),
                    };
                }
            }
        }
        ItemOutcome::Pass
    }

    fn check_event(
        &self,
        item: &EvaluationItem,
        expectation: Expectation,
        anchor: &EventAnchor,
        anchors: &AnchorMap,
    ) -> ItemOutcome {
        let at = match self.resolve_anchor(item, anchor, anchors) {
            Ok(at) => at,
            Err(reason) => return ItemOutcome::Error { reason },
        };
        match self.conditions.combine(&item.conditions, item.logic, at) {
            Ok(combined) if expectation.is_violated_by(combined) => ItemOutcome::Fail { at },
            Ok(_) => ItemOutcome::Pass,
            Err(err) => ItemOutcome::Error {
                reason: err.to_string(),
            },
        }
    }

    fn resolve_anchor(
        &self,
        item: &EvaluationItem,
        anchor: &EventAnchor,
        anchors: &AnchorMap,
    ) -> std::result::Result<f64, String> {
        match anchor {
            EventAnchor::AtTime { time } => Ok(*time),
            EventAnchor::LastSample => item
                .channels()
                .into_iter()
                .filter_map(|name| self.source.channel(name))
                .filter_map(|channel| channel.last().map(|s| s.time))
                .reduce(f64::max)
                .ok_or_else(|| format!("item '{}' has no samples", item.id)),
            EventAnchor::Item { item_id } => match anchors.get(item_id) {
                Some(ItemOutcome::Timestamp { at }) => Ok(*at),
                Some(ItemOutcome::NotFound) => Err(format!("anchor item '{}' never triggered", item_id)),
                Some(ItemOutcome::Error { reason }) => {
                    Err(format!("anchor item '{}' failed: {}", item_id, reason))
                }
                _ => Err(format!("anchor item '{}' has no timestamp", item_id)),
            },
        }
    }

    /// Earliest false -> true transition of the combined condition
    fn first_trigger(&self, item: &EvaluationItem) -> ItemOutcome {
        let timeline = merged_timeline(self.source, &item.channels());
        let mut previous = false;
        for t in timeline {
            match self.conditions.combine(&item.conditions, item.logic, t) {
                Ok(combined) => {
                    if combined && !previous {
                        return ItemOutcome::Timestamp { at: t };
                    }
                    previous = combined;
                }
                Err(ReportError::InsufficientData { .. }) => continue,
                Err(err) => {
                    return ItemOutcome::Error {
                        reason: err.to_string(),
                    };
                }
            }
        }
        ItemOutcome::NotFound
    }
}
