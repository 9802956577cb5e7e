// Steady-state snapshot scanner
use crate::application::condition_evaluator::ConditionEvaluator;
use crate::domain::channel::{merged_timeline, ChannelSource};
use crate::domain::condition::Condition;
use crate::domain::defaults::STEADY_STATE_RERECORD_SECS;
use crate::domain::evaluation::{Snapshot, SteadyStateResult};
use crate::domain::report_config::SteadyStateConfig;
use std::collections::BTreeMap;

pub struct SteadyStateScanner<'a, S: ChannelSource + ?Sized> {
    source: &'a S,
    conditions: ConditionEvaluator<'a, S>,
}

impl<'a, S: ChannelSource + ?Sized> SteadyStateScanner<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            conditions: ConditionEvaluator::new(source),
        }
    }

    /// Record a snapshot of the display channels on every rising edge of the
    /// trigger, and again every 600 s while it holds when condition 2 is part
    /// of the trigger.
    pub fn scan(&self, config: &SteadyStateConfig) -> SteadyStateResult {
        let triggers = match active_conditions(config) {
            Ok(triggers) => triggers,
            Err(error) => return failed(error),
        };
        let channels: Vec<&str> = triggers.iter().map(|c| c.channel.as_str()).collect();
        if let Some(missing) = channels.iter().find(|name| self.source.channel(name).is_none()) {
            return failed(format!("Channel '{}' not found", missing));
        }

        let rerecord = config.combination.uses_condition2();
        let mut snapshots = Vec::new();
        let mut previous = false;
        let mut last_recorded: Option<f64> = None;

        for t in merged_timeline(self.source, &channels) {
            // a condition that cannot be evaluated counts as not met
            let met = triggers
                .iter()
                .all(|condition| self.conditions.evaluate(condition, t).unwrap_or(false));
            let due = match last_recorded {
                Some(last) => rerecord && t - last > STEADY_STATE_RERECORD_SECS,
                None => false,
            };
            if met && (!previous || due) {
                tracing::debug!("Steady-state snapshot at t={}", t);
                snapshots.push(self.snapshot(&config.display_channels, t));
                last_recorded = Some(t);
            }
            previous = met;
        }

        SteadyStateResult {
            snapshots,
            error: None,
        }
    }

    fn snapshot(&self, display_channels: &[String], t: f64) -> Snapshot {
        let values: BTreeMap<String, Option<f64>> = display_channels
            .iter()
            .map(|name| {
                let value = self
                    .source
                    .channel(name)
                    .and_then(|channel| channel.at_or_before(t))
                    .map(|sample| sample.value);
                (name.clone(), value)
            })
            .collect();
        Snapshot { timestamp: t, values }
    }
}

fn active_conditions(config: &SteadyStateConfig) -> Result<Vec<&Condition>, String> {
    let mut triggers = Vec::new();
    for (used, condition, label) in [
        (config.combination.uses_condition1(), &config.condition1, "condition1"),
        (config.combination.uses_condition2(), &config.condition2, "condition2"),
    ] {
        if !used {
            continue;
        }
        match condition {
            Some(condition) => triggers.push(condition),
            None => {
                return Err(format!(
                    "steady_state.{} is required by the '{}' combination",
                    label,
                    config.combination.as_str()
                ));
            }
        }
    }
    Ok(triggers)
}

fn failed(error: String) -> SteadyStateResult {
    tracing::warn!("Steady-state scan skipped: {}", error);
    SteadyStateResult {
        snapshots: Vec::new(),
        error: Some(error),
    }
}
