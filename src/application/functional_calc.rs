// Functional calculation: start-up / run-down cycle detection
use crate::application::condition_evaluator::ConditionEvaluator;
use crate::application::statistics::StatisticEvaluator;
use crate::domain::channel::{merged_timeline, ChannelSource};
use crate::domain::condition::Condition;
use crate::domain::evaluation::{FunctionalCalcResult, FunctionalCycle};
use crate::domain::report_config::{FunctionalCalcConfig, RundownConfig};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    RampingUp,
    RampingDown,
}

#[derive(Debug, Default)]
struct RundownMarks {
    t1: Option<f64>,
    t2: Option<f64>,
}

impl RundownMarks {
    fn elapsed(&self) -> Option<f64> {
        Some(self.t2? - self.t1?)
    }
}

#[derive(Debug, Default)]
struct Capture {
    start: Option<f64>,
    base: Option<f64>,
    ignition: Option<f64>,
    ng: RundownMarks,
    np: RundownMarks,
}

pub struct FunctionalCalculator<'a, S: ChannelSource + ?Sized> {
    source: &'a S,
    conditions: ConditionEvaluator<'a, S>,
    statistics: StatisticEvaluator<'a, S>,
}

impl<'a, S: ChannelSource + ?Sized> FunctionalCalculator<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            conditions: ConditionEvaluator::new(source),
            statistics: StatisticEvaluator::new(source),
        }
    }

    pub fn calculate(&self, config: &FunctionalCalcConfig) -> FunctionalCalcResult {
        let (Some(time_base), Some(startup)) = (&config.time_base, &config.startup_time) else {
            return failed("functional_calc requires time_base and startup_time".to_string());
        };
        let mut channels: BTreeSet<&str> = BTreeSet::new();
        for condition in [Some(time_base), Some(startup), config.ignition_time.as_ref()]
            .into_iter()
            .flatten()
        {
            channels.insert(&condition.channel);
        }
        for rundown in [&config.rundown_ng, &config.rundown_np].into_iter().flatten() {
            channels.insert(&rundown.channel);
        }
        if let Some(missing) = channels.iter().find(|name| self.source.channel(name).is_none()) {
            return failed(format!("Channel '{}' not found", missing));
        }
        let channels: Vec<&str> = channels.into_iter().collect();

        let mut cycles = Vec::new();
        let mut phase = Phase::Idle;
        let mut capture = Capture::default();
        let mut startup_was_met = false;
        let mut last_baseline = f64::NEG_INFINITY;

        for t in merged_timeline(self.source, &channels) {
            let startup_met = self.met(startup, t);
            let baseline_met = self.met(time_base, t);

            match phase {
                Phase::Idle => {
                    if startup_met && !startup_was_met {
                        tracing::debug!("Cycle start at t={}", t);
                        capture.start = Some(t);
                        phase = Phase::RampingUp;
                    }
                }
                Phase::RampingUp => {
                    self.capture_rise(config, &mut capture, baseline_met, t);
                    if capture.base.is_some() {
                        let baseline = self
                            .conditions
                            .value(time_base, t)
                            .unwrap_or(f64::NEG_INFINITY);
                        if baseline < last_baseline {
                            tracing::debug!("Peak passed at t={}", t);
                            phase = Phase::RampingDown;
                        }
                        last_baseline = baseline;
                    }
                }
                Phase::RampingDown => {
                    if let Some(rundown) = &config.rundown_ng {
                        self.capture_rundown(rundown, &mut capture.ng, t);
                    }
                    if let Some(rundown) = &config.rundown_np {
                        self.capture_rundown(rundown, &mut capture.np, t);
                    }
                    self.capture_rise(config, &mut capture, baseline_met, t);
                    if rundowns_finished(config, &capture) {
                        cycles.push(row(cycles.len() + 1, &capture));
                        capture = Capture::default();
                        last_baseline = f64::NEG_INFINITY;
                        phase = Phase::Idle;
                    }
                }
            }
            startup_was_met = startup_met;
        }

        if phase != Phase::Idle {
            if rundowns_finished(config, &capture) {
                cycles.push(row(cycles.len() + 1, &capture));
            } else {
                tracing::warn!(
                    "Data ended during an unfinished cycle starting at t={:?}, discarded",
                    capture.start
                );
            }
        }

        tracing::info!("Functional calculation found {} cycles", cycles.len());
        FunctionalCalcResult { cycles, error: None }
    }

    fn met(&self, condition: &Condition, t: f64) -> bool {
        self.conditions.evaluate(condition, t).unwrap_or(false)
    }

    /// First instants of time-base and ignition within the cycle
    fn capture_rise(&self, config: &FunctionalCalcConfig, capture: &mut Capture, baseline_met: bool, t: f64) {
        if capture.base.is_none() && baseline_met {
            capture.base = Some(t);
        }
        if capture.ignition.is_none() {
            if let Some(ignition) = &config.ignition_time {
                if self.met(ignition, t) {
                    capture.ignition = Some(t);
                }
            }
        }
    }

    fn capture_rundown(&self, rundown: &RundownConfig, marks: &mut RundownMarks, t: f64) {
        let Ok(value) = self
            .statistics
            .evaluate(&rundown.channel, rundown.statistic, t, rundown.duration)
        else {
            return;
        };
        if marks.t1.is_none() && value < rundown.threshold1 {
            marks.t1 = Some(t);
        }
        if marks.t2.is_none() && value < rundown.threshold2 {
            marks.t2 = Some(t);
        }
    }
}

/// Every configured rundown has its T2; with no rundown, any capture will do
fn rundowns_finished(config: &FunctionalCalcConfig, capture: &Capture) -> bool {
    if config.rundown_ng.is_none() && config.rundown_np.is_none() {
        return capture.start.is_some() || capture.base.is_some();
    }
    (config.rundown_ng.is_none() || capture.ng.t2.is_some())
        && (config.rundown_np.is_none() || capture.np.t2.is_some())
}

fn row(index: usize, capture: &Capture) -> FunctionalCycle {
    let base = capture.base;
    FunctionalCycle {
        index,
        time_base: base,
        startup_time: base.zip(capture.start).map(|(base, start)| base - start),
        ignition_time: capture.ignition.zip(base).map(|(ignition, base)| ignition - base),
        ng_rundown: capture.ng.elapsed(),
        np_rundown: capture.np.elapsed(),
    }
}

fn failed(error: String) -> FunctionalCalcResult {
    tracing::warn!("Functional calculation skipped: {}", error);
    FunctionalCalcResult {
        cycles: Vec::new(),
        error: Some(error),
    }
}
