//! Built-in templates offered by the configuration wizard.
//!
//! Template channel names carry the unit suffix used by the reference test
//! rigs (`Ng(rpm)`, `Temperature(°C)`, ...). They are resolved against the
//! channels of the uploaded file with [`resolve_channel`]; a template whose
//! channel cannot be resolved keeps its own name so the user can see and
//! change it.

use super::condition::{Condition, ConditionLogic, Operator, StatisticKind};
use super::evaluation::{EvaluationItem, Expectation, ItemKind};
use super::report_config::{FunctionalCalcConfig, RundownConfig, SteadyStateConfig, TriggerCombination};

pub const NG_CHANNEL: &str = "Ng(rpm)";
pub const NP_CHANNEL: &str = "Np(rpm)";
pub const TEMPERATURE_CHANNEL: &str = "Temperature(°C)";
pub const PRESSURE_CHANNEL: &str = "Pressure(kPa)";

/// Interval after which a steady-state snapshot is re-recorded while the
/// trigger stays true and condition 2 participates (seconds)
pub const STEADY_STATE_RERECORD_SECS: f64 = 600.0;

/// Name without a trailing unit suffix: `Ng(rpm)` -> `Ng`
pub fn name_stem(name: &str) -> &str {
    name.split(['(', '[']).next().unwrap_or(name).trim()
}

/// Match `wanted` against `available`: exact, then case-insensitive, then by
/// case-insensitive stem.
pub fn resolve_channel(wanted: &str, available: &[String]) -> Option<String> {
    let wanted = wanted.trim();
    if let Some(exact) = available.iter().find(|c| c.as_str() == wanted) {
        return Some(exact.clone());
    }
    if let Some(found) = available.iter().find(|c| c.eq_ignore_ascii_case(wanted)) {
        return Some(found.clone());
    }
    let wanted_stem = name_stem(wanted);
    if wanted_stem.is_empty() {
        return None;
    }
    available
        .iter()
        .find(|c| name_stem(c).eq_ignore_ascii_case(wanted_stem))
        .cloned()
}

fn resolved(template: &str, available: &[String]) -> String {
    resolve_channel(template, available).unwrap_or_else(|| template.to_string())
}

pub fn steady_condition(slot: usize, available: &[String]) -> Condition {
    if slot == 2 {
        Condition::new(resolved(NG_CHANNEL, available), StatisticKind::Range, 0.5, Operator::Lt, 200.0)
    } else {
        Condition::new(resolved(NG_CHANNEL, available), StatisticKind::Average, 0.1, Operator::Gt, 14000.0)
    }
}

pub fn steady_state(available: &[String]) -> SteadyStateConfig {
    SteadyStateConfig {
        display_channels: Vec::new(),
        combination: TriggerCombination::Cond1Only,
        condition1: Some(steady_condition(1, available)),
        condition2: Some(steady_condition(2, available)),
    }
}

pub fn time_base(available: &[String]) -> Condition {
    Condition::new(resolved(PRESSURE_CHANNEL, available), StatisticKind::Average, 0.1, Operator::Gt, 500.0)
}

pub fn startup_time(available: &[String]) -> Condition {
    Condition::new(resolved(PRESSURE_CHANNEL, available), StatisticKind::Average, 0.1, Operator::Gt, 1000.0)
}

pub fn ignition_time(available: &[String]) -> Condition {
    Condition::new(
        resolved(TEMPERATURE_CHANNEL, available),
        StatisticKind::Difference,
        0.2,
        Operator::SuddenIncrease,
        50.0,
    )
}

pub fn rundown_ng(available: &[String]) -> RundownConfig {
    RundownConfig {
        channel: resolved(NG_CHANNEL, available),
        statistic: StatisticKind::Average,
        duration: 0.1,
        threshold1: 13000.0,
        threshold2: 8000.0,
    }
}

pub fn rundown_np(available: &[String]) -> RundownConfig {
    RundownConfig {
        channel: resolved(NP_CHANNEL, available),
        statistic: StatisticKind::Average,
        duration: 0.1,
        threshold1: 10000.0,
        threshold2: 6000.0,
    }
}

pub fn functional_calc(available: &[String]) -> FunctionalCalcConfig {
    FunctionalCalcConfig {
        time_base: Some(time_base(available)),
        startup_time: Some(startup_time(available)),
        ignition_time: Some(ignition_time(available)),
        rundown_ng: Some(rundown_ng(available)),
        rundown_np: Some(rundown_np(available)),
    }
}

pub const STATUS_CATALOG_IDS: [&str; 4] = ["over_temperature", "over_speed", "surge", "startup_reached"];

/// Catalogue item with its channel resolved against `available`
pub fn status_item(id: &str, available: &[String]) -> Option<EvaluationItem> {
    let continuous = |expectation| ItemKind::ContinuousCheck { expectation };
    let (name, kind, condition) = match id {
        "over_temperature" => (
            "Over-temperature",
            continuous(Expectation::MustHold),
            Condition::new(resolved(TEMPERATURE_CHANNEL, available), StatisticKind::Instantaneous, 0.0, Operator::Lt, 850.0),
        ),
        "over_speed" => (
            "Over-speed",
            continuous(Expectation::MustHold),
            Condition::new(resolved(NG_CHANNEL, available), StatisticKind::Instantaneous, 0.0, Operator::Lt, 18000.0),
        ),
        "surge" => (
            "Surge",
            continuous(Expectation::MustNeverOccur),
            Condition::new(resolved(PRESSURE_CHANNEL, available), StatisticKind::Difference, 0.1, Operator::SuddenIncrease, 300.0),
        ),
        "startup_reached" => (
            "Start-up speed reached",
            ItemKind::FunctionalResult,
            Condition::new(resolved(NG_CHANNEL, available), StatisticKind::Average, 1.0, Operator::Ge, 14000.0),
        ),
        _ => return None,
    };
    Some(EvaluationItem {
        id: id.to_string(),
        name: name.to_string(),
        kind,
        logic: ConditionLogic::And,
        conditions: vec![condition],
    })
}
