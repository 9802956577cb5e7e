// Condition domain models: statistic kinds, comparison operators, condition logic
use crate::error::{ReportError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Absolute tolerance used by `==` and `!=`
pub const EQUALITY_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StatisticKind {
    Average,
    Maximum,
    Minimum,
    Rms,
    Instantaneous,
    /// Value now minus value `duration` seconds earlier
    Difference,
    StdDev,
    Range,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 8] = [
        StatisticKind::Average,
        StatisticKind::Maximum,
        StatisticKind::Minimum,
        StatisticKind::Rms,
        StatisticKind::Instantaneous,
        StatisticKind::Difference,
        StatisticKind::StdDev,
        StatisticKind::Range,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatisticKind::Average => "average",
            StatisticKind::Maximum => "maximum",
            StatisticKind::Minimum => "minimum",
            StatisticKind::Rms => "rms",
            StatisticKind::Instantaneous => "instantaneous",
            StatisticKind::Difference => "difference",
            StatisticKind::StdDev => "std_dev",
            StatisticKind::Range => "range",
        }
    }

    /// Whether the statistic aggregates over `[t - duration, t]`
    pub fn is_windowed(&self) -> bool {
        !matches!(self, StatisticKind::Instantaneous | StatisticKind::Difference)
    }
}

impl FromStr for StatisticKind {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let kind = match normalized.as_str() {
            "average" | "avg" | "mean" | "平均值" | "平均" => StatisticKind::Average,
            "maximum" | "max" | "最大值" | "最大" => StatisticKind::Maximum,
            "minimum" | "min" | "最小值" | "最小" => StatisticKind::Minimum,
            "rms" | "root_mean_square" | "rootmeansquare" | "有效值" => StatisticKind::Rms,
            "instantaneous" | "instant" | "瞬时值" | "瞬时" => StatisticKind::Instantaneous,
            "difference" | "diff" | "差值" | "差值计算" => StatisticKind::Difference,
            "std_dev" | "std" | "stddev" | "standard_deviation" | "标准差" => StatisticKind::StdDev,
            "range" | "peak_to_peak" | "极差" | "变化幅度" => StatisticKind::Range,
            _ => {
                return Err(ReportError::UnsupportedStatistic {
                    statistic: s.to_string(),
                });
            }
        };
        Ok(kind)
    }
}

impl TryFrom<String> for StatisticKind {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<StatisticKind> for String {
    fn from(kind: StatisticKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    /// `difference(t, duration) > threshold`
    SuddenIncrease,
    /// `difference(t, duration) < -threshold`
    SuddenDecrease,
}

impl Operator {
    pub const ALL: [Operator; 8] = [
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
        Operator::Eq,
        Operator::Ne,
        Operator::SuddenIncrease,
        Operator::SuddenDecrease,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::SuddenIncrease => "sudden_increase",
            Operator::SuddenDecrease => "sudden_decrease",
        }
    }

    pub fn is_sudden_change(&self) -> bool {
        matches!(self, Operator::SuddenIncrease | Operator::SuddenDecrease)
    }

    /// Apply the operator to a computed value. Sudden-change operators
    /// expect `value` to be the difference over the condition window.
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Operator::Gt => value > threshold,
            Operator::Lt => value < threshold,
            Operator::Ge => value >= threshold,
            Operator::Le => value <= threshold,
            Operator::Eq => (value - threshold).abs() < EQUALITY_TOLERANCE,
            Operator::Ne => (value - threshold).abs() >= EQUALITY_TOLERANCE,
            Operator::SuddenIncrease => value > threshold,
            Operator::SuddenDecrease => value < -threshold,
        }
    }
}

impl FromStr for Operator {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        let op = match normalized.as_str() {
            ">" | "gt" | "大于" => Operator::Gt,
            "<" | "lt" | "小于" => Operator::Lt,
            ">=" | "ge" | "gte" | "大于等于" => Operator::Ge,
            "<=" | "le" | "lte" | "小于等于" => Operator::Le,
            "==" | "=" | "eq" | "等于" => Operator::Eq,
            "!=" | "ne" | "不等于" => Operator::Ne,
            "sudden_increase" | "突变>" | "突增" => Operator::SuddenIncrease,
            "sudden_decrease" | "突变<" | "突降" => Operator::SuddenDecrease,
            _ => {
                return Err(ReportError::UnsupportedOperator {
                    operator: s.to_string(),
                });
            }
        };
        Ok(op)
    }
}

impl TryFrom<String> for Operator {
    type Error = ReportError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionLogic {
    #[default]
    And,
    Or,
}

impl ConditionLogic {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionLogic::And => "AND",
            ConditionLogic::Or => "OR",
        }
    }
}

impl FromStr for ConditionLogic {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "AND" | "且" | "并且" => Ok(ConditionLogic::And),
            "OR" | "或" | "或者" => Ok(ConditionLogic::Or),
            _ => Err(ReportError::invalid_value("condition_logic", format!("unknown logic '{}'", s))),
        }
    }
}

/// A single threshold test on one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub channel: String,
    pub statistic: StatisticKind,
    /// Window length in seconds; 0 for instantaneous
    #[serde(default)]
    pub duration: f64,
    pub operator: Operator,
    pub threshold: f64,
}

impl Condition {
    pub fn new(
        channel: impl Into<String>,
        statistic: StatisticKind,
        duration: f64,
        operator: Operator,
        threshold: f64,
    ) -> Self {
        Self {
            channel: channel.into(),
            statistic,
            duration,
            operator,
            threshold,
        }
    }

    /// Field-level problems, each prefixed with `path`
    pub fn problems(&self, path: &str) -> Vec<String> {
        let mut problems = Vec::new();
        if self.channel.trim().is_empty() {
            problems.push(format!("{}.channel", path));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            problems.push(format!("{}.duration", path));
        }
        if !self.threshold.is_finite() {
            problems.push(format!("{}.threshold", path));
        }
        problems
    }

    /// Human-readable form used in report rendering, e.g. `average(Ng, 2s) > 15000`
    pub fn describe(&self) -> String {
        match self.operator {
            Operator::SuddenIncrease => format!(
                "{} rises by more than {} within {}s",
                self.channel, self.threshold, self.duration
            ),
            Operator::SuddenDecrease => format!(
                "{} drops by more than {} within {}s",
                self.channel, self.threshold, self.duration
            ),
            _ if self.statistic == StatisticKind::Instantaneous => {
                format!("{} {} {}", self.channel, self.operator, self.threshold)
            }
            _ => format!(
                "{}({}, {}s) {} {}",
                self.statistic, self.channel, self.duration, self.operator, self.threshold
            ),
        }
    }
}
