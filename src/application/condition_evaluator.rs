// Condition evaluation and AND/OR combination
use crate::application::statistics::StatisticEvaluator;
use crate::domain::channel::ChannelSource;
use crate::domain::condition::{Condition, ConditionLogic, StatisticKind};
use crate::error::Result;

pub struct ConditionEvaluator<'a, S: ChannelSource + ?Sized> {
    statistics: StatisticEvaluator<'a, S>,
}

impl<'a, S: ChannelSource + ?Sized> ConditionEvaluator<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            statistics: StatisticEvaluator::new(source),
        }
    }

    /// Statistic value a condition compares. Sudden-change operators always
    /// use the difference over the condition window.
    pub fn value(&self, condition: &Condition, at_time: f64) -> Result<f64> {
        let kind = if condition.operator.is_sudden_change() {
            StatisticKind::Difference
        } else {
            condition.statistic
        };
        self.statistics
            .evaluate(&condition.channel, kind, at_time, condition.duration)
    }

    pub fn evaluate(&self, condition: &Condition, at_time: f64) -> Result<bool> {
        let value = self.value(condition, at_time)?;
        Ok(condition.operator.compare(value, condition.threshold))
    }

    /// Every condition evaluated at `at_time`, in order
    pub fn evaluate_all(&self, conditions: &[Condition], at_time: f64) -> Vec<Result<bool>> {
        conditions
            .iter()
            .map(|condition| self.evaluate(condition, at_time))
            .collect()
    }

    /// Combined truth of `conditions`. All conditions are evaluated before
    /// combining; the first error wins.
    pub fn combine(&self, conditions: &[Condition], logic: ConditionLogic, at_time: f64) -> Result<bool> {
        let outcomes = self.evaluate_all(conditions, at_time);
        let mut values = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            values.push(outcome?);
        }
        Ok(combine_values(logic, &values))
    }
}

/// AND: all true. OR: any true.
pub fn combine_values(logic: ConditionLogic, values: &[bool]) -> bool {
    match logic {
        ConditionLogic::And => values.iter().all(|v| *v),
        ConditionLogic::Or => values.iter().any(|v| *v),
    }
}
