// Statistic evaluation over channel windows
use crate::domain::channel::{Channel, ChannelSource, Sample};
use crate::domain::condition::StatisticKind;
use crate::error::{ReportError, Result};

/// Computes scalar statistics for channels looked up in a `ChannelSource`
pub struct StatisticEvaluator<'a, S: ChannelSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: ChannelSource + ?Sized> StatisticEvaluator<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    pub fn evaluate(&self, channel: &str, kind: StatisticKind, at_time: f64, duration: f64) -> Result<f64> {
        let series = self
            .source
            .channel(channel)
            .ok_or_else(|| ReportError::ChannelNotFound {
                channel: channel.to_string(),
            })?;
        compute(series, kind, at_time, duration)
    }
}

fn insufficient(channel: &Channel, at_time: f64) -> ReportError {
    ReportError::InsufficientData {
        channel: channel.name().to_string(),
        at_time,
    }
}

/// Statistic of `channel` at `at_time`.
///
/// Windowed kinds use every sample in `[at_time - duration, at_time]`.
/// `instantaneous` takes the nearest sample at or before `at_time`.
/// `difference` subtracts the value at `at_time - duration` from the value
/// at `at_time`; when the earlier instant precedes the data it is clamped
/// to the first sample.
pub fn compute(channel: &Channel, kind: StatisticKind, at_time: f64, duration: f64) -> Result<f64> {
    let duration = duration.max(0.0);
    match kind {
        StatisticKind::Instantaneous => channel
            .at_or_before(at_time)
            .map(|s| s.value)
            .ok_or_else(|| insufficient(channel, at_time)),
        StatisticKind::Difference => {
            let now = channel
                .at_or_before(at_time)
                .ok_or_else(|| insufficient(channel, at_time))?;
            let earlier = channel
                .at_or_before(at_time - duration)
                .or_else(|| channel.first())
                .ok_or_else(|| insufficient(channel, at_time))?;
            Ok(now.value - earlier.value)
        }
        _ => {
            let window = channel.window(at_time - duration, at_time);
            if window.is_empty() {
                return Err(insufficient(channel, at_time));
            }
            Ok(aggregate(kind, window))
        }
    }
}

/// Aggregate a non-empty window
fn aggregate(kind: StatisticKind, window: &[Sample]) -> f64 {
    let n = window.len() as f64;
    let values = window.iter().map(|s| s.value);
    match kind {
        StatisticKind::Maximum => values.fold(f64::NEG_INFINITY, f64::max),
        StatisticKind::Minimum => values.fold(f64::INFINITY, f64::min),
        StatisticKind::Rms => (values.map(|v| v * v).sum::<f64>() / n).sqrt(),
        StatisticKind::StdDev => {
            let mean = values.sum::<f64>() / n;
            let variance = window.iter().map(|s| (s.value - mean).powi(2)).sum::<f64>() / n;
            variance.sqrt()
        }
        StatisticKind::Range => {
            let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            hi - lo
        }
        // average; instantaneous and difference never reach here
        _ => values.sum::<f64>() / n,
    }
}
