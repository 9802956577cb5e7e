// Channel data domain models
use crate::error::{ReportError, Result};
use std::collections::BTreeMap;

/// Tolerance applied to window bounds and timestamp comparisons (seconds)
pub const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: f64, value: f64) -> Self {
        Self { time, value }
    }
}

/// A named, immutable time series. Timestamps are strictly increasing.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    name: String,
    unit: Option<String>,
    samples: Vec<Sample>,
}

impl Channel {
    pub fn new(name: impl Into<String>, unit: Option<String>, samples: Vec<Sample>) -> Result<Self> {
        let name = name.into();
        for (idx, sample) in samples.iter().enumerate() {
            if !sample.time.is_finite() {
                return Err(ReportError::InvalidData(format!(
                    "channel '{}' has a non-finite timestamp at row {}",
                    name, idx
                )));
            }
            if idx > 0 && sample.time <= samples[idx - 1].time {
                return Err(ReportError::InvalidData(format!(
                    "channel '{}' timestamps are not strictly increasing at row {} ({} after {})",
                    name,
                    idx,
                    sample.time,
                    samples[idx - 1].time
                )));
            }
        }
        Ok(Self { name, unit, samples })
    }

    /// Build from `(time, value)` pairs
    pub fn from_pairs(name: impl Into<String>, pairs: &[(f64, f64)]) -> Result<Self> {
        let samples = pairs.iter().map(|&(t, v)| Sample::new(t, v)).collect();
        Self::new(name, None, samples)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Nearest sample at or before `time` (no interpolation)
    pub fn at_or_before(&self, time: f64) -> Option<&Sample> {
        let idx = self
            .samples
            .partition_point(|s| s.time <= time + TIME_EPSILON);
        if idx == 0 {
            None
        } else {
            self.samples.get(idx - 1)
        }
    }

    /// Samples with timestamp in `[from, to]`, inclusive on both ends
    pub fn window(&self, from: f64, to: f64) -> &[Sample] {
        let lo = self
            .samples
            .partition_point(|s| s.time < from - TIME_EPSILON);
        let hi = self
            .samples
            .partition_point(|s| s.time <= to + TIME_EPSILON);
        if lo >= hi { &[] } else { &self.samples[lo..hi] }
    }
}

/// Read access to the channels of one file
pub trait ChannelSource: Send + Sync {
    fn channel(&self, name: &str) -> Option<&Channel>;

    fn channel_names(&self) -> Vec<String>;
}

/// Immutable snapshot of one file's parsed channels
#[derive(Debug, Clone, Default)]
pub struct ChannelSet {
    channels: BTreeMap<String, Channel>,
}

impl ChannelSet {
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for channel in channels {
            let name = channel.name().to_string();
            if map.insert(name.clone(), channel).is_some() {
                return Err(ReportError::InvalidData(format!(
                    "duplicate channel name '{}'",
                    name
                )));
            }
        }
        Ok(Self { channels: map })
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.values()
    }
}

impl ChannelSource for ChannelSet {
    fn channel(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    fn channel_names(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }
}

/// Union of sample timestamps across `names`, ascending and de-duplicated.
/// Unknown channels contribute nothing.
pub fn merged_timeline<S: ChannelSource + ?Sized>(source: &S, names: &[&str]) -> Vec<f64> {
    let mut times: Vec<f64> = names
        .iter()
        .filter_map(|name| source.channel(name))
        .flat_map(|channel| channel.samples().iter().map(|s| s.time))
        .collect();
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup_by(|a, b| (*a - *b).abs() <= TIME_EPSILON);
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ng() -> Channel {
        Channel::from_pairs(
            "Ng",
            &[
                (0.0, 14000.0),
                (1.0, 15200.0),
                (2.0, 15300.0),
                (3.0, 15100.0),
                (4.0, 14800.0),
                (5.0, 14950.0),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let err = Channel::from_pairs("Ng", &[(0.0, 1.0), (1.0, 2.0), (1.0, 3.0)]).unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(_)));
    }

    #[test]
    fn test_at_or_before() {
        let channel = ng();
        assert_eq!(channel.at_or_before(2.5).unwrap().value, 15300.0);
        assert_eq!(channel.at_or_before(3.0).unwrap().value, 15100.0);
        assert!(channel.at_or_before(-0.5).is_none());
        assert_eq!(channel.at_or_before(100.0).unwrap().value, 14950.0);
    }

    #[test]
    fn test_window_is_inclusive() {
        let channel = ng();
        let window = channel.window(1.0, 3.0);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].time, 1.0);
        assert_eq!(window[2].time, 3.0);
        assert!(channel.window(5.5, 6.0).is_empty());
    }

    #[test]
    fn test_window_absorbs_float_drift() {
        let channel = Channel::from_pairs("x", &[(0.1, 1.0), (0.2, 2.0), (0.3, 3.0)]).unwrap();
        // 0.3 - 0.2 is not exactly 0.1
        assert_eq!(channel.window(0.3 - 0.2, 0.3).len(), 3);
    }

    #[test]
    fn test_merged_timeline_dedups_and_sorts() {
        let a = Channel::from_pairs("a", &[(0.0, 1.0), (2.0, 1.0)]).unwrap();
        let b = Channel::from_pairs("b", &[(1.0, 1.0), (2.0, 1.0), (3.0, 1.0)]).unwrap();
        let set = ChannelSet::new(vec![a, b]).unwrap();
        assert_eq!(merged_timeline(&set, &["a", "b", "missing"]), vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_duplicate_channel_names_rejected() {
        let err = ChannelSet::new(vec![ng(), ng()]).unwrap_err();
        assert!(matches!(err, ReportError::InvalidData(_)));
    }
}
