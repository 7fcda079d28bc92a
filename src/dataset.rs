//! Dataset assembly.
//!
//! [`DatasetAssembler`] is the last step of an acquisition. It concatenates the chunks of a
//! [`SampleReconstructor`](crate::reconstruct::SampleReconstructor) into one sequence per
//! channel, computes the time axis and attaches provenance:
//!
//! ```text
//! t[i] = time_of_first_sample + i / sample_rate_actual
//! valid = lost == 0 && corrupted == 0
//! ```
//!
//! Assembly is pure: it allocates and copies, it never touches the instrument.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::codec::{ChannelCodec, SampleValue};
use crate::instrument::ChannelKind;
use crate::reconstruct::SampleChunk;

/// Running totals of one acquisition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SampleTotals {
    /// Samples counted toward the record.
    pub seen: u64,
    /// Samples lost in the device buffer.
    pub lost: u64,
    /// Samples possibly corrupted while being read.
    pub corrupted: u64,
}

/// Non-fatal conditions attached to a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AcquisitionWarning {
    /// The instrument finished before the requested number of samples was seen.
    Incomplete {
        /// Samples seen.
        collected: u64,
        /// Samples requested.
        target: u64,
    },
    /// Samples were lost and replaced by placeholders.
    SamplesLost {
        /// Number of lost samples.
        count: u64,
    },
    /// Samples may have been overwritten while being read.
    SamplesCorrupted {
        /// Number of affected samples.
        count: u64,
    },
}

impl fmt::Display for AcquisitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete { collected, target } => {
                write!(f, "Collected {}/{} samples only", collected, target)
            }
            Self::SamplesLost { count } => {
                write!(f, "{} samples were lost, reduce the sample rate", count)
            }
            Self::SamplesCorrupted { count } => {
                write!(f, "{} samples could be corrupted, reduce the sample rate", count)
            }
        }
    }
}

/// One channel of an acquired dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSeries<T> {
    /// Instrument channel index.
    pub channel: u32,
    /// Display name, `ch{index}`.
    pub name: String,
    /// Samples in time order, placeholders included.
    pub values: Vec<T>,
}

/// Mean and spread of one channel, ignoring placeholders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSummary {
    /// Channel name.
    pub name: String,
    /// Non-placeholder samples.
    pub samples: usize,
    /// Placeholder samples.
    pub placeholders: usize,
    /// Mean value; for digital channels the fraction of high samples.
    pub mean: f64,
    /// Population standard deviation.
    pub std_dev: f64,
}

/// Everything the assembler needs besides the chunks.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyMetadata {
    /// Channel kind.
    pub kind: ChannelKind,
    /// Requested channels, in output order.
    pub channels: Vec<u32>,
    /// Rate the instrument actually sampled at.
    pub sample_rate_actual: f64,
    /// Time of the first sample relative to the trigger, in seconds.
    pub time_of_first_sample: f64,
    /// Whether a trigger was detected.
    pub triggered: bool,
    /// Running totals at loop termination.
    pub totals: SampleTotals,
    /// `round(sample_rate_actual * record_length)`.
    pub target_samples: u64,
    /// Decoded samples received before the trigger.
    pub pre_trigger_samples: u64,
}

/// Final result of one acquisition. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct AcquiredDataset<T> {
    id: Uuid,
    acquired_at: DateTime<Utc>,
    kind: ChannelKind,
    channels: Vec<ChannelSeries<T>>,
    time_axis: Vec<f64>,
    sample_rate_actual: f64,
    time_of_first_sample: f64,
    triggered: bool,
    totals: SampleTotals,
    target_samples: u64,
    pre_trigger_samples: u64,
    valid: bool,
    warnings: Vec<AcquisitionWarning>,
}

/// Dataset of an analog acquisition; placeholders are `NaN`.
pub type AnalogDataset = AcquiredDataset<f64>;

/// Dataset of a digital acquisition; placeholders are `None`.
pub type DigitalDataset = AcquiredDataset<Option<bool>>;

impl<T: SampleValue> AcquiredDataset<T> {
    /// Unique id of this acquisition.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wall-clock time the dataset was assembled.
    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Channel kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// All channels, in request order.
    pub fn channels(&self) -> &[ChannelSeries<T>] {
        &self.channels
    }

    /// Samples of one instrument channel.
    pub fn channel(&self, channel: u32) -> Option<&[T]> {
        self.channels
            .iter()
            .find(|series| series.channel == channel)
            .map(|series| series.values.as_slice())
    }

    /// Timestamps in seconds, one per row.
    pub fn time_axis(&self) -> &[f64] {
        &self.time_axis
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.time_axis.len()
    }

    /// True when no rows were assembled.
    pub fn is_empty(&self) -> bool {
        self.time_axis.is_empty()
    }

    /// Rate the instrument actually sampled at, in Hz.
    pub fn sample_rate_actual(&self) -> f64 {
        self.sample_rate_actual
    }

    /// Time of the first row relative to the trigger; negative with pre-roll.
    pub fn time_of_first_sample(&self) -> f64 {
        self.time_of_first_sample
    }

    /// Whether a trigger was detected.
    pub fn triggered(&self) -> bool {
        self.triggered
    }

    /// Sample totals.
    pub fn totals(&self) -> SampleTotals {
        self.totals
    }

    /// Requested number of samples.
    pub fn target_samples(&self) -> u64 {
        self.target_samples
    }

    /// Decoded samples received before the trigger.
    pub fn pre_trigger_samples(&self) -> u64 {
        self.pre_trigger_samples
    }

    /// True iff no sample was lost or corrupted.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Non-fatal conditions detected during the run.
    pub fn warnings(&self) -> &[AcquisitionWarning] {
        &self.warnings
    }

    /// True when at least the requested number of samples was seen.
    pub fn is_complete(&self) -> bool {
        self.totals.seen >= self.target_samples
    }

    /// Placeholder rows of one channel.
    pub fn placeholder_count(&self, channel: u32) -> usize {
        self.channel(channel)
            .map_or(0, |values| values.iter().filter(|v| v.is_placeholder()).count())
    }

    /// Per-channel mean and standard deviation, ignoring placeholders.
    pub fn summary(&self) -> Vec<ChannelSummary> {
        self.channels.iter().map(summarize).collect()
    }
}

fn summarize<T: SampleValue>(series: &ChannelSeries<T>) -> ChannelSummary {
    let numeric: Vec<f64> = series.values.iter().filter_map(SampleValue::as_f64).collect();
    let samples = numeric.len();
    let (mean, std_dev) = if samples == 0 {
        (f64::NAN, f64::NAN)
    } else {
        let n = samples as f64;
        let mean = numeric.iter().sum::<f64>() / n;
        let variance = numeric.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, variance.sqrt())
    };
    ChannelSummary {
        name: series.name.clone(),
        samples,
        placeholders: series.values.len() - samples,
        mean,
        std_dev,
    }
}

/// Builds [`AcquiredDataset`]s from reconstructed chunks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DatasetAssembler;

impl DatasetAssembler {
    /// Concatenate `chunks` in order and attach `meta`.
    pub fn assemble<C: ChannelCodec>(
        codec: &C,
        chunks: Vec<SampleChunk<C::Value>>,
        meta: AssemblyMetadata,
    ) -> AcquiredDataset<C::Value> {
        let rows: u64 = chunks.iter().map(SampleChunk::len).sum();
        let rows = rows as usize;
        let placeholder = codec.placeholder();

        let mut columns: Vec<Vec<C::Value>> = (0..meta.channels.len())
            .map(|_| Vec::with_capacity(rows))
            .collect();

        for chunk in chunks {
            match chunk {
                SampleChunk::Real(chunk_columns) => {
                    for (column, values) in columns.iter_mut().zip(chunk_columns) {
                        column.extend(values);
                    }
                }
                SampleChunk::Placeholder(n) => {
                    for column in &mut columns {
                        column.resize(column.len() + n as usize, placeholder);
                    }
                }
            }
        }

        Self::build(meta, columns)
    }

    /// A dataset with no rows; used when a run failed and its samples were discarded.
    pub fn empty<T: SampleValue>(meta: AssemblyMetadata) -> AcquiredDataset<T> {
        let columns = vec![Vec::new(); meta.channels.len()];
        Self::build(meta, columns)
    }

    fn build<T: SampleValue>(meta: AssemblyMetadata, columns: Vec<Vec<T>>) -> AcquiredDataset<T> {
        let rows = columns.first().map_or(0, Vec::len);
        let time_axis = time_axis(meta.time_of_first_sample, meta.sample_rate_actual, rows);

        let channels = meta
            .channels
            .iter()
            .zip(columns)
            .map(|(&channel, values)| ChannelSeries {
                channel,
                name: format!("ch{}", channel),
                values,
            })
            .collect();

        let totals = meta.totals;
        let mut warnings = Vec::new();
        if totals.seen < meta.target_samples {
            warnings.push(AcquisitionWarning::Incomplete {
                collected: totals.seen,
                target: meta.target_samples,
            });
        }
        if totals.lost > 0 {
            warnings.push(AcquisitionWarning::SamplesLost { count: totals.lost });
        }
        if totals.corrupted > 0 {
            warnings.push(AcquisitionWarning::SamplesCorrupted {
                count: totals.corrupted,
            });
        }

        AcquiredDataset {
            id: Uuid::new_v4(),
            acquired_at: Utc::now(),
            kind: meta.kind,
            channels,
            time_axis,
            sample_rate_actual: meta.sample_rate_actual,
            time_of_first_sample: meta.time_of_first_sample,
            triggered: meta.triggered,
            totals,
            target_samples: meta.target_samples,
            pre_trigger_samples: meta.pre_trigger_samples,
            valid: totals.lost == 0 && totals.corrupted == 0,
            warnings,
        }
    }
}

fn time_axis(first: f64, rate: f64, rows: usize) -> Vec<f64> {
    (0..rows).map(|i| first + i as f64 / rate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{AnalogCodec, DigitalCodec};

    fn meta(channels: &[u32], totals: SampleTotals, target: u64) -> AssemblyMetadata {
        AssemblyMetadata {
            kind: ChannelKind::Analog,
            channels: channels.to_vec(),
            sample_rate_actual: 100.0,
            time_of_first_sample: -0.02,
            triggered: true,
            totals,
            target_samples: target,
            pre_trigger_samples: 0,
        }
    }

    #[test]
    fn test_concatenation_and_time_axis() {
        let chunks = vec![
            SampleChunk::Real(vec![vec![1.0, 2.0], vec![10.0, 20.0]]),
            SampleChunk::Placeholder(2),
            SampleChunk::Real(vec![vec![3.0], vec![30.0]]),
        ];
        let totals = SampleTotals {
            seen: 3,
            lost: 2,
            corrupted: 0,
        };
        let dataset =
            DatasetAssembler::assemble(&AnalogCodec::new(2), chunks, meta(&[0, 3], totals, 5));

        assert_eq!(dataset.len(), 5);
        let ch3 = dataset.channel(3).unwrap();
        assert_eq!(ch3[0], 10.0);
        assert!(ch3[2].is_nan() && ch3[3].is_nan());
        assert_eq!(ch3[4], 30.0);
        assert_eq!(dataset.placeholder_count(0), 2);
        assert_eq!(dataset.channels()[1].name, "ch3");

        let t = dataset.time_axis();
        assert!((t[0] + 0.02).abs() < 1e-12);
        for pair in t.windows(2) {
            assert!((pair[1] - pair[0] - 0.01).abs() < 1e-12);
        }

        assert!(!dataset.is_valid());
        assert_eq!(
            dataset.warnings(),
            &[
                AcquisitionWarning::Incomplete {
                    collected: 3,
                    target: 5
                },
                AcquisitionWarning::SamplesLost { count: 2 },
            ]
        );
    }

    #[test]
    fn test_digital_placeholders_are_none() {
        let chunks = vec![
            SampleChunk::Placeholder(1),
            SampleChunk::Real(vec![vec![Some(true)]]),
        ];
        let totals = SampleTotals {
            seen: 1,
            lost: 1,
            corrupted: 0,
        };
        let dataset =
            DatasetAssembler::assemble(&DigitalCodec::new(&[4]), chunks, meta(&[4], totals, 1));
        assert_eq!(dataset.channel(4).unwrap(), &[None, Some(true)]);
        assert!(dataset.is_complete());
    }

    #[test]
    fn test_empty_dataset() {
        let dataset: AnalogDataset =
            DatasetAssembler::empty(meta(&[0, 1], SampleTotals::default(), 10));
        assert!(dataset.is_empty());
        assert_eq!(dataset.channels().len(), 2);
        assert!(dataset.channel(1).unwrap().is_empty());
    }

    #[test]
    fn test_summary_ignores_placeholders() {
        let chunks = vec![SampleChunk::Real(vec![vec![1.0, f64::NAN, 3.0]])];
        let dataset = DatasetAssembler::assemble(
            &AnalogCodec::new(1),
            chunks,
            meta(&[0], SampleTotals::default(), 0),
        );
        let summary = &dataset.summary()[0];
        assert_eq!(summary.samples, 2);
        assert_eq!(summary.placeholders, 1);
        assert_eq!(summary.mean, 2.0);
        assert_eq!(summary.std_dev, 1.0);
    }

    #[test]
    fn test_corruption_invalidates() {
        let totals = SampleTotals {
            seen: 0,
            lost: 0,
            corrupted: 4,
        };
        let dataset: DigitalDataset = DatasetAssembler::empty(meta(&[0], totals, 0));
        assert!(!dataset.is_valid());
        assert_eq!(
            dataset.warnings()[0].to_string(),
            "4 samples could be corrupted, reduce the sample rate"
        );
    }
}
