//! Channel decode strategies.
//!
//! The controller and reconstructor are shared by both channel kinds; the only place the
//! payload shape matters is here. A [`ChannelCodec`] turns one tick's raw payload into one
//! column of values per requested channel, and supplies the placeholder used for lost
//! samples.
//!
//! | Codec | Raw payload | Value | Placeholder |
//! |---|---|---|---|
//! | [`AnalogCodec`] | one `Vec<f64>` per channel | `f64` volts | `NaN` |
//! | [`DigitalCodec`] | one packed `u32` per sample | `Option<bool>` | `None` |

use std::fmt::Debug;

use serde::Serialize;

/// A decoded sample value.
pub trait SampleValue: Copy + Debug + Serialize {
    /// True if the value stands in for a lost sample.
    fn is_placeholder(&self) -> bool;

    /// Numeric view used for statistics; `None` for placeholders.
    fn as_f64(&self) -> Option<f64>;
}

impl SampleValue for f64 {
    fn is_placeholder(&self) -> bool {
        self.is_nan()
    }

    fn as_f64(&self) -> Option<f64> {
        (!self.is_nan()).then_some(*self)
    }
}

impl SampleValue for Option<bool> {
    fn is_placeholder(&self) -> bool {
        self.is_none()
    }

    fn as_f64(&self) -> Option<f64> {
        self.map(|level| if level { 1.0 } else { 0.0 })
    }
}

/// Decode strategy for one channel kind.
pub trait ChannelCodec {
    /// Raw payload read from the instrument for one tick.
    type Raw;
    /// Decoded per-channel sample value.
    type Value: SampleValue;

    /// Number of output channels.
    fn channel_count(&self) -> usize;

    /// Decode `count` samples into one column per channel, in channel order.
    ///
    /// Every column has exactly `count` entries; a short payload is padded with
    /// placeholders so the time axis stays contiguous.
    fn decode(&self, raw: &Self::Raw, count: usize) -> Vec<Vec<Self::Value>>;

    /// Value standing in for a lost sample.
    fn placeholder(&self) -> Self::Value;
}

/// Codec for continuous-valued channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalogCodec {
    channels: usize,
}

impl AnalogCodec {
    /// Codec for `channels` columns.
    pub fn new(channels: usize) -> Self {
        Self { channels }
    }
}

impl ChannelCodec for AnalogCodec {
    type Raw = Vec<Vec<f64>>;
    type Value = f64;

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn decode(&self, raw: &Self::Raw, count: usize) -> Vec<Vec<f64>> {
        (0..self.channels)
            .map(|index| {
                let column = raw.get(index).map(Vec::as_slice).unwrap_or_default();
                let mut values = Vec::with_capacity(count);
                values.extend(column.iter().take(count).copied());
                values.resize(count, f64::NAN);
                values
            })
            .collect()
    }

    fn placeholder(&self) -> f64 {
        f64::NAN
    }
}

/// Codec for bit-packed boolean channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitalCodec {
    channels: Vec<u32>,
}

impl DigitalCodec {
    /// Codec extracting `channels` (bit indices) in the given order.
    pub fn new(channels: &[u32]) -> Self {
        Self {
            channels: channels.to_vec(),
        }
    }

    /// Decode one packed sample into one level per channel.
    pub fn decode_sample(&self, raw: u32) -> Vec<bool> {
        self.channels.iter().map(|&ch| bit_set(raw, ch)).collect()
    }
}

fn bit_set(raw: u32, channel: u32) -> bool {
    raw.checked_shr(channel).map_or(false, |v| v & 1 != 0)
}

impl ChannelCodec for DigitalCodec {
    type Raw = Vec<u32>;
    type Value = Option<bool>;

    fn channel_count(&self) -> usize {
        self.channels.len()
    }

    fn decode(&self, raw: &Self::Raw, count: usize) -> Vec<Vec<Option<bool>>> {
        self.channels
            .iter()
            .map(|&ch| {
                let mut values = Vec::with_capacity(count);
                values.extend(raw.iter().take(count).map(|&s| Some(bit_set(s, ch))));
                values.resize(count, None);
                values
            })
            .collect()
    }

    fn placeholder(&self) -> Option<bool> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_bit_decode() {
        let codec = DigitalCodec::new(&[0, 1, 2]);
        let raw = (1 << 0) | (1 << 2);
        assert_eq!(codec.decode_sample(raw), vec![true, false, true]);
    }

    #[test]
    fn test_digital_columns_follow_channel_order() {
        let codec = DigitalCodec::new(&[3, 0]);
        let columns = codec.decode(&vec![0b1000, 0b0001, 0b1001], 3);
        assert_eq!(columns[0], vec![Some(true), Some(false), Some(true)]);
        assert_eq!(columns[1], vec![Some(false), Some(true), Some(true)]);
    }

    #[test]
    fn test_sample_value_numeric_view() {
        assert_eq!(1.5f64.as_f64(), Some(1.5));
        assert_eq!(f64::NAN.as_f64(), None);
        assert_eq!(Some(true).as_f64(), Some(1.0));
        assert_eq!(Some(false).as_f64(), Some(0.0));
        assert_eq!(None::<bool>.as_f64(), None);
    }

    #[test]
    fn test_digital_high_channel_is_false() {
        let codec = DigitalCodec::new(&[40]);
        assert_eq!(codec.decode_sample(u32::MAX), vec![false]);
    }

    #[test]
    fn test_short_payload_is_padded() {
        let codec = AnalogCodec::new(2);
        let columns = codec.decode(&vec![vec![1.0, 2.0], vec![3.0]], 2);
        assert_eq!(columns[0], vec![1.0, 2.0]);
        assert_eq!(columns[1][0], 3.0);
        assert!(columns[1][1].is_placeholder());

        let codec = DigitalCodec::new(&[0]);
        let columns = codec.decode(&vec![1], 3);
        assert_eq!(columns[0], vec![Some(true), None, None]);
    }
}
