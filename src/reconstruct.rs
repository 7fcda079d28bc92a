//! Sample reconstruction.
//!
//! Consumes one [`Tick`] per controller poll and appends to an ordered list of
//! [`SampleChunk`]s:
//!
//! - `lost > 0` appends a [`SampleChunk::Placeholder`] so the time axis stays contiguous
//! - `available > 0` decodes the payload into a [`SampleChunk::Real`] chunk
//!
//! Chunks are appended in tick order. Order of arrival is order of time; nothing is
//! reordered or deduplicated.

use tracing::trace;

use crate::codec::ChannelCodec;
use crate::instrument::{InstrumentState, RecordCounts};

/// One controller poll, as seen by the reconstructor.
#[derive(Debug, Clone)]
pub struct Tick<R> {
    /// State reported by `status(true)`.
    pub state: InstrumentState,
    /// Counters reported for this poll.
    pub counts: RecordCounts,
    /// Whether the trigger had been detected at this poll (sticky).
    pub triggered: bool,
    /// Raw payload; present when `counts.available > 0`.
    pub payload: Option<R>,
}

/// An immutable run of samples.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleChunk<T> {
    /// Decoded samples, one column per channel.
    Real(Vec<Vec<T>>),
    /// `n` lost samples on every channel.
    Placeholder(u64),
}

impl<T> SampleChunk<T> {
    /// Number of samples (rows) in this chunk.
    pub fn len(&self) -> u64 {
        match self {
            Self::Real(columns) => columns.first().map_or(0, |c| c.len() as u64),
            Self::Placeholder(n) => *n,
        }
    }

    /// True if the chunk holds no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulates chunks for one acquisition.
#[derive(Debug)]
pub struct SampleReconstructor<C: ChannelCodec> {
    codec: C,
    chunks: Vec<SampleChunk<C::Value>>,
    real_samples: u64,
    placeholder_samples: u64,
    pre_trigger_samples: u64,
}

impl<C: ChannelCodec> SampleReconstructor<C> {
    /// Create an empty reconstructor.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            chunks: Vec::new(),
            real_samples: 0,
            placeholder_samples: 0,
            pre_trigger_samples: 0,
        }
    }

    /// Append the samples of one tick.
    pub fn ingest(&mut self, tick: &Tick<C::Raw>) {
        let RecordCounts {
            available, lost, ..
        } = tick.counts;

        if lost > 0 {
            self.chunks.push(SampleChunk::Placeholder(lost));
            self.placeholder_samples += lost;
        }

        if available > 0 {
            let columns = match &tick.payload {
                Some(raw) => self.codec.decode(raw, available as usize),
                None => {
                    let filler = vec![self.codec.placeholder(); available as usize];
                    vec![filler; self.codec.channel_count()]
                }
            };
            self.chunks.push(SampleChunk::Real(columns));
            self.real_samples += available;
            if !tick.triggered {
                self.pre_trigger_samples += available;
            }
        }

        trace!(
            available = available,
            lost = lost,
            chunks = self.chunks.len(),
            "Reconstructed tick"
        );
    }

    /// Drop everything accumulated so far.
    pub fn discard(&mut self) {
        self.chunks.clear();
        self.real_samples = 0;
        self.placeholder_samples = 0;
        self.pre_trigger_samples = 0;
    }

    /// Chunks accumulated so far.
    pub fn chunks(&self) -> &[SampleChunk<C::Value>] {
        &self.chunks
    }

    /// Decoded samples (rows) received.
    pub fn real_samples(&self) -> u64 {
        self.real_samples
    }

    /// Placeholder samples (rows) synthesised.
    pub fn placeholder_samples(&self) -> u64 {
        self.placeholder_samples
    }

    /// Decoded samples received before the trigger was detected.
    pub fn pre_trigger_samples(&self) -> u64 {
        self.pre_trigger_samples
    }

    /// The codec in use.
    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Consume the reconstructor, handing the chunks to the assembler.
    pub fn into_chunks(self) -> (C, Vec<SampleChunk<C::Value>>) {
        (self.codec, self.chunks)
    }
}
