//! Compressed sample sources.
//!
//! The engine never demuxes. It pulls [`Sample`]s in decode order from a
//! [`SampleSource`] after giving it a single [`SeekHint`].
//! [`MemorySampleSource`] is a ready-made source over samples already in
//! memory, handy for still images whose tiles were read up front and for
//! tests.

use crate::configuration::SeekMode;
use crate::error::StillframeError;

/// One compressed access unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Compressed bytes.
    pub data: Vec<u8>,
    /// Presentation timestamp in microseconds.
    pub pts_us: i64,
    /// Sample duration in microseconds, if the container records one.
    pub duration_us: Option<i64>,
    /// Whether the sample can start decoding on its own (a keyframe).
    pub is_sync: bool,
}

impl Sample {
    /// A non-sync sample without a duration.
    pub fn new(data: Vec<u8>, pts_us: i64) -> Self {
        Self {
            data,
            pts_us,
            duration_us: None,
            is_sync: false,
        }
    }

    /// A sync sample without a duration.
    pub fn sync(data: Vec<u8>, pts_us: i64) -> Self {
        Self {
            is_sync: true,
            ..Self::new(data, pts_us)
        }
    }

    /// Attach a duration.
    #[must_use]
    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }
}

/// Where a source should position itself before the first read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekHint {
    /// Reference time in microseconds.
    pub time_us: i64,
    /// How to pick the starting sample relative to `time_us`.
    pub mode: SeekMode,
}

impl SeekHint {
    /// Start reading from the beginning of the track.
    pub fn start() -> Self {
        Self {
            time_us: 0,
            mode: SeekMode::PreviousSync,
        }
    }
}

/// A source of compressed samples in decode order.
///
/// `Send` because tiled images may be fed from a dedicated thread.
pub trait SampleSource: Send {
    /// Position the source according to `hint`. Called once, before the
    /// first [`next_sample`](SampleSource::next_sample).
    ///
    /// # Errors
    ///
    /// Implementations report I/O or container errors as
    /// [`StillframeError::SourceError`].
    fn seek(&mut self, hint: SeekHint) -> Result<(), StillframeError>;

    /// The next sample in decode order, or `None` once the track is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Implementations report I/O or container errors as
    /// [`StillframeError::SourceError`].
    fn next_sample(&mut self) -> Result<Option<Sample>, StillframeError>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn seek(&mut self, hint: SeekHint) -> Result<(), StillframeError> {
        (**self).seek(hint)
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, StillframeError> {
        (**self).next_sample()
    }
}

/// A [`SampleSource`] over samples held in memory.
///
/// Samples must be in decode order. Seeking picks a sync sample according
/// to the hint's mode (`Closest` lands on the previous sync sample, like
/// `PreviousSync`, leaving the rest to the decoder). When no sync sample
/// qualifies, reading starts at the first sample.
///
/// # Example
///
/// ```
/// use stillframe::{MemorySampleSource, Sample, SampleSource, SeekHint, SeekMode};
///
/// let mut source = MemorySampleSource::new(vec![
///     Sample::sync(vec![0], 0),
///     Sample::new(vec![1], 33_333),
///     Sample::sync(vec![2], 66_666),
/// ]);
/// source.seek(SeekHint { time_us: 50_000, mode: SeekMode::NextSync })?;
/// assert_eq!(source.next_sample()?.unwrap().pts_us, 66_666);
/// # Ok::<(), stillframe::StillframeError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemorySampleSource {
    samples: Vec<Sample>,
    position: usize,
    reads: usize,
}

impl MemorySampleSource {
    /// Wrap samples that are already in decode order.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self {
            samples,
            position: 0,
            reads: 0,
        }
    }

    /// How many samples have been handed out so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Index of the next sample to be read.
    pub fn position(&self) -> usize {
        self.position
    }

    fn previous_sync(&self, time_us: i64) -> Option<usize> {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, sample)| sample.is_sync && sample.pts_us <= time_us)
            // Reversed so equal timestamps resolve to the earliest sample.
            .rev()
            .max_by_key(|(_, sample)| sample.pts_us)
            .map(|(index, _)| index)
    }

    fn next_sync(&self, time_us: i64) -> Option<usize> {
        self.samples
            .iter()
            .enumerate()
            .filter(|(_, sample)| sample.is_sync && sample.pts_us >= time_us)
            .min_by_key(|(_, sample)| sample.pts_us)
            .map(|(index, _)| index)
    }
}

impl SampleSource for MemorySampleSource {
    fn seek(&mut self, hint: SeekHint) -> Result<(), StillframeError> {
        let SeekHint { time_us, mode } = hint;
        let target = match mode {
            SeekMode::PreviousSync | SeekMode::Closest => {
                self.previous_sync(time_us).or_else(|| self.next_sync(time_us))
            }
            SeekMode::NextSync => self.next_sync(time_us).or_else(|| self.previous_sync(time_us)),
            SeekMode::ClosestSync => match (self.previous_sync(time_us), self.next_sync(time_us)) {
                (Some(before), Some(after)) => {
                    let distance_before = time_us - self.samples[before].pts_us;
                    let distance_after = self.samples[after].pts_us - time_us;
                    Some(if distance_after < distance_before { after } else { before })
                }
                (before, after) => before.or(after),
            },
        };
        self.position = target.unwrap_or(0);
        log::trace!(
            "Memory source seek to {time_us}us ({mode:?}) -> sample {}",
            self.position
        );
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, StillframeError> {
        let sample = self.samples.get(self.position).cloned();
        if sample.is_some() {
            self.position += 1;
            self.reads += 1;
        }
        Ok(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gop_source() -> MemorySampleSource {
        MemorySampleSource::new(
            (0..10)
                .map(|index| {
                    let pts = index * 100;
                    if index % 4 == 0 {
                        Sample::sync(vec![index as u8], pts)
                    } else {
                        Sample::new(vec![index as u8], pts)
                    }
                })
                .collect(),
        )
    }

    #[test]
    fn previous_sync_lands_at_or_before() {
        let mut source = gop_source();
        source
            .seek(SeekHint {
                time_us: 700,
                mode: SeekMode::PreviousSync,
            })
            .unwrap();
        assert_eq!(source.next_sample().unwrap().unwrap().pts_us, 400);
    }

    #[test]
    fn closest_sync_prefers_the_nearer_side() {
        let mut source = gop_source();
        source
            .seek(SeekHint {
                time_us: 700,
                mode: SeekMode::ClosestSync,
            })
            .unwrap();
        assert_eq!(source.next_sample().unwrap().unwrap().pts_us, 800);
    }

    #[test]
    fn next_sync_past_the_end_falls_back() {
        let mut source = gop_source();
        source
            .seek(SeekHint {
                time_us: 5_000,
                mode: SeekMode::NextSync,
            })
            .unwrap();
        assert_eq!(source.next_sample().unwrap().unwrap().pts_us, 800);
    }

    #[test]
    fn equal_timestamps_seek_to_the_first_sample() {
        let tiles = (0..4u8).map(|tile| Sample::sync(vec![tile], 0)).collect();
        let mut source = MemorySampleSource::new(tiles);

        for mode in [SeekMode::PreviousSync, SeekMode::ClosestSync, SeekMode::NextSync] {
            source.seek(SeekHint { time_us: 0, mode }).unwrap();
            assert_eq!(source.next_sample().unwrap().unwrap().data, vec![0], "{mode:?}");
        }
    }

    #[test]
    fn exhausted_source_returns_none() {
        let mut source = MemorySampleSource::new(vec![Sample::sync(vec![], 0)]);
        assert!(source.next_sample().unwrap().is_some());
        assert!(source.next_sample().unwrap().is_none());
        assert_eq!(source.reads(), 1);
    }
}
