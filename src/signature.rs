//! Per-frame signatures and best-frame scoring.
//!
//! A [`Signature`] is the concatenation of one intensity histogram per
//! pixel-format component, read straight from the decoded planes so no
//! colour conversion is needed. A [`FrameScorer`] folds signatures as they
//! arrive and finally names one candidate.

use std::ffi::c_int;

use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_sys_next::{AVPixFmtDescriptor, AVPixelFormat};

use crate::error::ThumbError;

const FLAG_BE: u64 = 1 << 0;
const FLAG_BITSTREAM: u64 = 1 << 2;
pub(crate) const FLAG_ALPHA: u64 = 1 << 7;

const MAX_COMPONENT_DEPTH: c_int = 16;

/// Look up the descriptor of a pixel format.
pub(crate) fn pixel_descriptor(format: AVPixelFormat) -> Option<&'static AVPixFmtDescriptor> {
    unsafe { ffmpeg_sys_next::av_pix_fmt_desc_get(format).as_ref() }
}

/// Concatenated per-component histograms of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    bins: Vec<u64>,
    components: Vec<usize>,
}

impl Signature {
    /// Build a signature from explicit component histograms.
    pub fn from_histograms<I>(histograms: I) -> Self
    where
        I: IntoIterator<Item = Vec<u64>>,
    {
        let mut bins = Vec::new();
        let mut components = Vec::new();
        for histogram in histograms {
            components.push(histogram.len());
            bins.extend(histogram);
        }
        Self { bins, components }
    }

    /// Histogram every component of a decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`ThumbError::InvalidData`] for pixel formats without a
    /// descriptor, without components, or with components deeper than 16
    /// bits.
    pub fn from_frame(frame: &VideoFrame) -> Result<Self, ThumbError> {
        let descriptor =
            pixel_descriptor(frame.format().into()).ok_or(ThumbError::InvalidData)?;
        let count = usize::from(descriptor.nb_components);
        if count == 0 {
            return Err(ThumbError::InvalidData);
        }

        let mut signature = Self {
            bins: Vec::new(),
            components: Vec::with_capacity(count),
        };
        for (index, component) in descriptor.comp[..count].iter().enumerate() {
            if component.depth <= 0 || component.depth > MAX_COMPONENT_DEPTH {
                return Err(ThumbError::InvalidData);
            }
            let start = signature.bins.len();
            let size = 1usize << component.depth;
            signature.bins.resize(start + size, 0);
            signature.components.push(size);

            let chroma = index == 1 || index == 2;
            let width = if chroma {
                ceil_rshift(frame.width(), descriptor.log2_chroma_w)
            } else {
                frame.width()
            };
            let height = if chroma {
                ceil_rshift(frame.height(), descriptor.log2_chroma_h)
            } else {
                frame.height()
            };
            let reader = ComponentReader {
                plane: component.plane as usize,
                step: component.step,
                offset: component.offset,
                shift: component.shift,
                depth: component.depth,
                flags: descriptor.flags,
            };
            unsafe {
                reader.count(frame, width, height, &mut signature.bins[start..]);
            }
        }
        Ok(signature)
    }

    /// All bins, component after component.
    pub fn bins(&self) -> &[u64] {
        &self.bins
    }

    /// Bin counts of each component histogram.
    pub fn components(&self) -> &[usize] {
        &self.components
    }

    /// Add `other` bin-by-bin. The fold is commutative.
    ///
    /// # Errors
    ///
    /// Returns [`ThumbError::InvalidData`] if the two signatures come from
    /// different pixel layouts.
    pub fn accumulate(&mut self, other: &Signature) -> Result<(), ThumbError> {
        if self.components != other.components {
            return Err(ThumbError::InvalidData);
        }
        for (bin, add) in self.bins.iter_mut().zip(&other.bins) {
            *bin = bin.saturating_add(*add);
        }
        Ok(())
    }

    /// Sum of the Shannon entropies (bits) of each component histogram.
    ///
    /// A flat single-colour frame scores 0.
    pub fn entropy(&self) -> f64 {
        let mut entropy = 0.0;
        let mut start = 0;
        for &size in &self.components {
            let histogram = &self.bins[start..start + size];
            start += size;
            let total: u64 = histogram.iter().sum();
            if total == 0 {
                continue;
            }
            let total = total as f64;
            entropy -= histogram
                .iter()
                .filter(|&&count| count > 0)
                .map(|&count| {
                    let p = count as f64 / total;
                    p * p.log2()
                })
                .sum::<f64>();
        }
        entropy
    }

    /// Sum of squared differences between these bins and `reference`.
    pub fn squared_error(&self, reference: &[f64]) -> f64 {
        self.bins
            .iter()
            .zip(reference)
            .map(|(&count, &mean)| {
                let error = mean - count as f64;
                error * error
            })
            .sum()
    }
}

fn ceil_rshift(value: u32, shift: u8) -> u32 {
    let shift = u32::from(shift);
    (value + (1 << shift) - 1) >> shift
}

struct ComponentReader {
    plane: usize,
    step: c_int,
    offset: c_int,
    shift: c_int,
    depth: c_int,
    flags: u64,
}

impl ComponentReader {
    /// Count every sample of this component into `histogram`.
    ///
    /// # Safety
    ///
    /// `frame` must be a decoded software frame whose format matches the
    /// descriptor this reader was built from.
    unsafe fn count(&self, frame: &VideoFrame, width: u32, height: u32, histogram: &mut [u64]) {
        let frame = unsafe { &*frame.as_ptr() };
        let data = frame.data[self.plane];
        if data.is_null() {
            return;
        }
        let linesize = frame.linesize[self.plane] as isize;
        let mask = (1u32 << self.depth) - 1;

        for row in 0..height as isize {
            let line = unsafe { data.offset(row * linesize) };
            if self.flags & FLAG_BITSTREAM != 0 {
                let mut p = unsafe { line.add((self.offset >> 3) as usize) };
                let mut shift = 8 - self.depth - (self.offset & 7);
                for _ in 0..width {
                    let value = (u32::from(unsafe { *p }) >> shift) & mask;
                    histogram[value as usize] += 1;
                    shift -= self.step;
                    p = unsafe { p.offset(-(shift >> 3) as isize) };
                    shift &= 7;
                }
            } else {
                let mut p = unsafe { line.add(self.offset as usize) };
                let narrow = self.shift + self.depth <= 8;
                let big_endian = self.flags & FLAG_BE != 0;
                if narrow && big_endian {
                    p = unsafe { p.add(1) };
                }
                for _ in 0..width {
                    let raw = unsafe {
                        if narrow {
                            u32::from(*p)
                        } else if big_endian {
                            u32::from(u16::from_be_bytes([*p, *p.add(1)]))
                        } else {
                            u32::from(u16::from_le_bytes([*p, *p.add(1)]))
                        }
                    };
                    histogram[((raw >> self.shift) & mask) as usize] += 1;
                    p = unsafe { p.add(self.step as usize) };
                }
            }
        }
    }
}

// ── Scoring ────────────────────────────────────────────────────────

/// What the selector should do with the frame it just scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retention {
    /// The frame can never win; release it now.
    Discard,
    /// The frame is the new sole leader; release every retained frame and
    /// keep this one.
    ReplaceBest,
    /// Keep the frame alongside the others until the pass ends.
    Keep,
}

/// A best-frame ranking.
///
/// Candidates are observed in decode order with 0-based indices. The
/// selector calls [`FrameScorer::select`] once, after the last candidate,
/// and commits the frame with the returned index; it must be one of the
/// frames the scorer asked to retain.
pub trait FrameScorer: Send {
    /// Fold one candidate's signature into the ranking.
    fn observe(&mut self, index: usize, signature: Signature) -> Retention;

    /// The winning candidate, or `None` if nothing was observed.
    fn select(&mut self) -> Option<usize>;
}

/// Ranks frames by tonal detail, measured as histogram entropy.
///
/// Black, white and flat frames (fades, slates) score lowest. Only the
/// current leader is retained; ties go to the earlier frame.
#[derive(Debug, Default)]
pub struct DetailScorer {
    best: Option<(usize, f64)>,
}

impl DetailScorer {
    /// Create an empty scorer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameScorer for DetailScorer {
    fn observe(&mut self, index: usize, signature: Signature) -> Retention {
        let score = signature.entropy();
        match self.best {
            Some((_, best)) if score <= best => Retention::Discard,
            _ => {
                self.best = Some((index, score));
                Retention::ReplaceBest
            }
        }
    }

    fn select(&mut self) -> Option<usize> {
        self.best.map(|(index, _)| index)
    }
}

/// Ranks frames by how close their histogram is to the mean histogram of
/// all candidates.
///
/// Every candidate is retained until the pass ends. Candidates whose pixel
/// layout differs from the first one are discarded.
#[derive(Debug, Default)]
pub struct RepresentativeScorer {
    sum: Option<Signature>,
    candidates: Vec<(usize, Signature)>,
}

impl RepresentativeScorer {
    /// Create an empty scorer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameScorer for RepresentativeScorer {
    fn observe(&mut self, index: usize, signature: Signature) -> Retention {
        match &mut self.sum {
            Some(sum) => {
                if sum.accumulate(&signature).is_err() {
                    log::debug!("Skipping candidate {index}: pixel layout changed");
                    return Retention::Discard;
                }
            }
            None => self.sum = Some(signature.clone()),
        }
        self.candidates.push((index, signature));
        Retention::Keep
    }

    fn select(&mut self) -> Option<usize> {
        let sum = self.sum.as_ref()?;
        let count = self.candidates.len() as f64;
        let mean: Vec<f64> = sum.bins().iter().map(|&bin| bin as f64 / count).collect();

        let mut best: Option<(usize, f64)> = None;
        for (index, signature) in &self.candidates {
            let error = signature.squared_error(&mean);
            if best.is_none_or(|(_, lowest)| error < lowest) {
                best = Some((*index, error));
            }
        }
        best.map(|(index, _)| index)
    }
}
