//! Window search, composition, backtrack recovery, and buffer reconciliation
//! for one overlay page.
//!
//! Every page a match produces is rendered and persisted before any buffer
//! or composite state changes, so a sink failure leaves the engine as it was
//! before that match.

use image::imageops::{self, FilterType};
use image::RgbaImage;

use super::PairingEngine;
use crate::buffer::Stream;
use crate::error::{PairError, Result};
use crate::observer::PairingEvent;
use crate::oracle::{Alignment, AlignmentOracle};
use crate::sink::PageSink;

/// Unverified output for an original skipped earlier in the window.
struct BacktrackFill {
    original: u64,
    overlay: u64,
    image: RgbaImage,
}

/// Facts about one candidate pair, captured when the oracle is consulted.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    offset: usize,
    position: usize,
    original: u64,
    overlay: u64,
    original_double: bool,
    overlay_double: bool,
    original_previously_aligned: bool,
    overlay_previously_aligned: bool,
}

impl<O: AlignmentOracle, S: PageSink> PairingEngine<O, S> {
    /// Pair the overlay at `position` against the front of the original
    /// buffer.
    ///
    /// Returns the number of pages written when the overlay is consumed, and
    /// 0 when the window runs out, even if a first spread half was already
    /// written earlier in the same search. Those writes are still reported
    /// through [`PairingEvent::Matched`].
    pub(super) fn pair_overlay(&mut self, mut position: usize, feature_budget: usize) -> Result<usize> {
        let mut written = 0;
        let mut offset = 0;
        loop {
            let window = self.search_range.min(self.originals.len());
            let Some(overlay_seq) = self.overlays.at(position).map(|r| r.sequence_index()) else {
                return Ok(written);
            };
            if offset >= window {
                if written > 0 {
                    tracing::debug!(
                        "overlay {}: {} page(s) written before the window ran out",
                        overlay_seq,
                        written
                    );
                }
                self.notify(PairingEvent::Unresolved {
                    overlay: overlay_seq,
                    candidates: window,
                });
                return Ok(0);
            }

            let (Some(original), Some(overlay)) = (self.originals.at(offset), self.overlays.at(position))
            else {
                return Ok(written);
            };
            let candidate = Candidate {
                offset,
                position,
                original: original.sequence_index(),
                overlay: overlay_seq,
                original_double: original.images().is_double(),
                overlay_double: overlay.images().is_double(),
                original_previously_aligned: original.previously_aligned(),
                overlay_previously_aligned: overlay.previously_aligned(),
            };
            let aligned = self
                .oracle
                .align(overlay.images(), original.images(), feature_budget);

            let alignment = match aligned {
                Ok(alignment) => alignment,
                Err(reason) => {
                    self.notify(PairingEvent::Rejected {
                        original: candidate.original,
                        overlay: candidate.overlay,
                        reason: reason.to_string(),
                    });
                    offset += 1;
                    continue;
                }
            };

            written += self.commit_match(&candidate, alignment)?;

            self.prune(Stream::Original, offset);
            self.prune(Stream::Overlay, position);
            position = 0;

            if !candidate.original_double || candidate.overlay_double {
                self.consume(Stream::Original);
            }
            if !candidate.original_double
                && candidate.overlay_double
                && !candidate.overlay_previously_aligned
            {
                if let Some(record) = self.overlays.at_mut(0) {
                    record.mark_aligned();
                }
                self.notify(PairingEvent::AwaitingSecondHalf {
                    overlay: overlay_seq,
                });
                offset = 0;
                continue;
            }
            self.consume(Stream::Overlay);
            return Ok(written);
        }
    }

    /// Render and persist every page of a match, then record it.
    ///
    /// Returns the number of pages written.
    fn commit_match(&mut self, candidate: &Candidate, alignment: Alignment) -> Result<usize> {
        let composed = self
            .composite
            .compose(&alignment.warped, candidate.original_previously_aligned);
        let fills = self.backtrack_fills(candidate.offset, candidate.position);

        let persist = |sink: &mut S, sequence_index: u64, image: &RgbaImage| {
            sink.persist(Stream::Overlay, sequence_index, image)
                .map_err(|source| PairError::Sink {
                    sequence_index,
                    source,
                })
        };
        persist(&mut self.sink, candidate.original, &composed.image)?;
        for fill in &fills {
            persist(&mut self.sink, fill.original, &fill.image)?;
        }

        self.composite.commit(composed.image, alignment.homography);
        if let Some(record) = self.originals.at_mut(candidate.offset) {
            record.mark_aligned();
        }
        self.notify(PairingEvent::Matched {
            original: candidate.original,
            overlay: candidate.overlay,
            offset: candidate.offset,
            composited: composed.accumulated,
        });
        for fill in &fills {
            self.notify(PairingEvent::BacktrackFill {
                original: fill.original,
                overlay: fill.overlay,
            });
        }
        Ok(1 + fills.len())
    }

    /// Walk back in lockstep from just before the match while neither side
    /// has been aligned, resizing each overlay onto its original.
    fn backtrack_fills(&self, offset: usize, position: usize) -> Vec<BacktrackFill> {
        let mut fills = Vec::new();
        let (mut i, mut j) = (offset, position);
        while i > 0 && j > 0 {
            i -= 1;
            j -= 1;
            let (Some(original), Some(overlay)) = (self.originals.at(i), self.overlays.at(j)) else {
                break;
            };
            if original.previously_aligned() || overlay.previously_aligned() {
                break;
            }
            let (w, h) = original.images().dimensions();
            fills.push(BacktrackFill {
                original: original.sequence_index(),
                overlay: overlay.sequence_index(),
                image: imageops::resize(overlay.images().color(), w, h, FilterType::Triangle),
            });
        }
        fills
    }

    fn prune(&mut self, stream: Stream, count: usize) {
        if count == 0 {
            return;
        }
        match stream {
            Stream::Original => self.originals.drop_prefix(count),
            Stream::Overlay => self.overlays.drop_prefix(count),
        }
        self.notify(PairingEvent::Pruned { stream, count });
    }

    fn consume(&mut self, stream: Stream) {
        let popped = match stream {
            Stream::Original => self.originals.pop_front(),
            Stream::Overlay => self.overlays.pop_front(),
        };
        if let Some(record) = popped {
            self.notify(PairingEvent::Consumed {
                stream,
                sequence_index: record.sequence_index(),
            });
        }
    }
}
