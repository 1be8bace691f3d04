//! The pairing engine: owns both stream buffers and the composite state, and
//! drives the oracle search for every overlay page that arrives.
//!
//! Ingestion is strictly ordered and synchronous. Originals are buffered and
//! persisted as they come in; each normalized overlay page triggers one
//! search over a bounded window of buffered originals (see [`search`]).

mod config;
mod search;

use serde::{Deserialize, Serialize};

use crate::buffer::{Stream, StreamBuffer};
use crate::composite::CompositeState;
use crate::error::{PairError, Result};
use crate::observer::{PairingEvent, PairingObserver, TracingObserver};
use crate::oracle::{AlignmentOracle, FeatureAligner};
use crate::page::{PageSummary, RawPage};
use crate::preprocess::{IngestOptions, Preprocessor};
use crate::sink::PageSink;

pub use config::{PairingConfig, DEFAULT_FEATURE_BUDGET, DEFAULT_SEARCH_RANGE};

/// Serializable view of the engine's buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub originals: Vec<PageSummary>,
    pub overlays: Vec<PageSummary>,
    pub next_original_index: u64,
    pub next_overlay_index: u64,
    pub has_composite: bool,
}

/// Online pairing of an original and an overlay page stream.
pub struct PairingEngine<O, S> {
    originals: StreamBuffer,
    overlays: StreamBuffer,
    composite: CompositeState,
    search_range: usize,
    preprocessor: Preprocessor,
    oracle: O,
    sink: S,
    observer: Box<dyn PairingObserver>,
}

impl<S: PageSink> PairingEngine<FeatureAligner, S> {
    /// Engine with the feature-based oracle tuned by `config.aligner`.
    pub fn from_config(config: &PairingConfig, sink: S) -> Self {
        Self::new(FeatureAligner::new(config.aligner.clone()), sink)
            .with_search_range(config.search_range)
    }
}

impl<O: AlignmentOracle, S: PageSink> PairingEngine<O, S> {
    pub fn new(oracle: O, sink: S) -> Self {
        Self {
            originals: StreamBuffer::new(Stream::Original),
            overlays: StreamBuffer::new(Stream::Overlay),
            composite: CompositeState::default(),
            search_range: DEFAULT_SEARCH_RANGE,
            preprocessor: Preprocessor,
            oracle,
            sink,
            observer: Box::new(TracingObserver),
        }
    }

    pub fn with_search_range(mut self, search_range: usize) -> Self {
        self.search_range = search_range;
        self
    }

    /// Replace the default [`TracingObserver`].
    pub fn with_observer(mut self, observer: impl PairingObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn search_range(&self) -> usize {
        self.search_range
    }

    pub fn originals(&self) -> &StreamBuffer {
        &self.originals
    }

    pub fn overlays(&self) -> &StreamBuffer {
        &self.overlays
    }

    pub fn composite(&self) -> &CompositeState {
        &self.composite
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Clear both buffers, both counters, and the composite.
    pub fn reset(&mut self) {
        self.originals.clear();
        self.overlays.clear();
        self.composite.clear();
        tracing::debug!("engine reset");
    }

    /// Normalize, persist, and buffer an original page.
    ///
    /// Every produced page is persisted before any is buffered, so a sink
    /// failure leaves the buffer and its counter untouched.
    ///
    /// Returns the number of pages added (two for a split spread).
    pub fn add_original(&mut self, raw: RawPage<'_>, options: &IngestOptions) -> Result<usize> {
        let pages = self.preprocessor.normalize(raw, options)?;
        let added = pages.len();
        let first = self.originals.next_index();
        for (sequence_index, page) in (first..).zip(&pages) {
            self.sink
                .persist(Stream::Original, sequence_index, page.color())
                .map_err(|source| PairError::Sink {
                    sequence_index,
                    source,
                })?;
        }
        for page in pages {
            self.originals.push_back(page);
        }
        tracing::debug!(
            "added {} original page(s); {} buffered",
            added,
            self.originals.len()
        );
        Ok(added)
    }

    /// Normalize and buffer an overlay page, then pair each produced page in
    /// arrival order.
    ///
    /// All halves are buffered before the first search, so a sink failure
    /// while pairing one half leaves the other resident for a later retry.
    ///
    /// Returns the number of output pages written across all searches this
    /// call triggered, backtrack fills included.
    pub fn add_overlay(
        &mut self,
        raw: RawPage<'_>,
        options: &IngestOptions,
        feature_budget: usize,
    ) -> Result<usize> {
        let pages = self.preprocessor.normalize(raw, options)?;
        let loaded: Vec<u64> = pages
            .into_iter()
            .map(|page| self.overlays.push_back(page))
            .collect();
        let mut written = 0;
        for sequence_index in loaded {
            if let Some(position) = self.overlays.position_of(sequence_index) {
                written += self.pair_overlay(position, feature_budget)?;
            }
        }
        tracing::info!(
            "overlay ingested: {} page(s) written, {} original(s) and {} overlay(s) buffered",
            written,
            self.originals.len(),
            self.overlays.len()
        );
        Ok(written)
    }

    /// Search again for every overlay still buffered, front to back.
    ///
    /// An overlay consumed by an earlier search in the same pass is skipped.
    pub fn retry_pending(&mut self, feature_budget: usize) -> Result<usize> {
        let pending: Vec<u64> = self.overlays.iter().map(|r| r.sequence_index()).collect();
        let mut written = 0;
        for sequence_index in pending {
            if let Some(position) = self.overlays.position_of(sequence_index) {
                written += self.pair_overlay(position, feature_budget)?;
            }
        }
        if written > 0 {
            tracing::info!("retry resolved {} page(s)", written);
        }
        Ok(written)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            originals: self.originals.summaries(),
            overlays: self.overlays.summaries(),
            next_original_index: self.originals.next_index(),
            next_overlay_index: self.overlays.next_index(),
            has_composite: self.composite.image().is_some(),
        }
    }

    fn notify(&mut self, event: PairingEvent) {
        self.observer.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::EventLog;
    use crate::preprocess::ReadingDirection;
    use crate::sink::MemorySink;
    use crate::test_utils::{spread_rgba, tagged_rgba, two_tag_rgba, FailingSink, ScriptedOracle};
    use image::{Rgba, RgbaImage};

    const BUDGET: usize = 500;

    fn engine() -> (PairingEngine<ScriptedOracle, MemorySink>, EventLog) {
        let log = EventLog::new();
        let engine = PairingEngine::new(ScriptedOracle::default(), MemorySink::new())
            .with_observer(log.clone());
        (engine, log)
    }

    fn plain() -> IngestOptions {
        IngestOptions::passthrough()
    }

    fn split_ltr() -> IngestOptions {
        IngestOptions {
            split: true,
            reading_direction: ReadingDirection::LeftToRight,
            ..IngestOptions::passthrough()
        }
    }

    fn add_original(e: &mut PairingEngine<ScriptedOracle, MemorySink>, img: &RgbaImage) -> usize {
        e.add_original(RawPage::from_image(img), &plain()).unwrap()
    }

    fn add_overlay(e: &mut PairingEngine<ScriptedOracle, MemorySink>, img: &RgbaImage) -> usize {
        e.add_overlay(RawPage::from_image(img), &plain(), BUDGET).unwrap()
    }

    fn indices(summaries: &[PageSummary]) -> Vec<u64> {
        summaries.iter().map(|s| s.sequence_index).collect()
    }

    #[test]
    fn single_original_single_overlay() {
        let (mut e, _) = engine();
        assert_eq!(add_original(&mut e, &tagged_rgba(800, 1200, 1, 0)), 1);
        assert_eq!(add_overlay(&mut e, &tagged_rgba(800, 1200, 1, 40)), 1);

        assert!(e.originals().is_empty());
        assert!(e.overlays().is_empty());
        assert!(e.sink().page(Stream::Original, 0).is_some());
        let out = e.sink().page(Stream::Overlay, 0).unwrap();
        assert_eq!(out.dimensions(), (800, 1200));
        assert_eq!(out.get_pixel(10, 10), &Rgba([0, 40, 0, 255]));
    }

    #[test]
    fn split_original_and_split_overlay_pair_half_by_half() {
        let (mut e, log) = engine();
        let original = spread_rgba(2400, 1200, 1, 2, 0);
        let added = e.add_original(RawPage::from_image(&original), &split_ltr()).unwrap();
        assert_eq!(added, 2);
        let snap = e.snapshot();
        assert!(snap
            .originals
            .iter()
            .all(|s| (s.width, s.height) == (1200, 1200) && s.class.is_double()));

        let overlay = spread_rgba(2400, 1200, 1, 2, 30);
        let written = e
            .add_overlay(RawPage::from_image(&overlay), &split_ltr(), BUDGET)
            .unwrap();
        assert_eq!(written, 2);
        assert!(e.originals().is_empty());
        assert!(e.overlays().is_empty());
        assert_eq!(e.sink().indices(Stream::Overlay), vec![0, 1]);

        let composited: Vec<bool> = log
            .events()
            .into_iter()
            .filter_map(|ev| match ev {
                PairingEvent::Matched { composited, .. } => Some(composited),
                _ => None,
            })
            .collect();
        assert_eq!(composited, vec![false, false]);
    }

    #[test]
    fn unmatched_overlay_waits_and_resolves_on_retry() {
        let (mut e, _) = engine();
        for tag in 1..=3 {
            add_original(&mut e, &tagged_rgba(80, 120, tag, 0));
        }
        assert_eq!(add_overlay(&mut e, &tagged_rgba(80, 120, 9, 10)), 0);
        assert_eq!(e.oracle().calls(), 3);
        assert_eq!(e.overlays().len(), 1);
        assert!(!e.overlays().front().unwrap().previously_aligned());

        add_original(&mut e, &tagged_rgba(80, 120, 9, 0));
        assert_eq!(e.retry_pending(BUDGET).unwrap(), 1);
        assert!(e.originals().is_empty());
        assert!(e.overlays().is_empty());
        // Resolved from the buffer, not re-ingested.
        assert_eq!(e.snapshot().next_overlay_index, 1);
        assert!(e.sink().page(Stream::Overlay, 3).is_some());
    }

    #[test]
    fn search_is_limited_to_window() {
        let (mut e, log) = engine();
        for tag in 1..=12 {
            add_original(&mut e, &tagged_rgba(80, 120, tag, 0));
        }
        assert_eq!(add_overlay(&mut e, &tagged_rgba(80, 120, 12, 10)), 0);
        assert_eq!(e.oracle().calls(), DEFAULT_SEARCH_RANGE);
        assert!(log.events().contains(&PairingEvent::Unresolved {
            overlay: 0,
            candidates: DEFAULT_SEARCH_RANGE,
        }));
        assert_eq!(e.originals().len(), 12);
    }

    #[test]
    fn double_overlay_on_single_original_awaits_second_half() {
        let (mut e, log) = engine();
        add_original(&mut e, &tagged_rgba(80, 120, 1, 0));
        // The first half is written, but an exhausted window reports 0.
        assert_eq!(add_overlay(&mut e, &two_tag_rgba(240, 120, 1, 2, 20)), 0);
        assert_eq!(e.sink().indices(Stream::Overlay), vec![0]);

        assert!(e.originals().is_empty());
        assert_eq!(e.overlays().len(), 1);
        assert!(e.overlays().front().unwrap().previously_aligned());
        assert!(log
            .events()
            .contains(&PairingEvent::AwaitingSecondHalf { overlay: 0 }));

        add_original(&mut e, &tagged_rgba(80, 120, 2, 0));
        assert_eq!(e.retry_pending(BUDGET).unwrap(), 1);
        assert!(e.originals().is_empty());
        assert!(e.overlays().is_empty(), "second resolution must pop the overlay");
        assert_eq!(e.sink().indices(Stream::Overlay), vec![0, 1]);
    }

    #[test]
    fn double_overlay_resolves_both_halves_in_one_call() {
        let (mut e, _) = engine();
        add_original(&mut e, &tagged_rgba(80, 120, 1, 0));
        add_original(&mut e, &tagged_rgba(80, 120, 2, 0));
        assert_eq!(add_overlay(&mut e, &two_tag_rgba(240, 120, 1, 2, 20)), 2);
        assert!(e.originals().is_empty());
        assert!(e.overlays().is_empty());
        assert_eq!(e.sink().indices(Stream::Overlay), vec![0, 1]);
    }

    #[test]
    fn backtrack_fills_skipped_originals_without_oracle() {
        let (mut e, log) = engine();
        for tag in 1..=3 {
            add_original(&mut e, &tagged_rgba(80, 120, tag, 0));
        }
        assert_eq!(add_overlay(&mut e, &tagged_rgba(60, 90, 7, 0)), 0);
        assert_eq!(add_overlay(&mut e, &tagged_rgba(60, 90, 8, 0)), 0);
        assert_eq!(add_overlay(&mut e, &tagged_rgba(80, 120, 3, 50)), 3);
        assert_eq!(e.oracle().calls(), 9);

        let fill = e.sink().page(Stream::Overlay, 0).unwrap();
        assert_eq!(fill.dimensions(), (80, 120));
        assert_eq!(fill.get_pixel(40, 60)[0], 7);
        assert_eq!(e.sink().page(Stream::Overlay, 1).unwrap().get_pixel(40, 60)[0], 8);
        assert!(e.originals().is_empty());
        assert!(e.overlays().is_empty());

        let events = log.events();
        assert!(events.contains(&PairingEvent::BacktrackFill {
            original: 1,
            overlay: 1
        }));
        assert!(events.contains(&PairingEvent::BacktrackFill {
            original: 0,
            overlay: 0
        }));
        assert!(events.contains(&PairingEvent::Pruned {
            stream: Stream::Overlay,
            count: 2
        }));
    }

    #[test]
    fn overlays_on_one_double_original_compose_in_either_order() {
        let run = |shades: [u8; 2]| {
            let (mut e, log) = engine();
            add_original(&mut e, &tagged_rgba(240, 120, 1, 0));
            for shade in shades {
                assert_eq!(add_overlay(&mut e, &tagged_rgba(80, 120, 1, shade)), 1);
            }
            assert_eq!(e.originals().len(), 1, "double original stays for more overlays");
            assert!(log.events().iter().any(|ev| matches!(
                ev,
                PairingEvent::Matched {
                    composited: true,
                    ..
                }
            )));
            e.sink().page(Stream::Overlay, 0).cloned().unwrap()
        };
        let forward = run([30, 50]);
        let backward = run([50, 30]);
        assert_eq!(forward, backward);
        assert_eq!(forward.get_pixel(0, 0), &Rgba([0, 80, 0, 255]));
    }

    #[test]
    fn sink_failure_leaves_buffers_untouched() {
        let mut e = PairingEngine::new(ScriptedOracle::default(), FailingSink::overlays());
        e.add_original(RawPage::from_image(&tagged_rgba(80, 120, 1, 0)), &plain())
            .unwrap();
        let before = e.snapshot();
        let err = e
            .add_overlay(RawPage::from_image(&tagged_rgba(80, 120, 1, 5)), &plain(), BUDGET)
            .unwrap_err();
        assert!(matches!(err, PairError::Sink { sequence_index: 0, .. }));

        let after = e.snapshot();
        assert_eq!(after.originals, before.originals);
        assert!(!after.originals[0].previously_aligned);
        assert_eq!(after.overlays.len(), 1);
        assert!(!after.has_composite);
    }

    #[test]
    fn sink_failure_on_second_spread_half_buffers_no_original() {
        let mut e = PairingEngine::new(ScriptedOracle::default(), FailingSink::at(Stream::Original, 1));
        let spread = spread_rgba(2400, 1200, 1, 2, 0);
        let err = e
            .add_original(RawPage::from_image(&spread), &split_ltr())
            .unwrap_err();
        assert!(matches!(err, PairError::Sink { sequence_index: 1, .. }));

        let snap = e.snapshot();
        assert!(snap.originals.is_empty());
        assert_eq!(snap.next_original_index, 0);
        // Only the refused half is missing from the sink.
        assert_eq!(e.sink().inner().indices(Stream::Original), vec![0]);
    }

    #[test]
    fn sink_failure_while_pairing_keeps_both_overlay_halves() {
        let mut e = PairingEngine::new(ScriptedOracle::default(), FailingSink::at(Stream::Overlay, 0));
        for tag in [1, 2] {
            e.add_original(RawPage::from_image(&tagged_rgba(1200, 1200, tag, 0)), &plain())
                .unwrap();
        }
        let overlay = spread_rgba(2400, 1200, 1, 2, 30);
        let err = e
            .add_overlay(RawPage::from_image(&overlay), &split_ltr(), BUDGET)
            .unwrap_err();
        assert!(matches!(err, PairError::Sink { sequence_index: 0, .. }));

        let snap = e.snapshot();
        assert_eq!(indices(&snap.overlays), vec![0, 1]);
        assert_eq!(snap.next_overlay_index, 2);
        assert_eq!(indices(&snap.originals), vec![0, 1]);
        assert!(snap.originals.iter().all(|s| !s.previously_aligned));
        assert!(e.sink().inner().indices(Stream::Overlay).is_empty());
    }

    #[test]
    fn malformed_input_pushes_nothing() {
        let (mut e, _) = engine();
        let bytes = [0u8; 10];
        assert!(matches!(
            e.add_original(RawPage::new(&bytes, 4, 4), &plain()),
            Err(PairError::MalformedPage(_))
        ));
        assert!(matches!(
            e.add_overlay(RawPage::new(&bytes, 0, 4), &plain(), BUDGET),
            Err(PairError::MalformedPage(_))
        ));
        let snap = e.snapshot();
        assert_eq!(snap.next_original_index, 0);
        assert_eq!(snap.next_overlay_index, 0);
        assert!(e.sink().writes().is_empty());
    }

    #[test]
    fn indices_are_monotonic_and_buffers_stay_ordered() {
        let (mut e, _) = engine();
        let mut seen = Vec::new();
        for (orig, over) in [(1, 5), (2, 2), (3, 6), (4, 7), (5, 3)] {
            add_original(&mut e, &tagged_rgba(80, 120, orig, 0));
            add_overlay(&mut e, &tagged_rgba(80, 120, over, 1));
            let snap = e.snapshot();
            for buf in [&snap.originals, &snap.overlays] {
                let idx = indices(buf);
                assert!(idx.windows(2).all(|w| w[0] < w[1]), "{:?}", idx);
            }
            seen.push((snap.next_original_index, snap.next_overlay_index));
        }
        assert!(seen.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
    }

    #[test]
    fn reset_is_idempotent() {
        let (mut e, _) = engine();
        add_original(&mut e, &tagged_rgba(80, 120, 1, 0));
        add_overlay(&mut e, &tagged_rgba(80, 120, 1, 0));
        add_overlay(&mut e, &tagged_rgba(80, 120, 4, 0));

        e.reset();
        let once = e.snapshot();
        e.reset();
        assert_eq!(e.snapshot(), once);
        assert!(once.originals.is_empty() && once.overlays.is_empty());
        assert_eq!((once.next_original_index, once.next_overlay_index), (0, 0));
        assert!(!once.has_composite);
    }
}
