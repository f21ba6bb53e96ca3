//! Recognition run orchestration.
//!
//! Layout: `sampler (calling thread) → bounded queue → N workers → aggregator`
//!
//! Each worker owns one extractor for the whole run and matches against the
//! shared read-only gallery. The aggregator is the only place results meet,
//! so completion order does not matter.

use crate::options::EngineOptions;
use crate::report::{BudgetLimit, FrameFailure, RunReport};
use attend_core::{
    EuclideanMatcher, ExtractError, FaceExtractor, Gallery, GalleryError, GalleryLoad,
    GallerySource, MatchResult, Matcher, OnnxFaceExtractor, PresenceAggregator,
};
use attend_video::{EmptySource, FfmpegSource, FrameSampler, FrameSource, SampledFrame};
use crossbeam_channel::{Receiver, Sender};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("gallery error: {0}")]
    Gallery(#[from] GalleryError),
    #[error("extractor error: {0}")]
    Extractor(#[from] ExtractError),
    #[error("invalid engine options: {0}")]
    InvalidOptions(String),
    #[error("engine needs at least one extractor")]
    NoExtractors,
    #[error("{0} thread panicked")]
    ThreadPanicked(&'static str),
}

/// Runs sampled video frames through face extraction and matching.
pub struct Engine {
    extractors: Vec<Box<dyn FaceExtractor>>,
    matcher: Box<dyn Matcher>,
    options: EngineOptions,
}

impl Engine {
    /// One worker per extractor. Matching uses Euclidean distance at the
    /// configured tolerance.
    pub fn new(
        extractors: Vec<Box<dyn FaceExtractor>>,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        options.validate().map_err(EngineError::InvalidOptions)?;
        if extractors.is_empty() {
            return Err(EngineError::NoExtractors);
        }

        Ok(Self {
            matcher: Box::new(EuclideanMatcher::new(options.tolerance)),
            extractors,
            options,
        })
    }

    /// Load one SCRFD + ArcFace extractor per configured worker.
    pub fn from_model_dir(model_dir: &Path, options: EngineOptions) -> Result<Self, EngineError> {
        options.validate().map_err(EngineError::InvalidOptions)?;

        let mut extractors: Vec<Box<dyn FaceExtractor>> = Vec::with_capacity(options.workers);
        for _ in 0..options.workers {
            extractors.push(Box::new(OnnxFaceExtractor::from_model_dir(model_dir)?));
        }
        tracing::info!(
            model_dir = %model_dir.display(),
            workers = extractors.len(),
            "extractor pool ready"
        );

        Self::new(extractors, options)
    }

    /// Replace the default Euclidean matcher.
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn workers(&self) -> usize {
        self.extractors.len()
    }

    /// Identify who appears in a video file, examining one frame out of
    /// every `frame_interval`.
    ///
    /// A video that cannot be opened is treated as having no frames: the run
    /// still succeeds with an empty presence set and `video_error` set. Only a
    /// gallery source failure is fatal.
    pub fn process(
        &mut self,
        video: &Path,
        gallery_source: &dyn GallerySource,
        frame_interval: NonZeroUsize,
    ) -> Result<RunReport, EngineError> {
        match FfmpegSource::open(video) {
            Ok(source) => self.process_frames(source, gallery_source, frame_interval),
            Err(e) => {
                tracing::warn!(
                    path = %video.display(),
                    error = %e,
                    "video unreadable; treating it as containing no frames"
                );
                let mut report =
                    self.process_frames(EmptySource, gallery_source, frame_interval)?;
                report.video_error = Some(e.to_string());
                Ok(report)
            }
        }
    }

    /// Identify who appears in an already-open frame source.
    pub fn process_frames<S: FrameSource>(
        &mut self,
        source: S,
        gallery_source: &dyn GallerySource,
        frame_interval: NonZeroUsize,
    ) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        let dimension = self.extractors.first().and_then(|e| e.descriptor_dimension());
        let GalleryLoad { gallery, rejected } = Gallery::load(gallery_source, dimension)?;

        let sampler = FrameSampler::new(source, frame_interval);
        let budget = Budget::start(&self.options, started);

        let (work_tx, work_rx) =
            crossbeam_channel::bounded::<SampledFrame>(self.options.queue_capacity());
        let (outcome_tx, outcome_rx) = crossbeam_channel::unbounded::<FrameOutcome>();

        let matcher: &dyn Matcher = self.matcher.as_ref();
        let gallery = &gallery;
        let extractors = &mut self.extractors;

        let (tally, stopped_by, workers_timed_out) = std::thread::scope(|scope| {
            let workers: Vec<_> = extractors
                .iter_mut()
                .enumerate()
                .map(|(id, extractor)| {
                    let worker = Worker {
                        id,
                        extractor: extractor.as_mut(),
                        matcher,
                        gallery,
                        budget,
                    };
                    let work_rx = work_rx.clone();
                    let outcome_tx = outcome_tx.clone();
                    scope.spawn(move || worker.run(work_rx, outcome_tx))
                })
                .collect();
            drop(work_rx);

            let collector = scope.spawn(move || collect(outcome_rx));

            let stopped_by = produce(sampler, budget, &work_tx, &outcome_tx);
            drop(work_tx);
            drop(outcome_tx);

            // Every handle is joined before reporting; an unjoined panicked
            // thread would make the scope itself panic.
            let mut panicked = None;
            let mut timed_out = false;
            for handle in workers {
                match handle.join() {
                    Ok(hit_deadline) => timed_out |= hit_deadline,
                    Err(_) => {
                        panicked.get_or_insert("worker");
                    }
                }
            }
            let tally = collector.join();

            match (panicked, tally) {
                (Some(thread), _) => Err(EngineError::ThreadPanicked(thread)),
                (None, Err(_)) => Err(EngineError::ThreadPanicked("aggregator")),
                (None, Ok(tally)) => Ok((tally, stopped_by, timed_out)),
            }
        })?;

        let budget_exhausted =
            stopped_by.or_else(|| workers_timed_out.then(|| budget.time_limit()).flatten());

        let report = RunReport {
            faces_detected: tally.aggregator.faces_seen(),
            faces_matched: tally.aggregator.faces_matched(),
            present: tally.aggregator.finish(),
            frames_sampled: tally.frames_examined,
            frame_failures: tally.failures,
            rejected_entries: rejected,
            budget_exhausted,
            video_error: None,
        };

        if let Some(limit) = report.budget_exhausted {
            tracing::warn!(
                limit = ?limit,
                frames = report.frames_sampled,
                "run budget exhausted; presence set is partial"
            );
        }
        tracing::info!(
            present = report.present.len(),
            frames = report.frames_sampled,
            interval = frame_interval.get(),
            faces = report.faces_detected,
            matched = report.faces_matched,
            failures = report.frame_failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "recognition run finished"
        );

        Ok(report)
    }
}

/// What the pipeline learned about one sampled frame.
enum FrameOutcome {
    Examined { results: Vec<MatchResult> },
    Failed(FrameFailure),
}

/// Per-run limits, fixed when the run starts.
#[derive(Debug, Clone, Copy)]
struct Budget {
    max_frames: Option<usize>,
    deadline: Option<Instant>,
    time_budget_secs: Option<f64>,
}

impl Budget {
    fn start(options: &EngineOptions, started: Instant) -> Self {
        Self {
            max_frames: options.max_sampled_frames,
            deadline: options.time_budget().and_then(|budget| started.checked_add(budget)),
            time_budget_secs: options.time_budget_secs,
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    fn frames_reached(&self, produced: usize) -> bool {
        self.max_frames.is_some_and(|max| produced >= max)
    }

    fn frame_limit(&self) -> Option<BudgetLimit> {
        self.max_frames.map(|max| BudgetLimit::Frames { max })
    }

    fn time_limit(&self) -> Option<BudgetLimit> {
        self.time_budget_secs.map(|seconds| BudgetLimit::Time { seconds })
    }
}

/// Feed sampled frames to the workers until the clip or the budget runs out.
fn produce<S: FrameSource>(
    mut sampler: FrameSampler<S>,
    budget: Budget,
    work_tx: &Sender<SampledFrame>,
    outcome_tx: &Sender<FrameOutcome>,
) -> Option<BudgetLimit> {
    let mut produced = 0usize;

    loop {
        if budget.deadline_passed() {
            return budget.time_limit();
        }

        let Some(sample) = sampler.next() else {
            return None;
        };
        // The cap only counts as hit if the clip had more to give.
        if budget.frames_reached(produced) {
            return budget.frame_limit();
        }
        produced += 1;

        match sample {
            Ok(frame) => {
                if work_tx.send(frame).is_err() {
                    // Every worker has stopped, which only happens past the deadline.
                    return budget.time_limit();
                }
            }
            Err(e) => {
                tracing::warn!(
                    ordinal = e.ordinal,
                    frame = e.source_index,
                    error = %e.error,
                    "sampled frame could not be decoded; continuing"
                );
                let _ = outcome_tx.send(FrameOutcome::Failed(FrameFailure {
                    ordinal: e.ordinal,
                    source_index: Some(e.source_index),
                    message: e.error.to_string(),
                }));
            }
        }
    }
}

struct Worker<'a> {
    id: usize,
    extractor: &'a mut dyn FaceExtractor,
    matcher: &'a dyn Matcher,
    gallery: &'a Gallery,
    budget: Budget,
}

impl Worker<'_> {
    /// Returns `true` if the worker stopped because the time budget ran out.
    fn run(self, work_rx: Receiver<SampledFrame>, outcome_tx: Sender<FrameOutcome>) -> bool {
        for sample in work_rx {
            if self.budget.deadline_passed() {
                return true;
            }

            let outcome = match self.extractor.extract(&sample.frame.as_frame_ref()) {
                Ok(faces) => {
                    let results: Vec<MatchResult> = faces
                        .into_iter()
                        .map(|face| self.matcher.match_face(face, self.gallery))
                        .collect();
                    tracing::debug!(
                        worker = self.id,
                        ordinal = sample.ordinal,
                        frame = sample.source_index(),
                        faces = results.len(),
                        matched = results.iter().filter(|r| r.outcome.is_match()).count(),
                        "frame examined"
                    );
                    FrameOutcome::Examined { results }
                }
                Err(e) => {
                    tracing::warn!(
                        worker = self.id,
                        ordinal = sample.ordinal,
                        frame = sample.source_index(),
                        error = %e,
                        "face extraction failed; continuing"
                    );
                    FrameOutcome::Failed(FrameFailure {
                        ordinal: sample.ordinal,
                        source_index: Some(sample.source_index()),
                        message: e.to_string(),
                    })
                }
            };

            if outcome_tx.send(outcome).is_err() {
                break;
            }
        }
        false
    }
}

#[derive(Default)]
struct Tally {
    aggregator: PresenceAggregator,
    frames_examined: usize,
    failures: Vec<FrameFailure>,
}

fn collect(outcomes: Receiver<FrameOutcome>) -> Tally {
    let mut tally = Tally::default();
    for outcome in outcomes {
        tally.frames_examined += 1;
        match outcome {
            FrameOutcome::Examined { results } => tally.aggregator.record_all(&results),
            FrameOutcome::Failed(failure) => tally.failures.push(failure),
        }
    }
    tally.failures.sort_by_key(|f| f.ordinal);
    tally
}
