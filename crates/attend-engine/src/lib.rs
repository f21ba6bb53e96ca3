//! attend-engine: one recognition run from video to presence set.
//!
//! Frames are sampled on the calling thread and fanned out over a bounded
//! queue to workers that each own a face extractor. Match results flow back
//! to a single aggregator.

pub mod engine;
pub mod options;
pub mod report;

pub use engine::{Engine, EngineError};
pub use options::EngineOptions;
pub use report::{BudgetLimit, FrameFailure, RunReport};
