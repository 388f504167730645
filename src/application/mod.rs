//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod evaluation;
mod prediction;
mod worker;

pub use evaluation::{evaluate, labeled_requests, ClassMetrics, ConfusionMatrix, EvaluationReport};
pub use prediction::{
    Assessment, Pipeline, PipelineStatus, PredictionPayload, PredictionResponse, PredictionService,
};
pub use worker::{BatchProgress, BatchWorker, BatchWorkerHandle};
