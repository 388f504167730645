//! Background batch worker.
//!
//! Evaluates a list of request payloads on a separate thread and streams
//! progress back over a channel, so the caller can report progress and
//! print responses as they complete.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use serde_json::Value;

use super::prediction::{PredictionResponse, PredictionService};

/// Progress updates from the batch worker.
#[derive(Debug, Clone)]
pub enum BatchProgress {
    /// Batch accepted
    Started { total: usize },
    /// One request evaluated, in input order
    Completed { index: usize, response: PredictionResponse },
    /// All requests evaluated
    Finished { succeeded: usize, failed: usize },
}

/// Handle to a running batch.
pub struct BatchWorkerHandle {
    progress_rx: Receiver<BatchProgress>,
    handle: Option<JoinHandle<()>>,
}

impl BatchWorkerHandle {
    /// Try to receive the next progress update (non-blocking).
    #[must_use]
    pub fn try_recv(&self) -> Option<BatchProgress> {
        self.progress_rx.try_recv().ok()
    }

    /// Block until the next update; `None` once the worker has exited.
    #[must_use]
    pub fn recv(&self) -> Option<BatchProgress> {
        self.progress_rx.recv().ok()
    }

    /// Wait for the worker thread to exit.
    ///
    /// # Errors
    /// Returns an error if the worker thread panicked.
    pub fn join(mut self) -> std::thread::Result<()> {
        match self.handle.take() {
            Some(handle) => handle.join(),
            None => Ok(()),
        }
    }
}

impl Iterator for BatchWorkerHandle {
    type Item = BatchProgress;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

/// Runs assessments for a batch of payloads in the background.
pub struct BatchWorker;

impl BatchWorker {
    /// Spawn a background batch.
    ///
    /// Returns a handle to receive progress updates.
    pub fn spawn(service: Arc<PredictionService>, payloads: Vec<Value>) -> BatchWorkerHandle {
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            Self::run_batch_with_progress(&service, payloads, &tx);
        });

        BatchWorkerHandle {
            progress_rx: rx,
            handle: Some(handle),
        }
    }

    fn run_batch_with_progress(
        service: &PredictionService,
        payloads: Vec<Value>,
        tx: &Sender<BatchProgress>,
    ) {
        let total = payloads.len();
        tracing::info!("Starting batch of {} requests", total);
        let _ = tx.send(BatchProgress::Started { total });

        let mut succeeded = 0;
        for (index, payload) in payloads.iter().enumerate() {
            let response = service.respond(payload);
            if response.is_success() {
                succeeded += 1;
            }
            tracing::debug!("Batch progress: {}/{}", index + 1, total);
            if tx.send(BatchProgress::Completed { index, response }).is_err() {
                tracing::warn!("Batch receiver dropped after {} of {} requests", index + 1, total);
                return;
            }
        }

        let failed = total - succeeded;
        tracing::info!("Batch complete: {} succeeded, {} failed", succeeded, failed);
        let _ = tx.send(BatchProgress::Finished { succeeded, failed });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::Pipeline;
    use crate::domain::{CohortStore, FusionPolicy, Modality};
    use crate::ports::{Classifier, ClassifierOutput, CollaboratorError, FeatureFrame};
    use serde_json::json;

    struct AlwaysNormal;

    impl Classifier for AlwaysNormal {
        fn predict(&self, _frame: &FeatureFrame) -> Result<ClassifierOutput, CollaboratorError> {
            Ok(ClassifierOutput {
                class_index: 0,
                probabilities: Some(vec![0.8, 0.1, 0.1]),
            })
        }
    }

    fn service() -> Arc<PredictionService> {
        Arc::new(PredictionService::new(
            Pipeline::new(Modality::LabAssisted, CohortStore::empty()),
            Pipeline::new(Modality::SymptomOnly, CohortStore::empty()).with_classifier(Arc::new(AlwaysNormal)),
            FusionPolicy::default(),
        ))
    }

    #[test]
    fn test_batch_reports_in_input_order() {
        let payloads = vec![json!({"Age": 30}), json!({}), json!({"TSH": 3.0}), json!({"Age": 61})];
        let handle = BatchWorker::spawn(service(), payloads);
        let updates: Vec<BatchProgress> = handle.collect();

        assert!(matches!(updates.first(), Some(BatchProgress::Started { total: 4 })));
        let indices: Vec<usize> = updates
            .iter()
            .filter_map(|u| match u {
                BatchProgress::Completed { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);
        assert!(matches!(
            updates.last(),
            Some(BatchProgress::Finished { succeeded: 2, failed: 2 })
        ));
    }

    #[test]
    fn test_empty_batch() {
        let handle = BatchWorker::spawn(service(), Vec::new());
        let first = handle.recv();
        assert!(matches!(first, Some(BatchProgress::Started { total: 0 })));
        assert!(matches!(handle.recv(), Some(BatchProgress::Finished { succeeded: 0, failed: 0 })));
        handle.join().expect("worker exits cleanly");
    }
}
