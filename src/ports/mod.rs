//! Ports layer: Trait definitions for external collaborators.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the engine and externally trained artifacts or static data.

mod collaborator;
mod model;
mod reference;

pub use collaborator::{
    Collaborator, CollaboratorError, Failure, FeatureFrame, FeatureNamed, FrameError,
};
pub use model::{Classifier, ClassifierOutput, Explainer, Scaler, UNIFORM_PROBABILITIES};
pub use reference::ReferenceSource;
