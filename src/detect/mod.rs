//! Frame annotators.
//!
//! The model behind an annotator is opaque to the pipeline: it receives a
//! frame, a confidence threshold and a device hint, and returns the annotated
//! frame.

mod backend;
mod backends;
mod registry;
mod result;

pub use backend::Annotator;
pub use backends::{MotionAnnotator, StubAnnotator};
pub use registry::AnnotatorRegistry;
pub use result::{AnnotatedFrame, Detection};
