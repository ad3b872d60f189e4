pub mod motion;
pub mod stub;

pub use motion::MotionAnnotator;
pub use stub::StubAnnotator;
