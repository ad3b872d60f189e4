use anyhow::Result;

use crate::detect::result::AnnotatedFrame;
use crate::device::DeviceHint;
use crate::frame::Frame;

/// Annotator trait.
///
/// Called synchronously from the frame loop, once per emitted frame. Calls may
/// be slow; the loop measures their wall-clock duration as pipeline
/// throughput. An error is fatal to the current run.
pub trait Annotator: Send {
    /// Annotator identifier.
    fn name(&self) -> &'static str;

    /// Annotate a frame.
    ///
    /// `confidence` is the minimum score a detection needs to be kept.
    /// `device` selects the accelerated path when the annotator has one.
    fn annotate(
        &mut self,
        frame: &Frame,
        confidence: f32,
        device: DeviceHint,
    ) -> Result<AnnotatedFrame>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
