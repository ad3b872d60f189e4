use anyhow::Result;

use crate::detect::backend::Annotator;
use crate::detect::result::AnnotatedFrame;
use crate::device::DeviceHint;
use crate::frame::Frame;

/// Pass-through annotator for testing. Returns every frame unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubAnnotator;

impl Annotator for StubAnnotator {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn annotate(
        &mut self,
        frame: &Frame,
        _confidence: f32,
        _device: DeviceHint,
    ) -> Result<AnnotatedFrame> {
        Ok(AnnotatedFrame::unannotated(frame.clone()))
    }
}
