use crate::frame::Frame;

/// Output of one annotator call.
#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    /// The input frame with annotations drawn into it.
    pub frame: Frame,
    pub detections: Vec<Detection>,
}

impl AnnotatedFrame {
    /// Frame passed through without annotations.
    pub fn unannotated(frame: Frame) -> Self {
        Self {
            frame,
            detections: Vec::new(),
        }
    }
}

/// One detected region, in pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub confidence: f32,
    pub label: String,
}
