use anyhow::Result;

use crate::detect::backend::Annotator;
use crate::detect::result::{AnnotatedFrame, Detection};
use crate::device::DeviceHint;
use crate::frame::Frame;

const BLOCK_SIZE: u32 = 16;
const PIXEL_DELTA: u8 = 25;
const OUTLINE: [u8; 3] = [0, 255, 0];
const OUTLINE_STROKE: u32 = 2;

/// CPU motion annotator.
///
/// Compares the luma of each frame with the previous one in 16x16 blocks. A
/// block counts as changed when the fraction of its pixels whose luma moved by
/// more than `PIXEL_DELTA` reaches the confidence threshold. Touching changed
/// blocks are merged into one region and outlined in the output frame.
#[derive(Default)]
pub struct MotionAnnotator {
    previous: Option<LumaFrame>,
}

struct LumaFrame {
    width: u32,
    height: u32,
    luma: Vec<u8>,
}

impl MotionAnnotator {
    pub fn new() -> Self {
        Self::default()
    }

    fn changed_blocks(&self, current: &LumaFrame, confidence: f32) -> Option<BlockGrid> {
        let previous = self.previous.as_ref()?;
        if previous.width != current.width || previous.height != current.height {
            return None;
        }
        let mut grid = BlockGrid::new(current.width, current.height);
        for by in 0..grid.rows {
            for bx in 0..grid.cols {
                let fraction = changed_fraction(previous, current, bx, by);
                if fraction >= confidence {
                    grid.set(bx, by, fraction);
                }
            }
        }
        Some(grid)
    }
}

impl Annotator for MotionAnnotator {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn annotate(
        &mut self,
        frame: &Frame,
        confidence: f32,
        _device: DeviceHint,
    ) -> Result<AnnotatedFrame> {
        let current = LumaFrame {
            width: frame.width,
            height: frame.height,
            luma: frame.luma(),
        };
        let detections = self
            .changed_blocks(&current, confidence)
            .map(|grid| grid.regions())
            .unwrap_or_default();
        self.previous = Some(current);

        let mut output = frame.clone();
        for detection in &detections {
            output.draw_rect(
                detection.x,
                detection.y,
                detection.x + detection.w - 1,
                detection.y + detection.h - 1,
                OUTLINE_STROKE,
                OUTLINE,
            );
        }
        Ok(AnnotatedFrame {
            frame: output,
            detections,
        })
    }
}

fn changed_fraction(previous: &LumaFrame, current: &LumaFrame, bx: u32, by: u32) -> f32 {
    let x0 = bx * BLOCK_SIZE;
    let y0 = by * BLOCK_SIZE;
    let x1 = (x0 + BLOCK_SIZE).min(current.width);
    let y1 = (y0 + BLOCK_SIZE).min(current.height);
    let width = current.width as usize;

    let mut changed = 0usize;
    for y in y0..y1 {
        let row = y as usize * width;
        for x in x0..x1 {
            let i = row + x as usize;
            if previous.luma[i].abs_diff(current.luma[i]) > PIXEL_DELTA {
                changed += 1;
            }
        }
    }
    let total = ((x1 - x0) * (y1 - y0)) as usize;
    changed as f32 / total.max(1) as f32
}

/// Changed-fraction per block; `None` for blocks below the threshold.
struct BlockGrid {
    cols: u32,
    rows: u32,
    width: u32,
    height: u32,
    cells: Vec<Option<f32>>,
}

impl BlockGrid {
    fn new(width: u32, height: u32) -> Self {
        let cols = width.div_ceil(BLOCK_SIZE);
        let rows = height.div_ceil(BLOCK_SIZE);
        Self {
            cols,
            rows,
            width,
            height,
            cells: vec![None; (cols * rows) as usize],
        }
    }

    fn index(&self, bx: u32, by: u32) -> usize {
        (by * self.cols + bx) as usize
    }

    fn set(&mut self, bx: u32, by: u32, fraction: f32) {
        let i = self.index(bx, by);
        self.cells[i] = Some(fraction);
    }

    /// 4-connected groups of changed blocks, as pixel-space boxes.
    fn regions(mut self) -> Vec<Detection> {
        let mut regions = Vec::new();
        for start in 0..self.cells.len() {
            let Some(first) = self.cells[start].take() else {
                continue;
            };
            let (sx, sy) = (start as u32 % self.cols, start as u32 / self.cols);
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (sx, sy, sx, sy);
            let mut peak = first;
            let mut stack = vec![(sx, sy)];

            while let Some((bx, by)) = stack.pop() {
                min_x = min_x.min(bx);
                min_y = min_y.min(by);
                max_x = max_x.max(bx);
                max_y = max_y.max(by);
                for (nx, ny) in self.neighbours(bx, by) {
                    let i = self.index(nx, ny);
                    if let Some(fraction) = self.cells[i].take() {
                        peak = peak.max(fraction);
                        stack.push((nx, ny));
                    }
                }
            }

            let x = min_x * BLOCK_SIZE;
            let y = min_y * BLOCK_SIZE;
            regions.push(Detection {
                x,
                y,
                w: ((max_x + 1) * BLOCK_SIZE).min(self.width) - x,
                h: ((max_y + 1) * BLOCK_SIZE).min(self.height) - y,
                confidence: peak,
                label: "motion".to_string(),
            });
        }
        regions
    }

    fn neighbours(&self, bx: u32, by: u32) -> impl Iterator<Item = (u32, u32)> {
        let (cols, rows) = (self.cols, self.rows);
        [
            bx.checked_sub(1).map(|x| (x, by)),
            (bx + 1 < cols).then_some((bx + 1, by)),
            by.checked_sub(1).map(|y| (bx, y)),
            (by + 1 < rows).then_some((bx, by + 1)),
        ]
        .into_iter()
        .flatten()
    }
}
