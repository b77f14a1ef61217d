use anyhow::Result;

use crate::detect::backend::Detector;
use crate::detect::result::{BoundingBox, DetectionResult};
use crate::frame::Frame;

const CELL: u32 = 8;
const LUMA_DELTA: f32 = 12.0;

/// CPU backend for motion detection.
///
/// Averages luma over a coarse grid and compares it with the previous frame.
/// Reports a single `motion` box around every cell that changed.
#[derive(Default)]
pub struct MotionBackend {
    previous: Option<Grid>,
}

struct Grid {
    width: u32,
    height: u32,
    cols: u32,
    rows: u32,
    cells: Vec<f32>,
}

impl Grid {
    fn from_frame(frame: &Frame) -> Self {
        let (width, height) = (frame.width(), frame.height());
        let cols = width.div_ceil(CELL);
        let rows = height.div_ceil(CELL);
        let mut sums = vec![0f32; (cols * rows) as usize];
        let mut counts = vec![0u32; (cols * rows) as usize];

        for (x, y, pixel) in frame.image().enumerate_pixels() {
            let [r, g, b] = pixel.0;
            let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
            let idx = ((y / CELL) * cols + x / CELL) as usize;
            sums[idx] += luma;
            counts[idx] += 1;
        }

        let cells = sums
            .iter()
            .zip(&counts)
            .map(|(sum, &count)| if count == 0 { 0.0 } else { sum / count as f32 })
            .collect();
        Self {
            width,
            height,
            cols,
            rows,
            cells,
        }
    }
}

impl MotionBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Detector for MotionBackend {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionResult>> {
        let current = Grid::from_frame(frame);
        let previous = self.previous.replace(current);
        let (Some(previous), Some(current)) = (previous, self.previous.as_ref()) else {
            return Ok(Vec::new());
        };
        if previous.width != current.width || previous.height != current.height {
            return Ok(Vec::new());
        }

        let mut changed = 0u32;
        let (mut min_col, mut min_row) = (u32::MAX, u32::MAX);
        let (mut max_col, mut max_row) = (0u32, 0u32);
        for row in 0..current.rows {
            for col in 0..current.cols {
                let idx = (row * current.cols + col) as usize;
                if (current.cells[idx] - previous.cells[idx]).abs() > LUMA_DELTA {
                    changed += 1;
                    min_col = min_col.min(col);
                    min_row = min_row.min(row);
                    max_col = max_col.max(col);
                    max_row = max_row.max(row);
                }
            }
        }
        if changed == 0 {
            return Ok(Vec::new());
        }

        let x = min_col * CELL;
        let y = min_row * CELL;
        let right = ((max_col + 1) * CELL).min(current.width);
        let bottom = ((max_row + 1) * CELL).min(current.height);
        let fraction = changed as f32 / current.cells.len() as f32;

        Ok(vec![DetectionResult::new(
            "motion",
            0.5 + 0.5 * (fraction * 10.0).min(1.0),
            BoundingBox::new(x as f32, y as f32, (right - x) as f32, (bottom - y) as f32),
        )])
    }
}
