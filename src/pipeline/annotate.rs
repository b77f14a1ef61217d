//! Overlay drawing.
//!
//! Boxes are drawn with `imageproc`; text needs a font and is only rasterised
//! when one is loaded. Every annotation is recorded on the frame as an
//! `Overlay` either way. Text positions are baselines.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::Rgb;
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::DetectionResult;
use crate::frame::{BoundingBox, Frame, Overlay};
use crate::stream::Telemetry;

pub const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const BOX_THICKNESS: u32 = 2;

const LABEL_SCALE: f32 = 16.0;
const STATUS_SCALE: f32 = 18.0;
const LABEL_OFFSET: i32 = 5;
const STATUS_ORIGIN: (i32, i32) = (10, 20);

pub fn load_font(path: &Path) -> Result<FontArc> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("invalid font file {}", path.display()))
}

/// Status line text, e.g. `FPS:30.0 | Processed Frames:12`.
pub fn status_line(telemetry: &Telemetry) -> String {
    format!(
        "FPS:{:.1} | Processed Frames:{}",
        telemetry.fps,
        telemetry.processed_frames()
    )
}

/// Draw a detection's box and its label above it.
pub fn draw_detection(frame: &mut Frame, result: &DetectionResult, font: Option<&FontArc>) {
    if !draw_box(frame, &result.bounds) {
        return;
    }
    let x = result.bounds.x.round() as i32;
    let y = result.bounds.y.round() as i32 - LABEL_OFFSET;
    draw_text(frame, &result.label(), x, y, LABEL_SCALE, font);
    frame.push_overlay(Overlay::Label {
        text: result.label(),
        x,
        y,
    });
}

pub fn draw_status(frame: &mut Frame, telemetry: &Telemetry, font: Option<&FontArc>) {
    let text = status_line(telemetry);
    let (x, y) = STATUS_ORIGIN;
    draw_text(frame, &text, x, y, STATUS_SCALE, font);
    frame.push_overlay(Overlay::Status { text, x, y });
}

/// Draws `BOX_THICKNESS` nested outlines inward from `bounds`. Boxes that round
/// to nothing are skipped; returns whether anything was drawn.
fn draw_box(frame: &mut Frame, bounds: &BoundingBox) -> bool {
    let x = bounds.x.round() as i32;
    let y = bounds.y.round() as i32;
    let width = bounds.width.round();
    let height = bounds.height.round();
    if !(width >= 1.0 && height >= 1.0) {
        log::trace!("annotate: skipping degenerate box {:?}", bounds);
        return false;
    }
    let (width, height) = (width as u32, height as u32);

    for inset in 0..BOX_THICKNESS {
        let (w, h) = (
            width.saturating_sub(2 * inset),
            height.saturating_sub(2 * inset),
        );
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(frame.image_mut(), rect, BOX_COLOR);
    }
    frame.push_overlay(Overlay::Box { bounds: *bounds });
    true
}

fn draw_text(frame: &mut Frame, text: &str, x: i32, baseline: i32, scale: f32, font: Option<&FontArc>) {
    let Some(font) = font else {
        return;
    };
    let top = (baseline - scale.round() as i32).max(0);
    draw_text_mut(frame.image_mut(), TEXT_COLOR, x, top, PxScale::from(scale), font, text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_is_two_pixels_thick() {
        let mut frame = Frame::filled(100, 100, [0, 0, 0]);
        assert!(draw_box(&mut frame, &BoundingBox::new(10.0, 10.0, 50.0, 80.0)));

        let image = frame.image();
        for (x, y) in [(10, 10), (11, 11), (59, 89), (58, 88), (35, 10), (10, 50)] {
            assert_eq!(*image.get_pixel(x, y), BOX_COLOR, "({x}, {y})");
        }
        for (x, y) in [(12, 12), (35, 50), (9, 9), (60, 90)] {
            assert_eq!(*image.get_pixel(x, y), Rgb([0, 0, 0]), "({x}, {y})");
        }
    }

    #[test]
    fn degenerate_boxes_are_skipped() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0]);
        assert!(!draw_box(&mut frame, &BoundingBox::new(5.0, 5.0, 0.0, 10.0)));
        assert!(!draw_box(&mut frame, &BoundingBox::new(5.0, 5.0, f32::NAN, 10.0)));
        assert!(frame.overlays().is_empty());
    }

    #[test]
    fn boxes_off_the_edge_are_clipped() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0]);
        assert!(draw_box(&mut frame, &BoundingBox::new(-5.0, 15.0, 30.0, 30.0)));
        assert_eq!(*frame.image().get_pixel(10, 15), BOX_COLOR);
    }

    #[test]
    fn status_line_reports_processed_frames() {
        let telemetry = Telemetry {
            fps: 29.97,
            read_frame_count: 12,
            frame_interval: 5,
        };
        assert_eq!(status_line(&telemetry), "FPS:30.0 | Processed Frames:2");
    }
}
