//! Frame ownership model.
//!
//! - `Frame`: owned RGB8 image plus the overlays drawn onto it.
//! - `BoundingBox`: axis-aligned rectangle in frame-pixel coordinates.
//! - `Overlay`: structured record of each annotation drawn on a frame.
//!
//! A `Frame` has exactly one owner at a time. It moves from the capture backend
//! to the ingestion loop, is cloned once at handoff so the backend's buffer can
//! be reused, then moves through detection/annotation into the publisher. Once
//! published, readers only ever receive copies.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// Axis-aligned rectangle in frame-pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Exclusive right edge.
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    /// Exclusive bottom edge.
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.right().min(other.right()) - self.x.max(other.x)).max(0.0);
        let iy = (self.bottom().min(other.bottom()) - self.y.max(other.y)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Annotation recorded on a frame alongside the pixels drawn for it.
#[derive(Clone, Debug, PartialEq)]
pub enum Overlay {
    Box { bounds: BoundingBox },
    Label { text: String, x: i32, y: i32 },
    Status { text: String, x: i32, y: i32 },
}

/// Owned, mutable RGB8 frame.
///
/// `Clone` is deliberate: the ingestion loop clones each sampled frame before
/// handing it off, and the publisher hands copies to readers.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    sequence: u64,
    overlays: Vec<Overlay>,
}

impl Frame {
    /// Wrap an RGB8 pixel buffer. Fails if the buffer length does not match
    /// `width * height * 3`.
    pub fn from_rgb(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            sequence: 0,
            overlays: Vec::new(),
        }
    }

    /// Solid-colour frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, image::Rgb(rgb)))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// An empty frame carries no pixels and is skipped by the ingestion loop.
    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Capture-order sequence number assigned by the ingestion loop.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub(crate) fn push_overlay(&mut self, overlay: Overlay) {
        self.overlays.push(overlay);
    }

    /// Label texts drawn on this frame, in drawing order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.overlays.iter().filter_map(|overlay| match overlay {
            Overlay::Label { text, .. } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(2, 2, vec![0u8; 12]).is_ok());
        assert!(Frame::from_rgb(2, 2, vec![0u8; 11]).is_err());
    }

    #[test]
    fn zero_sized_frame_is_empty() {
        let frame = Frame::from_image(RgbImage::new(0, 0));
        assert!(frame.is_empty());
        assert!(!Frame::filled(1, 1, [0, 0, 0]).is_empty());
    }

    #[test]
    fn clone_is_independent() {
        let original = Frame::filled(4, 4, [10, 20, 30]);
        let mut copy = original.clone();
        copy.image_mut().put_pixel(0, 0, image::Rgb([255, 255, 255]));
        assert_eq!(original.image().get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn bounding_box_edges_and_iou() {
        let a = BoundingBox::new(10.0, 10.0, 50.0, 80.0);
        assert_eq!(a.right(), 60.0);
        assert_eq!(a.bottom(), 90.0);
        assert!((a.iou(&a) - 1.0).abs() < f32::EPSILON);

        let disjoint = BoundingBox::new(100.0, 100.0, 5.0, 5.0);
        assert_eq!(a.iou(&disjoint), 0.0);
    }
}
