//! Detection and annotation of sampled frames.

pub mod annotate;
mod stage;

pub use stage::DetectionStage;
