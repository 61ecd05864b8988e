//! Video capture.

pub mod webcam;
