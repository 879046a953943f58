//! Device abstractions the capture flow drives: position fixes and camera frames.

pub mod camera;
pub mod geo;
