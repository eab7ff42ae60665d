//! Module for subtitle content utils
mod area;
mod size;

pub use area::{Area, AreaValues};
pub use size::Size;
