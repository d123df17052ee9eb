//! Provide Device Control.
//!
pub mod camera;
