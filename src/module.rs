//! This module contains all the sub-modules of the project.

pub mod define; // Definition module: Contains definitions and constants used throughout the project.
pub mod device; // Device module: Camera enumeration and streams.
pub mod page; // Page module: Drives the user-facing workflow.
pub mod source; // Source module: Validates uploads and captures.
#[cfg(test)]
pub mod testing; // Test doubles for devices and the detector.
pub mod util; // Utility module: Provides various utility functions and helpers.
pub mod vision; // Vision module: Remote detection, annotation and the live loop.
