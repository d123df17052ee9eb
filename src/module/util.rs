//! This module provides miscellaneous utilities.

// Import the submodules for configuration, initialization, and paths
pub mod common; // Encoding and locking helpers
pub mod conf; // Configuration module
pub mod init; // Initialization module
pub mod notice; // Notification queue
pub mod path; // Path module
