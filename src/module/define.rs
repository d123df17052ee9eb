//! Module for Constants and Paths Definitions
//!
//! This module defines various constants and paths used throughout the application.

/// System Constants
pub mod system {
    /// Name of the system
    pub const NAME: &str = "weedtrack";

    /// Environment variable that overrides the configured API key.
    pub const API_KEY_ENV: &str = "WEEDTRACK_API_KEY";
}

/// File Paths
pub mod path {

    // Persistent Data Directory
    pub const PERSISTENT_DIR: &str = "/data/";

    // Ephemeral Data Directory
    pub const EPHEMERAL_DIR: &str = "/tmp/";

    // Image Directory
    pub const IMG_DIR: &str = "img";

    // Log Directory
    pub const LOG_DIR: &str = "log";

    // Configuration File
    pub const CONF_FILE: &str = "conf.toml";

    // Last Live Overlay Frame
    pub const LIVE_IMAGE: &str = "live.jpg";

    // sysfs listing of V4L2 devices
    pub const V4L2_SYSFS_DIR: &str = "/sys/class/video4linux";
}

/// Image upload constraints.
pub mod upload {
    /// MIME types accepted for detection.
    pub const ALLOWED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

    /// Maximum accepted file size (10 MiB).
    pub const MAX_SIZE: u64 = 10 * 1024 * 1024;

    /// JPEG quality used when a camera frame becomes an upload.
    pub const CAPTURE_QUALITY: u8 = 95;

    /// Synthetic name of a still camera capture.
    pub const CAPTURE_NAME: &str = "captured.jpg";

    /// Synthetic name of a capture taken from the live overlay.
    pub const LIVE_CAPTURE_NAME: &str = "captured-from-live.jpg";
}

/// Remote inference endpoint.
pub mod detector {
    /// Minimum confidence (percent) the endpoint reports.
    pub const CONFIDENCE: u8 = 50;

    /// Overlap (IoU percent) used by the endpoint's box merging.
    pub const OVERLAP: u8 = 30;

    pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
}

/// Annotation appearance.
pub mod annotate {
    pub const BOX_COLOR: [u8; 4] = [0, 255, 0, 255];
    pub const TEXT_COLOR: [u8; 4] = [0, 0, 0, 255];
    pub const STROKE_WIDTH: u32 = 2;
    pub const LABEL_HEIGHT: u32 = 20;
    pub const LABEL_PADDING: u32 = 10;
    pub const FONT_SIZE: f32 = 14.0;
}
