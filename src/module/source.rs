//! Image sources.
//!
//! Files chosen by the user and camera captures both end up as an [`ImageFile`] and
//! go through [`load`], the one validated way to create an [`ImageAsset`].

use std::fs;
use std::io;
use std::path::Path;

use image::{DynamicImage, RgbaImage};
use thiserror::Error;

use crate::module::define::upload;
use crate::module::util::common;

/// Why a file was refused.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid file type: {0}")]
    UnsupportedType(String),
    #[error("File too large (max 10MB): {size} bytes")]
    TooLarge { size: u64 },
    #[error("Image could not be decoded: {0}")]
    Undecodable(String),
    #[error("Can't read {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// A file as handed over by the user or by a capture.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    /// Read a file from disk, taking its MIME type from the extension.
    ///
    /// Type and size are checked before any content is read.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let unreadable = |e: io::Error| ValidationError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let mime = mime_from_name(&name);
        if !upload::ALLOWED_TYPES.contains(&mime) {
            return Err(ValidationError::UnsupportedType(mime.to_owned()));
        }
        let size = fs::metadata(path).map_err(unreadable)?.len();
        if size > upload::MAX_SIZE {
            return Err(ValidationError::TooLarge { size });
        }
        Ok(Self {
            mime: mime.to_owned(),
            name,
            bytes: fs::read(path).map_err(unreadable)?,
        })
    }

    /// Encode a camera frame as a JPEG file.
    pub fn capture(frame: &RgbaImage, name: &str, quality: u8) -> image::ImageResult<Self> {
        Ok(Self {
            name: name.to_owned(),
            mime: "image/jpeg".to_owned(),
            bytes: common::encode_jpeg(frame, quality)?,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// MIME type for the accepted extensions; anything else is opaque.
pub fn mime_from_name(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Check type and size constraints.
pub fn validate(file: &ImageFile) -> Result<(), ValidationError> {
    if !upload::ALLOWED_TYPES.contains(&file.mime.as_str()) {
        return Err(ValidationError::UnsupportedType(file.mime.clone()));
    }
    if file.size() > upload::MAX_SIZE {
        return Err(ValidationError::TooLarge { size: file.size() });
    }
    Ok(())
}

/// Human readable byte size, e.g. `1.00 MB`.
pub fn format_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{} B", bytes)
    } else if b < KIB * KIB {
        format!("{:.2} KB", b / KIB)
    } else {
        format!("{:.2} MB", b / KIB / KIB)
    }
}

/// A validated, decoded image.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub name: String,
    pub mime: String,
    pub byte_size: u64,
    /// Display size, e.g. `1.00 MB`.
    pub size: String,
    pub bytes: Vec<u8>,
    pub image: DynamicImage,
}

impl ImageAsset {
    pub fn to_base64(&self) -> String {
        common::to_base64(&self.bytes)
    }

    pub fn data_url(&self) -> String {
        common::data_url(&self.mime, &self.bytes)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }
}

/// Validate and decode a file.
pub fn load(file: ImageFile) -> Result<ImageAsset, ValidationError> {
    validate(&file)?;
    let image = image::load_from_memory(&file.bytes)
        .map_err(|e| ValidationError::Undecodable(e.to_string()))?;
    log::info!(
        "Loaded {} ({}, {}x{})",
        file.name,
        file.mime,
        image.width(),
        image.height()
    );
    Ok(ImageAsset {
        byte_size: file.size(),
        size: format_size(file.size()),
        name: file.name,
        mime: file.mime,
        bytes: file.bytes,
        image,
    })
}
