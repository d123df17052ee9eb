//! Camera Functions
//!
//! Device enumeration, facing negotiation and the single-stream camera session.

use std::fmt;
use std::fs;
use std::path::Path;

use image::{ImageFormat, RgbaImage};
use rscam::{Camera, Config};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::define;

/// Camera errors.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no camera device found")]
    NoDevice,
    #[error("could not open {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("could not access any camera")]
    Unavailable,
    #[error("frame capture failed: {0}")]
    Capture(String),
    #[error("camera is not open")]
    NotOpen,
}

/// Camera selection preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Front camera.
    User,
    /// Rear camera.
    Environment,
}

impl Facing {
    pub fn opposite(self) -> Self {
        match self {
            Facing::User => Facing::Environment,
            Facing::Environment => Facing::User,
        }
    }

    /// Guess the facing of a device from its label.
    pub fn from_label(label: &str) -> Option<Facing> {
        let label = label.to_lowercase();
        if ["front", "user", "face"].iter().any(|k| label.contains(k)) {
            Some(Facing::User)
        } else if ["back", "rear", "environment", "world"]
            .iter()
            .any(|k| label.contains(k))
        {
            Some(Facing::Environment)
        } else {
            None
        }
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::User => write!(f, "front"),
            Facing::Environment => write!(f, "rear"),
        }
    }
}

/// An enumerated capture device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub id: String,
    pub label: String,
}

/// Source of camera streams.
pub trait MediaDevices: Send + Sync {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, CameraError>;
    fn open(&self, device: &DeviceInfo, facing: Facing) -> Result<Box<dyn MediaStream>, CameraError>;
}

/// A running camera stream.
pub trait MediaStream: Send {
    fn label(&self) -> &str;
    fn facing(&self) -> Facing;
    /// Frame size, `(0, 0)` until the stream has produced a frame.
    fn video_size(&self) -> (u32, u32);
    /// Give the stream a chance to produce its first frame.
    fn prime(&mut self) {}
    fn snapshot(&mut self) -> Result<RgbaImage, CameraError>;
    /// Release the hardware. Idempotent.
    fn stop(&mut self);
    fn is_active(&self) -> bool;
}

/// Open the best stream for `preferred`.
///
/// Candidates are tried in order: devices labelled with the preferred facing, unlabelled
/// devices, then devices facing the other way.
pub fn negotiate(
    devices: &dyn MediaDevices,
    preferred: Facing,
) -> Result<Box<dyn MediaStream>, CameraError> {
    let found = devices.enumerate()?;
    if found.is_empty() {
        return Err(CameraError::NoDevice);
    }

    let rank = |d: &DeviceInfo| match Facing::from_label(&d.label) {
        Some(f) if f == preferred => 0,
        None => 1,
        Some(_) => 2,
    };
    let mut candidates = found;
    candidates.sort_by_key(rank);

    for device in &candidates {
        let facing = Facing::from_label(&device.label).unwrap_or(preferred);
        match devices.open(device, facing) {
            Ok(stream) => {
                log::info!("Camera opened: {} ({})", device.label, facing);
                return Ok(stream);
            }
            Err(e) => log::warn!("Camera {} unavailable: {}", device.label, e),
        }
    }
    Err(CameraError::Unavailable)
}

/// The one camera stream the application may hold.
#[derive(Default)]
pub struct CameraSession {
    stream: Option<Box<dyn MediaStream>>,
}

impl CameraSession {
    pub fn new() -> Self {
        Self { stream: None }
    }

    /// Open a stream, releasing any stream already held first.
    pub fn open(&mut self, devices: &dyn MediaDevices, preferred: Facing) -> Result<Facing, CameraError> {
        self.release();
        let stream = negotiate(devices, preferred)?;
        let facing = stream.facing();
        self.stream = Some(stream);
        Ok(facing)
    }

    /// Switch to the opposite facing.
    ///
    /// The current stream is released before the new one is acquired. When the
    /// new facing cannot be opened the previous facing is re-acquired; if that also
    /// fails the session ends up empty.
    pub fn switch(&mut self, devices: &dyn MediaDevices) -> Result<Facing, CameraError> {
        let current = self.facing().ok_or(CameraError::NotOpen)?;
        let target = current.opposite();
        self.release();
        match negotiate(devices, target) {
            Ok(stream) => {
                let facing = stream.facing();
                self.stream = Some(stream);
                Ok(facing)
            }
            Err(e) => {
                log::warn!("Switch to {} camera failed: {}", target, e);
                if let Ok(stream) = negotiate(devices, current) {
                    self.stream = Some(stream);
                }
                Err(e)
            }
        }
    }

    /// Stop every track of the held stream and drop it.
    pub fn release(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            log::debug!("Camera released: {}", stream.label());
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    pub fn facing(&self) -> Option<Facing> {
        self.stream.as_ref().map(|s| s.facing())
    }

    pub fn video_size(&self) -> (u32, u32) {
        self.stream.as_ref().map_or((0, 0), |s| s.video_size())
    }

    pub fn prime(&mut self) {
        if let Some(stream) = self.stream.as_mut() {
            stream.prime();
        }
    }

    pub fn snapshot(&mut self) -> Result<RgbaImage, CameraError> {
        match self.stream.as_mut() {
            Some(stream) => stream.snapshot(),
            None => Err(CameraError::NotOpen),
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// V4L2 capture devices.
pub struct V4l2Devices {
    width: u32,
    height: u32,
}

impl V4l2Devices {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl MediaDevices for V4l2Devices {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        let entries = match fs::read_dir(define::path::V4L2_SYSFS_DIR) {
            Ok(entries) => entries,
            Err(_) => return Ok(vec![]),
        };
        let mut devices: Vec<DeviceInfo> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let node = e.file_name().to_string_lossy().into_owned();
                if !node.starts_with("video") {
                    return None;
                }
                let label = fs::read_to_string(e.path().join("name"))
                    .map(|s| s.trim().to_owned())
                    .unwrap_or_else(|_| node.clone());
                Some(DeviceInfo {
                    id: Path::new("/dev").join(&node).to_string_lossy().into_owned(),
                    label,
                })
            })
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }

    fn open(&self, device: &DeviceInfo, facing: Facing) -> Result<Box<dyn MediaStream>, CameraError> {
        let open_err = |reason: String| CameraError::Open {
            device: device.id.clone(),
            reason,
        };
        let mut cam = Camera::new(&device.id).map_err(|e| open_err(e.to_string()))?;

        // Configure and start the camera with specified settings.
        cam.start(&Config {
            interval: (1, 30), // 30 fps.
            resolution: (self.width, self.height),
            format: b"MJPG",
            nbuffers: 1,
            ..Default::default()
        })
        .map_err(|e| open_err(e.to_string()))?;

        Ok(Box::new(V4l2Stream {
            cam: Some(cam),
            label: device.label.clone(),
            facing,
            size: (0, 0),
        }))
    }
}

/// A running V4L2 stream.
pub struct V4l2Stream {
    cam: Option<Camera>,
    label: String,
    facing: Facing,
    size: (u32, u32),
}

impl MediaStream for V4l2Stream {
    fn label(&self) -> &str {
        &self.label
    }

    fn facing(&self) -> Facing {
        self.facing
    }

    fn video_size(&self) -> (u32, u32) {
        self.size
    }

    fn prime(&mut self) {
        // Grab a frame to learn the negotiated size.
        if let Err(e) = self.snapshot() {
            log::debug!("Camera not ready yet: {}", e);
        }
    }

    fn snapshot(&mut self) -> Result<RgbaImage, CameraError> {
        let cam = self.cam.as_ref().ok_or(CameraError::NotOpen)?;
        let frame = cam
            .capture()
            .map_err(|e| CameraError::Capture(e.to_string()))?;
        let img = image::load_from_memory_with_format(&frame[..], ImageFormat::Jpeg)
            .map_err(|e| CameraError::Capture(e.to_string()))?
            .to_rgba8();
        self.size = img.dimensions();
        Ok(img)
    }

    fn stop(&mut self) {
        if let Some(mut cam) = self.cam.take() {
            if let Err(e) = cam.stop() {
                log::warn!("Camera stop failed: {}", e);
            }
        }
        self.size = (0, 0);
    }

    fn is_active(&self) -> bool {
        self.cam.is_some()
    }
}

impl Drop for V4l2Stream {
    fn drop(&mut self) {
        self.stop();
    }
}
