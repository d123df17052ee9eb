//! Page controller.
//!
//! Owns the workflow state and reacts to user actions: choosing a file, running
//! detection, using the camera and live mode. Every action leaves the page in a
//! stable state; failures are reported as notices and returned as [`PageError`].

pub mod action;

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use thiserror::Error;

use super::define::upload;
use super::device::camera::{CameraError, CameraSession, Facing, MediaDevices};
use super::source::{self, ImageAsset, ImageFile, ValidationError};
use super::util::common::lock;
use super::util::conf::Config;
use super::util::notice::Notifier;
use super::vision::annotate::{self, AnnotatedImage, LabelFont};
use super::vision::detector::{DetectionError, DetectionResult, Detector};
use super::vision::live::{LiveLoop, LivePhase, LiveSettings};

/// Page errors.
#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("no image loaded")]
    NoImage,
    #[error("no camera frame available yet")]
    NoFrame,
    #[error("{action} is not available while {state}")]
    InvalidState {
        action: &'static str,
        state: PageState,
    },
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Where the page is in its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Idle,
    Uploading,
    /// An image is loaded and can be sent for detection.
    Ready,
    Detecting,
    /// Camera preview for a still photo.
    CameraOpen,
    Live,
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PageState::Idle => "idle",
            PageState::Uploading => "uploading",
            PageState::Ready => "ready",
            PageState::Detecting => "detecting",
            PageState::CameraOpen => "camera open",
            PageState::Live => "live",
        };
        write!(f, "{}", s)
    }
}

/// Page level settings.
#[derive(Debug, Clone)]
pub struct PageSettings {
    pub facing: Facing,
    pub capture_quality: u8,
}

impl PageSettings {
    pub fn from_conf(conf: &Config) -> Self {
        Self {
            facing: conf.camera.facing,
            capture_quality: conf.camera.capture_quality,
        }
    }
}

/// Page controller
pub struct PageController {
    state: PageState,
    asset: Option<ImageAsset>,
    result: Option<DetectionResult>,
    annotated: Option<AnnotatedImage>,
    error: Option<String>,
    fullscreen: bool,
    camera: Arc<Mutex<CameraSession>>,
    devices: Arc<dyn MediaDevices>,
    detector: Arc<dyn Detector>,
    font: Arc<LabelFont>,
    live: LiveLoop,
    notifier: Notifier,
    settings: PageSettings,
}

impl PageController {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        detector: Arc<dyn Detector>,
        font: Arc<LabelFont>,
        live: LiveSettings,
        settings: PageSettings,
        notifier: Notifier,
    ) -> Self {
        Self {
            state: PageState::Idle,
            asset: None,
            result: None,
            annotated: None,
            error: None,
            fullscreen: false,
            camera: Arc::new(Mutex::new(CameraSession::new())),
            devices,
            detector,
            font,
            live: LiveLoop::new(live),
            notifier,
            settings,
        }
    }

    /// Current state. Live mode that died on its own is folded back first.
    pub fn state(&mut self) -> PageState {
        self.sync_live();
        self.state
    }

    pub fn asset(&self) -> Option<&ImageAsset> {
        self.asset.as_ref()
    }

    pub fn result(&self) -> Option<&DetectionResult> {
        self.result.as_ref()
    }

    pub fn annotated(&self) -> Option<&AnnotatedImage> {
        self.annotated.as_ref()
    }

    /// Inline validation message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn facing(&self) -> Option<Facing> {
        lock(&self.camera).facing()
    }

    pub fn live_phase(&self) -> LivePhase {
        self.live.phase()
    }

    /// Latest live overlay frame.
    pub fn live_overlay(&self) -> Option<image::RgbaImage> {
        self.live.overlay()
    }

    /// Forget the image, results and any inline error.
    pub fn reset_all(&mut self) {
        self.asset = None;
        self.result = None;
        self.annotated = None;
        self.error = None;
        self.live.clear_overlay();
        if matches!(self.state, PageState::Ready | PageState::Uploading | PageState::Detecting) {
            self.state = PageState::Idle;
        }
    }

    /// Choose File.
    pub fn choose_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), PageError> {
        let file = match ImageFile::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) => {
                self.error = Some(e.to_string());
                return Err(e.into());
            }
        };
        self.handle_file(file)
    }

    /// Validate and load a file. Invalid files only set the inline error.
    pub fn handle_file(&mut self, file: ImageFile) -> Result<(), PageError> {
        if matches!(self.state, PageState::CameraOpen | PageState::Live) {
            self.stop_camera();
        }
        self.reset_all();
        if let Err(e) = source::validate(&file) {
            self.error = Some(e.to_string());
            return Err(e.into());
        }
        self.state = PageState::Uploading;
        match source::load(file) {
            Ok(asset) => {
                self.asset = Some(asset);
                self.state = PageState::Ready;
                self.notifier.success("Success", "Image uploaded");
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                self.state = PageState::Idle;
                Err(e.into())
            }
        }
    }

    /// Detect Weeds.
    ///
    /// On failure the previous results and annotated image stay as they were.
    pub fn run(&mut self) -> Result<usize, PageError> {
        self.sync_live();
        let payload = match (&self.asset, self.state) {
            (None, _) => {
                self.notifier.error("No image", "Upload first");
                return Err(PageError::NoImage);
            }
            (Some(asset), PageState::Ready) => asset.to_base64(),
            (Some(_), state) => {
                return Err(PageError::InvalidState {
                    action: "detection",
                    state,
                })
            }
        };
        self.error = None;
        self.state = PageState::Detecting;
        let res = self.detector.detect(&payload);
        self.state = PageState::Ready;

        match res {
            Ok(result) => {
                let count = result.len();
                if let Some(asset) = &self.asset {
                    self.annotated = Some(annotate::annotate(&asset.image, &result, &self.font));
                }
                self.result = Some(result);
                self.notifier
                    .success("Run Complete", &format!("{} detections", count));
                Ok(count)
            }
            Err(e) => {
                log::error!("Detection failed: {}", e);
                self.notifier.error("Error", "Detection failed");
                Err(e.into())
            }
        }
    }

    /// Capture with Camera.
    pub fn open_camera(&mut self) -> Result<Facing, PageError> {
        self.sync_live();
        if self.state == PageState::Live {
            self.stop_live();
        }
        self.reset_all();
        let preferred = self.settings.facing;
        let res = lock(&self.camera).open(self.devices.as_ref(), preferred);
        match res {
            Ok(facing) => {
                if facing != preferred {
                    self.notifier.error(
                        "Camera Error",
                        &format!(
                            "{} camera not available, trying {}...",
                            capitalize(&preferred.to_string()),
                            facing
                        ),
                    );
                }
                self.state = PageState::CameraOpen;
                Ok(facing)
            }
            Err(e) => {
                self.notifier.error("Camera Error", "Could not access any camera.");
                self.state = PageState::Idle;
                Err(e.into())
            }
        }
    }

    /// Take Photo: grab the preview frame, close the camera and load the frame.
    ///
    /// When no frame can be taken the camera stays open so the user can try again.
    pub fn take_photo(&mut self) -> Result<(), PageError> {
        self.require(PageState::CameraOpen, "take photo")?;
        let frame = lock(&self.camera).snapshot();
        let file = frame
            .map_err(PageError::from)
            .and_then(|frame| self.encode_capture(&frame, upload::CAPTURE_NAME));
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                log::error!("Photo capture failed: {}", e);
                self.notifier.error("Camera Error", "Could not capture a frame.");
                return Err(e);
            }
        };
        self.stop_camera();
        self.handle_file(file)
    }

    /// Cancel: release the camera in either camera mode.
    pub fn stop_camera(&mut self) {
        self.sync_live();
        match self.state {
            PageState::Live => self.stop_live(),
            PageState::CameraOpen => {
                lock(&self.camera).release();
                self.state = self.resting_state();
            }
            _ => lock(&self.camera).release(),
        }
    }

    /// Switch Camera.
    pub fn switch_camera(&mut self) -> Result<Facing, PageError> {
        self.sync_live();
        if !matches!(self.state, PageState::CameraOpen | PageState::Live) {
            return Err(PageError::InvalidState {
                action: "camera switch",
                state: self.state,
            });
        }
        let target = self.facing().map(Facing::opposite);
        let res = lock(&self.camera).switch(self.devices.as_ref());
        match res {
            Ok(facing) => {
                log::info!("Switched to {} camera", facing);
                Ok(facing)
            }
            Err(e) => {
                let target = target.map_or_else(|| "any".to_owned(), |f| f.to_string());
                self.notifier
                    .error("Switch Error", &format!("Can't access {} camera.", target));
                if !lock(&self.camera).is_open() {
                    // Nothing could be re-acquired; leave camera mode entirely.
                    if self.state == PageState::Live {
                        self.stop_live();
                    } else {
                        self.state = self.resting_state();
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Start Live Detection. A second start while live is a no-op.
    pub fn start_live(&mut self) -> Result<(), PageError> {
        self.sync_live();
        if self.state == PageState::Live {
            log::debug!("Live detection already running");
            return Ok(());
        }
        self.reset_all();
        if !lock(&self.camera).is_open() {
            let preferred = self.settings.facing;
            let res = lock(&self.camera).open(self.devices.as_ref(), preferred);
            if let Err(e) = res {
                self.notifier.error("Camera Error", "Could not access any camera.");
                self.state = PageState::Idle;
                return Err(e.into());
            }
        }
        self.live.start(
            Arc::clone(&self.camera),
            Arc::clone(&self.detector),
            Arc::clone(&self.font),
        );
        self.state = PageState::Live;
        Ok(())
    }

    /// Stop Live Detection.
    pub fn stop_live(&mut self) {
        self.live.stop();
        lock(&self.camera).release();
        self.fullscreen = false;
        if self.state == PageState::Live {
            self.state = self.resting_state();
        }
    }

    /// Capture Detection Image: keep the current overlay as the image to detect on.
    ///
    /// Live mode keeps running until a frame has actually been captured.
    pub fn capture_live(&mut self) -> Result<(), PageError> {
        self.require(PageState::Live, "live capture")?;
        let Some(frame) = self.live.overlay() else {
            self.notifier
                .error("Camera Error", "No live frame yet, try again in a moment.");
            return Err(PageError::NoFrame);
        };
        let file = match self.encode_capture(&frame, upload::LIVE_CAPTURE_NAME) {
            Ok(file) => file,
            Err(e) => {
                log::error!("Live capture failed: {}", e);
                self.notifier.error("Camera Error", "Could not capture a frame.");
                return Err(e);
            }
        };
        self.stop_live();
        self.handle_file(file)?;
        self.notifier
            .success("Captured", "Image from live feed saved for detection.");
        Ok(())
    }

    /// Fullscreen toggle for the live view.
    pub fn toggle_fullscreen(&mut self) -> Result<bool, PageError> {
        self.require(PageState::Live, "fullscreen")?;
        self.fullscreen = !self.fullscreen;
        Ok(self.fullscreen)
    }

    fn encode_capture(&self, frame: &image::RgbaImage, name: &str) -> Result<ImageFile, PageError> {
        Ok(ImageFile::capture(frame, name, self.settings.capture_quality)?)
    }

    fn require(&mut self, wanted: PageState, action: &'static str) -> Result<(), PageError> {
        self.sync_live();
        if self.state == wanted {
            Ok(())
        } else {
            Err(PageError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    /// State to fall back to when leaving a camera mode.
    fn resting_state(&self) -> PageState {
        match self.asset {
            Some(_) => PageState::Ready,
            None => PageState::Idle,
        }
    }

    /// Fold a live loop that gave up (camera never ready) back into the page state.
    fn sync_live(&mut self) {
        if self.state == PageState::Live && !self.live.is_running() {
            log::warn!("Live detection ended unexpectedly");
            self.stop_live();
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
