//! Provide Loop for Live Detection.
//!
//! One background thread per start. It waits for the camera to produce frames, then
//! snapshots, detects and draws on a fixed period. Ticks never overlap: a slow
//! request delays the next tick. Every start bumps a generation counter; the thread
//! only touches the overlay while its generation is current, so responses that
//! arrive after a stop are dropped.
//!
//! The generation is checked right before each request, but the request itself runs
//! without the lock. A stop landing between that check and the send still lets that
//! one request out; its response is discarded like any other late one.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbaImage;

use super::annotate::{draw_detections, LabelFont};
use super::detector::Detector;
use crate::module::device::camera::CameraSession;
use crate::module::util::common::{self, lock};
use crate::module::util::conf;

/// Live loop phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivePhase {
    Idle,
    /// Waiting for the camera to report a frame size.
    Starting,
    Live,
    Stopped,
}

/// Timing and output settings.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    pub interval: Duration,
    pub ready_backoff: Duration,
    pub ready_timeout: Duration,
    pub jpeg_quality: u8,
    /// Where to write the overlay after each drawn tick.
    pub overlay_path: Option<String>,
}

impl LiveSettings {
    pub fn from_conf(conf: &conf::Live, overlay_path: Option<String>) -> Self {
        Self {
            interval: Duration::from_millis(conf.interval_ms),
            ready_backoff: Duration::from_millis(conf.ready_backoff_ms),
            ready_timeout: Duration::from_millis(conf.ready_timeout_ms),
            jpeg_quality: conf.jpeg_quality,
            overlay_path,
        }
    }
}

/// State shared with the loop thread.
#[derive(Debug)]
struct Shared {
    phase: LivePhase,
    generation: u64,
    timers: usize,
    overlay: Option<RgbaImage>,
    drawn: u64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && matches!(self.phase, LivePhase::Starting | LivePhase::Live)
    }
}

/// Everything a loop thread needs.
struct Worker {
    generation: u64,
    shared: Arc<Mutex<Shared>>,
    camera: Arc<Mutex<CameraSession>>,
    detector: Arc<dyn Detector>,
    font: Arc<LabelFont>,
    settings: LiveSettings,
    wake: Receiver<()>,
}

/// The live detection loop.
pub struct LiveLoop {
    shared: Arc<Mutex<Shared>>,
    settings: LiveSettings,
    stop_tx: Option<Sender<()>>,
    camera: Option<Arc<Mutex<CameraSession>>>,
}

impl LiveLoop {
    pub fn new(settings: LiveSettings) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                phase: LivePhase::Idle,
                generation: 0,
                timers: 0,
                overlay: None,
                drawn: 0,
            })),
            settings,
            stop_tx: None,
            camera: None,
        }
    }

    /// Start the loop on `camera`. Returns `false` if a loop is already running.
    pub fn start(
        &mut self,
        camera: Arc<Mutex<CameraSession>>,
        detector: Arc<dyn Detector>,
        font: Arc<LabelFont>,
    ) -> bool {
        let generation = {
            let mut shared = lock(&self.shared);
            if matches!(shared.phase, LivePhase::Starting | LivePhase::Live) {
                log::debug!("Live detection already running");
                return false;
            }
            shared.generation += 1;
            shared.phase = LivePhase::Starting;
            shared.timers += 1;
            shared.overlay = None;
            shared.generation
        };

        let (tx, rx) = mpsc::channel();
        let worker = Worker {
            generation,
            shared: Arc::clone(&self.shared),
            camera: Arc::clone(&camera),
            detector,
            font,
            settings: self.settings.clone(),
            wake: rx,
        };
        self.stop_tx = Some(tx);
        self.camera = Some(camera);
        thread::spawn(move || worker.run());
        log::info!("Live detection started (generation {})", generation);
        true
    }

    /// Cancel the timer, release the camera and clear the overlay.
    ///
    /// Returns `false` if nothing was running. Never waits for an in-flight request.
    pub fn stop(&mut self) -> bool {
        let stopped = {
            let mut shared = lock(&self.shared);
            let running = matches!(shared.phase, LivePhase::Starting | LivePhase::Live);
            if running {
                shared.generation += 1;
                shared.phase = LivePhase::Stopped;
                shared.timers = shared.timers.saturating_sub(1);
            }
            shared.overlay = None;
            running
        };
        // Dropping the sender wakes the timer wait immediately.
        self.stop_tx = None;
        if let Some(camera) = self.camera.take() {
            lock(&camera).release();
        }
        if stopped {
            log::info!("Live detection stopped");
        }
        stopped
    }

    pub fn phase(&self) -> LivePhase {
        lock(&self.shared).phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase(), LivePhase::Starting | LivePhase::Live)
    }

    /// Number of registered repeating timers; never more than one.
    pub fn active_timers(&self) -> usize {
        lock(&self.shared).timers
    }

    /// Copy of the current overlay frame.
    pub fn overlay(&self) -> Option<RgbaImage> {
        lock(&self.shared).overlay.clone()
    }

    /// Ticks whose detections made it onto the overlay.
    pub fn drawn(&self) -> u64 {
        lock(&self.shared).drawn
    }

    /// Blank the overlay without stopping the loop.
    pub fn clear_overlay(&self) {
        lock(&self.shared).overlay = None;
    }
}

impl Drop for LiveLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Worker {
    fn run(self) {
        if !self.wait_ready() {
            return;
        }
        loop {
            match self.wake.recv_timeout(self.settings.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if panic::catch_unwind(AssertUnwindSafe(|| self.tick())).is_err() {
                        log::error!("Live tick panicked, frame skipped");
                    }
                }
                // Stop request or the handle is gone.
                _ => break,
            }
            if !lock(&self.shared).is_current(self.generation) {
                break;
            }
        }
        log::debug!("Live loop {} exited", self.generation);
    }

    /// Poll until the camera reports a frame size. Returns `false` when cancelled or timed out.
    fn wait_ready(&self) -> bool {
        let deadline = Instant::now() + self.settings.ready_timeout;
        loop {
            let size = {
                let mut camera = lock(&self.camera);
                if camera.video_size().0 == 0 || camera.video_size().1 == 0 {
                    camera.prime();
                }
                camera.video_size()
            };
            if size.0 > 0 && size.1 > 0 {
                let mut shared = lock(&self.shared);
                if !shared.is_current(self.generation) {
                    return false;
                }
                shared.phase = LivePhase::Live;
                log::info!("Live video ready: {}x{}", size.0, size.1);
                return true;
            }
            if Instant::now() >= deadline {
                let mut shared = lock(&self.shared);
                if shared.is_current(self.generation) {
                    log::error!("Camera produced no frames, live detection aborted");
                    shared.phase = LivePhase::Stopped;
                    shared.timers = shared.timers.saturating_sub(1);
                }
                return false;
            }
            match self.wake.recv_timeout(self.settings.ready_backoff) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => return false,
            }
        }
    }

    /// One sample, detect, draw cycle. Failures are logged and the loop carries on.
    fn tick(&self) {
        let frame = match lock(&self.camera).snapshot() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Live capture error: {}", e);
                return;
            }
        };
        {
            let mut shared = lock(&self.shared);
            if !shared.is_current(self.generation) {
                return;
            }
            shared.overlay = Some(frame.clone());
        }

        let payload = match common::encode_jpeg(&frame, self.settings.jpeg_quality) {
            Ok(jpeg) => common::to_base64(&jpeg),
            Err(e) => {
                log::error!("Live encode error: {}", e);
                return;
            }
        };
        if !lock(&self.shared).is_current(self.generation) {
            return;
        }
        let result = match self.detector.detect(&payload) {
            Ok(result) => result,
            Err(e) => {
                log::error!("Live detection error: {}", e);
                return;
            }
        };

        let mut shared = lock(&self.shared);
        if !shared.is_current(self.generation) {
            log::debug!("Discarding late live response ({} detections)", result.len());
            return;
        }
        let Some(overlay) = shared.overlay.as_mut() else {
            return;
        };
        draw_detections(overlay, &result.detections, &self.font);
        if let Some(path) = &self.settings.overlay_path {
            if let Err(e) = overlay.save(path) {
                log::warn!("Can't write live overlay to {}: {}", path, e);
            }
        }
        shared.drawn += 1;
        log::debug!("Live tick drew {} detections", result.len());
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // A thread leaving while still current was not asked to stop.
        let mut shared = lock(&self.shared);
        if shared.is_current(self.generation) {
            log::error!("Live loop {} ended unexpectedly", self.generation);
            shared.phase = LivePhase::Stopped;
            shared.timers = shared.timers.saturating_sub(1);
            shared.overlay = None;
        }
    }
}
