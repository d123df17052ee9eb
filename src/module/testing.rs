//! Test doubles for cameras and the inference endpoint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use serde_json::json;

use crate::module::device::camera::{CameraError, DeviceInfo, Facing, MediaDevices, MediaStream};
use crate::module::util::common::lock;
use crate::module::vision::detector::{Detection, DetectionError, DetectionResult, Detector};

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut cond: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

/// Description of one fake camera.
#[derive(Debug, Clone)]
pub struct FakeSpec {
    label: String,
    width: u32,
    height: u32,
    broken: bool,
    warm_up: usize,
}

impl FakeSpec {
    pub fn new(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_owned(),
            width,
            height,
            broken: false,
            warm_up: 0,
        }
    }

    /// Refuse to open.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Report no video size until primed `n` times.
    pub fn warm_up(mut self, n: usize) -> Self {
        self.warm_up = n;
        self
    }
}

/// Fake device list that counts open streams.
pub struct FakeDevices {
    specs: Mutex<Vec<FakeSpec>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl FakeDevices {
    pub fn new(specs: Vec<FakeSpec>) -> Self {
        Self {
            specs: Mutex::new(specs),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Streams currently open.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Most streams ever open at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn break_all(&self) {
        for spec in lock(&self.specs).iter_mut() {
            spec.broken = true;
        }
    }
}

impl MediaDevices for FakeDevices {
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(lock(&self.specs)
            .iter()
            .enumerate()
            .map(|(i, s)| DeviceInfo {
                id: format!("/dev/video{}", i),
                label: s.label.clone(),
            })
            .collect())
    }

    fn open(&self, device: &DeviceInfo, facing: Facing) -> Result<Box<dyn MediaStream>, CameraError> {
        let spec = lock(&self.specs)
            .iter()
            .find(|s| s.label == device.label)
            .cloned()
            .ok_or(CameraError::NoDevice)?;
        if spec.broken {
            return Err(CameraError::Open {
                device: device.id.clone(),
                reason: "busy".to_owned(),
            });
        }
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            spec,
            facing,
            active: Some(Arc::clone(&self.active)),
        }))
    }
}

/// Stream producing a flat grey frame.
pub struct FakeStream {
    spec: FakeSpec,
    facing: Facing,
    active: Option<Arc<AtomicUsize>>,
}

impl MediaStream for FakeStream {
    fn label(&self) -> &str {
        &self.spec.label
    }

    fn facing(&self) -> Facing {
        self.facing
    }

    fn video_size(&self) -> (u32, u32) {
        if self.spec.warm_up > 0 || self.active.is_none() {
            (0, 0)
        } else {
            (self.spec.width, self.spec.height)
        }
    }

    fn prime(&mut self) {
        self.spec.warm_up = self.spec.warm_up.saturating_sub(1);
    }

    fn snapshot(&mut self) -> Result<RgbaImage, CameraError> {
        match self.video_size() {
            (0, _) | (_, 0) => Err(CameraError::Capture("no frame yet".to_owned())),
            (w, h) => Ok(RgbaImage::from_pixel(w, h, Rgba([90, 90, 90, 255]))),
        }
    }

    fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_active(&self) -> bool {
        self.active.is_some()
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The detection used by [`FakeDetector::weeds`].
pub fn weed() -> Detection {
    Detection {
        x: 100.0,
        y: 100.0,
        width: 50.0,
        height: 30.0,
        confidence: 0.873,
        class_label: "weed".to_owned(),
    }
}

/// Scripted detector.
pub struct FakeDetector {
    script: Mutex<VecDeque<Result<DetectionResult, DetectionError>>>,
    fallback: Result<DetectionResult, DetectionError>,
    delay: Duration,
    calls: AtomicUsize,
    last_payload: Mutex<Option<String>>,
}

impl FakeDetector {
    pub fn new(fallback: Result<DetectionResult, DetectionError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_payload: Mutex::new(None),
        }
    }

    /// Always answers with one `weed` at (100, 100).
    pub fn weeds() -> Self {
        Self::new(Ok(result_of(vec![weed()])))
    }

    /// Always answers HTTP 500.
    pub fn failing() -> Self {
        Self::new(Err(DetectionError::Status {
            status: 500,
            body: "boom".to_owned(),
        }))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a one-off answer used before the fallback.
    pub fn then(self, answer: Result<DetectionResult, DetectionError>) -> Self {
        lock(&self.script).push_back(answer);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_payload(&self) -> Option<String> {
        lock(&self.last_payload).clone()
    }
}

impl Detector for FakeDetector {
    fn detect(&self, image_base64: &str) -> Result<DetectionResult, DetectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.last_payload) = Some(image_base64.to_owned());
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Wrap detections as an endpoint response.
pub fn result_of(detections: Vec<Detection>) -> DetectionResult {
    DetectionResult {
        raw: json!({ "predictions": detections }),
        detections,
    }
}
