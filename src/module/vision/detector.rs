//! Provide Object Detection
//!
//! Detection is delegated to a remote inference endpoint; this module shapes the
//! request and classifies failures.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors returned by a detection call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DetectionError {
    #[error("no API key configured for the inference endpoint")]
    MissingApiKey,
    #[error("invalid endpoint URL: {0}")]
    Endpoint(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Detection result
///
/// One predicted box in pixel coordinates of the submitted image. `x`/`y` is the box center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub confidence: f64,
    #[serde(rename = "class")]
    pub class_label: String,
}

impl Detection {
    /// Top-left corner of the box.
    pub fn top_left(&self) -> (f64, f64) {
        (self.x - self.width / 2.0, self.y - self.height / 2.0)
    }

    /// Text drawn above the box, e.g. `weed 87.3%`.
    pub fn label(&self) -> String {
        format!("{} {:.1}%", self.class_label, self.confidence * 100.0)
    }
}

/// Detections of one image plus the response they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub raw: Value,
}

impl DetectionResult {
    /// Parse a response body.
    pub fn from_body(body: &str) -> Result<Self, DetectionError> {
        let raw: Value =
            serde_json::from_str(body).map_err(|e| DetectionError::Malformed(e.to_string()))?;
        let predictions = raw
            .get("predictions")
            .cloned()
            .ok_or_else(|| DetectionError::Malformed("missing `predictions`".to_owned()))?;
        let detections: Vec<Detection> = serde_json::from_value(predictions)
            .map_err(|e| DetectionError::Malformed(e.to_string()))?;
        Ok(Self { detections, raw })
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Raw response, pretty printed for the results panel.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_else(|_| self.raw.to_string())
    }
}

/// Something that turns an image into detections.
pub trait Detector: Send + Sync {
    /// Detect on a base64 encoded image.
    fn detect(&self, image_base64: &str) -> Result<DetectionResult, DetectionError>;
}

pub mod roboflow {
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::header::CONTENT_TYPE;
    use reqwest::Url;

    use super::{DetectionError, DetectionResult, Detector};
    use crate::module::define;
    use crate::module::util::conf;

    /// Client for the hosted inference endpoint.
    pub struct RoboflowClient {
        client: Client,
        url: Url,
    }

    impl RoboflowClient {
        /// Build a client from the detector config section.
        pub fn new(conf: &conf::Detector) -> Result<Self, DetectionError> {
            if conf.api_key.trim().is_empty() {
                return Err(DetectionError::MissingApiKey);
            }
            // Thresholds are fixed; only the endpoint and key are configurable.
            let confidence = define::detector::CONFIDENCE.to_string();
            let overlap = define::detector::OVERLAP.to_string();
            let url = Url::parse_with_params(
                &conf.endpoint,
                &[
                    ("api_key", conf.api_key.as_str()),
                    ("confidence", confidence.as_str()),
                    ("overlap", overlap.as_str()),
                ],
            )
            .map_err(|e| DetectionError::Endpoint(e.to_string()))?;
            let client = Client::builder()
                .timeout(Duration::from_secs(conf.timeout_secs))
                .build()
                .map_err(|e| DetectionError::Request(e.to_string()))?;
            Ok(Self { client, url })
        }

        /// Endpoint without the credential, for logging.
        pub fn endpoint(&self) -> String {
            let mut url = self.url.clone();
            url.set_query(None);
            url.to_string()
        }
    }

    impl Detector for RoboflowClient {
        fn detect(&self, image_base64: &str) -> Result<DetectionResult, DetectionError> {
            log::debug!(
                "POST {} ({} bytes payload)",
                self.endpoint(),
                image_base64.len()
            );
            let res = self
                .client
                .post(self.url.clone())
                .header(CONTENT_TYPE, define::detector::CONTENT_TYPE)
                .body(image_base64.to_owned())
                .send()
                .map_err(|e| DetectionError::Request(e.without_url().to_string()))?;

            let status = res.status();
            let body = res
                .text()
                .map_err(|e| DetectionError::Request(e.without_url().to_string()))?;
            if !status.is_success() {
                return Err(DetectionError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            let result = DetectionResult::from_body(&body)?;
            log::info!("Detected {} objects", result.len());
            Ok(result)
        }
    }
}
