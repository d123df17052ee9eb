//! Processing related to visual information.
//!
use std::sync::Arc;

use super::util::init::WeedtrackProperty;

pub mod annotate;
pub mod detector;
pub mod live;

/// Provide a means of image processing.
///
pub struct WeedtrackVision {
    pub det: Arc<dyn detector::Detector>,
    pub font: Arc<annotate::LabelFont>,
}

/// WeedtrackVision's methods.
///
impl WeedtrackVision {
    pub fn new(property: &WeedtrackProperty) -> Result<Self, detector::DetectionError> {
        let det = detector::roboflow::RoboflowClient::new(&property.conf.detector)?;
        log::info!("Inference endpoint: {}", det.endpoint());
        Ok(Self {
            det: Arc::new(det),
            font: Arc::new(annotate::LabelFont::load(
                &property.conf.annotate.font_path,
                property.conf.annotate.font_size,
            )),
        })
    }
}
