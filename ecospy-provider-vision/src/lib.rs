//! Camera and object detector reached over HTTP.
//!
//! The camera is any endpoint serving a JPEG snapshot per GET (for example
//! mjpg-streamer's `?action=snapshot`). The detector is an inference sidecar that
//! accepts a JPEG body and answers with the objects it found.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, header};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use ecospy_core::{
    model::{BoundingBox, Detection, Frame},
    ports::{CameraPort, DetectorPort, PortError},
};

const JPEG: &str = "image/jpeg";
const DEFAULT_CAMERA_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_DETECTOR_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Deserialize)]
/// The `[vision]` configuration table.
pub struct VisionSettings {
    /// URL returning one JPEG frame per GET.
    pub snapshot_url: String,
    /// URL of the inference endpoint.
    pub detector_url: String,
    /// Minimum confidence for a detection to be kept.
    #[serde(default)]
    pub min_confidence: f32,
    /// Per-request timeout for the camera.
    #[serde(default = "default_camera_timeout")]
    pub camera_timeout_ms: u64,
    /// Per-request timeout for inference.
    #[serde(default = "default_detector_timeout")]
    pub detector_timeout_ms: u64,
}

fn default_camera_timeout() -> u64 {
    DEFAULT_CAMERA_TIMEOUT_MS
}

fn default_detector_timeout() -> u64 {
    DEFAULT_DETECTOR_TIMEOUT_MS
}

/// Response from the inference sidecar.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

/// Single object from the inference sidecar.
#[derive(Debug, Deserialize)]
struct RawDetection {
    label: String,
    #[serde(default)]
    confidence: f32,
    /// `[x1, y1, x2, y2]` in pixels.
    #[serde(rename = "box", default)]
    bbox: [f32; 4],
}

impl RawDetection {
    fn into_detection(self) -> Detection {
        let [x1, y1, x2, y2] = self.bbox;
        Detection {
            label: self.label,
            confidence: self.confidence,
            bbox: BoundingBox { x1, y1, x2, y2 },
        }
    }
}

/// Camera that fetches snapshots from an HTTP endpoint.
pub struct HttpSnapshotCamera {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpSnapshotCamera {
    /// Create a camera bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: &VisionSettings) -> Self {
        Self {
            client,
            url: settings.snapshot_url.clone(),
            timeout: Duration::from_millis(settings.camera_timeout_ms),
        }
    }
}

#[async_trait]
impl CameraPort for HttpSnapshotCamera {
    async fn capture(&self) -> Result<Frame, PortError> {
        let unavailable = |err: reqwest::Error| {
            warn!(url = %self.url, error = %err, "camera request failed");
            PortError::DeviceUnavailable(err.to_string())
        };

        let bytes = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .bytes()
            .await
            .map_err(unavailable)?;

        if bytes.is_empty() {
            return Err(PortError::DeviceUnavailable(
                "camera returned an empty snapshot".to_owned(),
            ));
        }
        debug!(bytes = bytes.len(), "snapshot captured");
        Ok(Frame::new(bytes.to_vec()))
    }
}

/// Detector backed by an HTTP inference sidecar.
pub struct HttpDetector {
    client: Client,
    url: String,
    timeout: Duration,
    min_confidence: f32,
}

impl HttpDetector {
    /// Create a detector bound to the given HTTP client.
    #[must_use]
    pub fn new(client: Client, settings: &VisionSettings) -> Self {
        Self {
            client,
            url: settings.detector_url.clone(),
            timeout: Duration::from_millis(settings.detector_timeout_ms),
            min_confidence: settings.min_confidence,
        }
    }
}

#[async_trait]
impl DetectorPort for HttpDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, PortError> {
        let req = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(header::CONTENT_TYPE, JPEG)
            .body(frame.bytes().to_vec());

        let response = fetch_json::<DetectResponse>(req).await?;
        Ok(filter_detections(response, self.min_confidence))
    }
}

fn filter_detections(response: DetectResponse, min_confidence: f32) -> Vec<Detection> {
    response
        .detections
        .into_iter()
        .filter(|raw| raw.confidence >= min_confidence && !raw.label.trim().is_empty())
        .map(RawDetection::into_detection)
        .collect()
}

/// Camera and detector sharing one HTTP client.
#[must_use]
pub fn ports(
    client: Client,
    settings: &VisionSettings,
) -> (Arc<HttpSnapshotCamera>, Arc<HttpDetector>) {
    (
        Arc::new(HttpSnapshotCamera::new(client.clone(), settings)),
        Arc::new(HttpDetector::new(client, settings)),
    )
}

// Small helper to fetch and decode JSON with status handling.
async fn fetch_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, PortError> {
    req.send()
        .await
        .map_err(PortError::from)?
        .error_for_status()
        .map_err(PortError::from)?
        .json()
        .await
        .map_err(PortError::from)
}
