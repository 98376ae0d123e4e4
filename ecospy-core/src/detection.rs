//! Reduces raw detector output to labels and recyclable counts.

use tracing::debug;

use crate::classifier::RecyclabilityClassifier;
use crate::model::{DetectedLabel, Detection, Frame, RecyclableCounts};
use crate::ports::{DetectorPort, PortError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// What one capture contained.
pub struct DetectionOutcome {
    /// Every detected object, in detector order.
    pub labels: Vec<DetectedLabel>,
    /// Allow-listed labels and their counts.
    pub recyclable: RecyclableCounts,
}

impl DetectionOutcome {
    /// Build an outcome from raw detections.
    #[must_use]
    pub fn from_detections(detections: &[Detection], classifier: &RecyclabilityClassifier) -> Self {
        let mut outcome = Self::default();
        for detection in detections {
            let label = DetectedLabel::new(&detection.label);
            if classifier.is_recyclable(label.as_str()) {
                outcome.recyclable.record(label.clone());
            }
            outcome.labels.push(label);
        }
        outcome
    }

    /// True when the detector found nothing at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Runs the detector and applies the classifier to its output.
pub struct DetectionAdapter<'port> {
    detector: &'port dyn DetectorPort,
    classifier: &'port RecyclabilityClassifier,
}

impl<'port> DetectionAdapter<'port> {
    /// Bind a detector and classifier.
    #[must_use]
    pub fn new(
        detector: &'port dyn DetectorPort,
        classifier: &'port RecyclabilityClassifier,
    ) -> Self {
        Self {
            detector,
            classifier,
        }
    }

    /// Detect objects in `frame`.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the detector fails. Zero detections is not an error.
    pub async fn run(&self, frame: &Frame) -> Result<DetectionOutcome, PortError> {
        let detections = self.detector.detect(frame).await?;
        let outcome = DetectionOutcome::from_detections(&detections, self.classifier);
        debug!(
            detected = outcome.labels.len(),
            recyclable = outcome.recyclable.total_items(),
            "frame analysed"
        );
        Ok(outcome)
    }
}
