//! Traits describing the kiosk's external collaborators and their shared error type.

use std::io::Error as IoError;

use async_trait::async_trait;
use reqwest::Error as ReqwestError;

use crate::model::{
    Detection, Frame, HistoryId, HistoryRecord, IdentityField, PriceEntry, UserId, UserRecord,
};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while talking to cameras, detectors, and stores.
pub enum PortError {
    /// Network layer failed.
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),
    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),
    /// The camera could not be opened or returned no frame.
    #[error("Camera unavailable: {0}")]
    DeviceUnavailable(String),
    /// A response could not be interpreted.
    #[error("Malformed response: {0}")]
    Decode(String),
    /// A record that must exist is missing.
    #[error("Not found: {0}")]
    NotFound(String),
    /// The backend rejected the request.
    #[error("Rejected: {0}")]
    Rejected(String),
    /// Internal backend error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PortError {
    /// True when the failed request certainly changed nothing on the remote side:
    /// it never connected, was never built, or was refused with a 4xx status.
    ///
    /// Timeouts, resets, 5xx answers and unreadable responses may follow a write
    /// that went through, so they report `false`.
    #[must_use]
    pub fn left_store_untouched(&self) -> bool {
        match self {
            Self::Network(err) => {
                err.is_connect()
                    || err.is_builder()
                    || err.status().is_some_and(|status| status.is_client_error())
            }
            Self::NotFound(_) | Self::Rejected(_) => true,
            Self::Io(_) | Self::DeviceUnavailable(_) | Self::Decode(_) | Self::Internal(_) => false,
        }
    }
}

#[async_trait]
/// Source of still frames.
pub trait CameraPort: Send + Sync {
    /// Grab one frame.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::DeviceUnavailable`] when no frame can be read.
    async fn capture(&self) -> Result<Frame, PortError>;
}

#[async_trait]
/// Pretrained object detector.
pub trait DetectorPort: Send + Sync {
    /// Run inference on a frame. One entry per detected object instance.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the inference backend fails.
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>, PortError>;
}

#[async_trait]
/// Read-only reference prices keyed by item label.
pub trait PriceCatalogPort: Send + Sync {
    /// Look up the price entry for a label. `Ok(None)` means the store has no data.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the lookup itself fails.
    async fn price_entry(&self, label: &str) -> Result<Option<PriceEntry>, PortError>;
}

#[async_trait]
/// User records and their transaction history.
pub trait UserStorePort: Send + Sync {
    /// Find the first user whose `field` equals `value` exactly.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the query fails.
    async fn find_user(
        &self,
        field: IdentityField,
        value: &str,
    ) -> Result<Option<UserRecord>, PortError>;

    /// Load a user by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`PortError::NotFound`] when the user does not exist.
    async fn user(&self, id: &UserId) -> Result<UserRecord, PortError>;

    /// Add `amount` to the user's `ecopoints` with an increment-style update.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the update fails.
    async fn increment_points(&self, id: &UserId, amount: f64) -> Result<(), PortError>;

    /// Overwrite the user's `wastecollected` total.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the update fails.
    async fn set_waste_collected(&self, id: &UserId, total: f64) -> Result<(), PortError>;

    /// Number of history records stored under the user.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the listing fails.
    async fn history_count(&self, id: &UserId) -> Result<usize, PortError>;

    /// Write a history record under the user with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when the write fails.
    async fn put_history(
        &self,
        id: &UserId,
        history_id: &HistoryId,
        record: &HistoryRecord,
    ) -> Result<(), PortError>;
}

#[cfg(test)]
mod tests {
    use reqwest::Client;

    use super::*;

    #[test]
    fn refused_or_unsent_requests_left_store_untouched() {
        let unsent = Client::new()
            .get("not a url")
            .build()
            .expect_err("url does not parse");

        assert!(PortError::from(unsent).left_store_untouched(), "never sent");
        assert!(PortError::Rejected("quota".to_owned()).left_store_untouched());
        assert!(PortError::NotFound("user u1".to_owned()).left_store_untouched());
    }

    #[test]
    fn ambiguous_failures_may_have_written() {
        assert!(!PortError::Internal("connection reset".to_owned()).left_store_untouched());
        assert!(!PortError::Decode("truncated body".to_owned()).left_store_untouched());
    }
}
