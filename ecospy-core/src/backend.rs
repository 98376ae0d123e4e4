//! Bundle of collaborator implementations the kiosk runs against.

use std::sync::Arc;

use crate::memory::InMemoryStore;
use crate::ports::{CameraPort, DetectorPort, PriceCatalogPort, UserStorePort};

/// Camera, detector, and stores chosen at start-up.
#[derive(Clone)]
pub struct KioskBackend {
    /// Frame source.
    pub camera: Arc<dyn CameraPort>,
    /// Object detector.
    pub detector: Arc<dyn DetectorPort>,
    /// Reference prices.
    pub catalog: Arc<dyn PriceCatalogPort>,
    /// User records and history.
    pub users: Arc<dyn UserStorePort>,
}

impl KioskBackend {
    /// Backend whose catalog and user store are the same in-memory store.
    #[must_use]
    pub fn in_memory(
        store: Arc<InMemoryStore>,
        camera: Arc<dyn CameraPort>,
        detector: Arc<dyn DetectorPort>,
    ) -> Self {
        Self {
            camera,
            detector,
            catalog: Arc::<InMemoryStore>::clone(&store),
            users: store,
        }
    }
}
