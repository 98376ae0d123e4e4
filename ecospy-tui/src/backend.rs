use std::sync::Arc;

use anyhow::{Context, Result};
use ecospy_core::{
    backend::KioskBackend,
    memory::{InMemoryStore, ScriptedCamera, ScriptedDetector},
    model::{UserId, UserRecord},
};
use ecospy_provider_firestore as firestore;
use ecospy_provider_vision as vision;
use reqwest::Client;
use tracing::info;

use crate::config::AppConfig;

// JPEG start/end markers; enough for the archive to have something to write.
const DEMO_FRAME: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xD9];

/// Firestore for prices and users, HTTP camera and detector for vision.
pub(crate) fn live(config: &AppConfig, client: &Client) -> Result<KioskBackend> {
    let firestore = config
        .firestore
        .as_ref()
        .context("[firestore] table missing from config (or run with --demo)")?;
    let vision = config
        .vision
        .as_ref()
        .context("[vision] table missing from config (or run with --demo)")?;

    let (catalog, users) = firestore::ports(client.clone(), firestore);
    let (camera, detector) = vision::ports(client.clone(), vision);
    info!(project = %firestore.project_id, camera = %vision.snapshot_url, "live backend");

    Ok(KioskBackend {
        camera,
        detector,
        catalog,
        users,
    })
}

/// Everything in memory; each capture cycles through a few canned scenes.
pub(crate) fn demo() -> KioskBackend {
    let store = InMemoryStore::new()
        .with_price("bottle", 2.0, 0.05, "Plastic")
        .with_price("plastic", 2.0, 0.03, "Plastic")
        .with_price("can", 4.0, 0.015, "Metal")
        .with_price("cup", 1.5, 0.01, "Paper")
        .with_price("paper", 1.0, 0.005, "Paper")
        .with_price("cardboard", 1.2, 0.1, "Paper")
        .with_user(UserRecord {
            id: UserId("demo-user".to_owned()),
            name: "Demo User".to_owned(),
            email: Some("demo@ecospy.example".to_owned()),
            phone: Some("9876543210".to_owned()),
            mobile: None,
            ecopoints: 10.0,
            wastecollected: 1.5,
        });

    let detector = ScriptedDetector::new([
        vec!["bottle", "person", "bottle"],
        vec!["can", "cup"],
        vec!["cell phone"],
    ]);

    info!("demo backend");
    KioskBackend::in_memory(
        Arc::new(store),
        Arc::new(ScriptedCamera::new(DEMO_FRAME.to_vec())),
        Arc::new(detector),
    )
}
