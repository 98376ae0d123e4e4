//! High-level service facade driving a kiosk session.

use tracing::{info, warn};

use crate::archive::FrameArchive;
use crate::backend::KioskBackend;
use crate::classifier::RecyclabilityClassifier;
use crate::config::KioskConfig;
use crate::detection::{DetectionAdapter, DetectionOutcome};
use crate::ledger::{HistoryTemplate, LedgerError, LedgerUpdater};
use crate::model::{IdentityField, Payout, RecyclableCounts, UserRecord};
use crate::payout::PayoutCalculator;
use crate::ports::PortError;
use crate::session::{Session, SessionError, Settlement, Stage};

#[derive(thiserror::Error, Debug)]
/// Errors surfaced to kiosk front-ends.
pub enum KioskError {
    /// A collaborator failed.
    #[error(transparent)]
    Port(#[from] PortError),
    /// Settling the payout failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// The action does not fit the session's stage.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// Nothing was typed.
    #[error("Please enter an email or mobile number")]
    EmptyIdentity,
    /// No user has the typed email, phone, or mobile.
    #[error("User not found: {0}")]
    UserNotFound(String),
}

/// Public entry point for capturing, identifying, quoting, and settling.
pub struct KioskService {
    backend: KioskBackend,
    classifier: RecyclabilityClassifier,
    archive: FrameArchive,
    history: HistoryTemplate,
}

impl KioskService {
    /// Create a service from a backend and validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::Port`] when the capture directory cannot be created.
    pub fn new(backend: KioskBackend, config: &KioskConfig) -> Result<Self, KioskError> {
        Ok(Self {
            backend,
            classifier: config.classifier(),
            archive: FrameArchive::open(&config.capture_dir)?,
            history: config.history.clone(),
        })
    }

    /// Classifier in use.
    #[must_use]
    pub fn classifier(&self) -> &RecyclabilityClassifier {
        &self.classifier
    }

    /// Grab a frame, archive it, detect items, and add them to the session.
    ///
    /// On failure the session stays in [`Stage::Capturing`]; the caller decides
    /// whether to retry or abandon the capture.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::Session`] unless capturing, and [`KioskError::Port`] when
    /// the camera or detector fails.
    pub async fn capture(&self, session: &mut Session) -> Result<DetectionOutcome, KioskError> {
        if session.stage() != &Stage::Capturing {
            return Err(SessionError::InvalidTransition {
                stage: session.stage().name(),
                action: "capture",
            }
            .into());
        }

        let frame = self.backend.camera.capture().await?;
        if frame.is_empty() {
            return Err(PortError::DeviceUnavailable("camera returned an empty frame".to_owned()).into());
        }

        let path = match self.archive.store(&frame) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(error = %err, "could not archive frame, continuing without it");
                None
            }
        };

        let outcome = DetectionAdapter::new(self.backend.detector.as_ref(), &self.classifier)
            .run(&frame)
            .await?;

        info!(
            detected = outcome.labels.len(),
            recyclable = outcome.recyclable.total_items(),
            "capture analysed"
        );
        session.record_capture(outcome.clone(), path)?;
        Ok(outcome)
    }

    /// Resolve typed input to a user: exact match on email, then phone, then mobile.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::EmptyIdentity`] for blank input,
    /// [`KioskError::UserNotFound`] when nothing matches, and [`KioskError::Port`] when
    /// a query fails.
    pub async fn find_user(&self, input: &str) -> Result<UserRecord, KioskError> {
        let needle = input.trim();
        if needle.is_empty() {
            return Err(KioskError::EmptyIdentity);
        }

        for field in IdentityField::PRIORITY {
            if let Some(user) = self.backend.users.find_user(field, needle).await? {
                info!(user = %user.id, %field, "user identified");
                return Ok(user);
            }
        }

        warn!("no user matches the entered identity");
        Err(KioskError::UserNotFound(needle.to_owned()))
    }

    /// Price recyclable counts against the catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`PortError`] when a catalog lookup fails.
    pub async fn quote(&self, counts: &RecyclableCounts) -> Result<Payout, PortError> {
        PayoutCalculator::new(self.backend.catalog.as_ref())
            .calculate(counts)
            .await
    }

    /// Look up the typed identity and quote the session's items for that user.
    ///
    /// # Errors
    ///
    /// See [`KioskService::find_user`] and [`KioskService::quote`]; also fails unless
    /// the session is waiting for identity entry.
    pub async fn identify(&self, session: &mut Session, input: &str) -> Result<(), KioskError> {
        if session.stage() != &Stage::IdentityEntry {
            return Err(SessionError::InvalidTransition {
                stage: session.stage().name(),
                action: "identify",
            }
            .into());
        }

        let user = self.find_user(input).await?;
        let quote = self.quote(session.recyclable()).await?;
        session.confirm_identity(user, quote)?;
        Ok(())
    }

    /// Credit the pending quote to the confirmed user.
    ///
    /// When the ledger fails before writing anything the session keeps its stage so
    /// the operator can retry. When it fails part-way the session is cancelled, since
    /// a retry would credit the points a second time.
    ///
    /// # Errors
    ///
    /// Returns [`KioskError::Session`] without a pending payout and
    /// [`KioskError::Ledger`] when settlement fails.
    pub async fn settle(&self, session: &mut Session) -> Result<Settlement, KioskError> {
        let Some((user, quote)) = session.pending_payout() else {
            return Err(SessionError::InvalidTransition {
                stage: session.stage().name(),
                action: "settle",
            }
            .into());
        };
        let user = user.clone();
        let payout = quote.clone();

        let receipt = match LedgerUpdater::new(self.backend.users.as_ref(), &self.history)
            .apply(&user.id, &payout)
            .await
        {
            Ok(receipt) => receipt,
            Err(err @ LedgerError::ReconciliationRequired { .. }) => {
                session.cancel();
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        };

        let settlement = Settlement {
            user,
            payout,
            receipt,
        };
        session.settle(settlement.clone())?;
        Ok(settlement)
    }
}
