//! State machine for one customer at the kiosk.

use std::fmt;
use std::path::PathBuf;

use tracing::info;

use crate::detection::DetectionOutcome;
use crate::ledger::LedgerReceipt;
use crate::model::{DetectedLabel, Payout, RecyclableCounts, UserRecord};

#[derive(Debug, Clone, PartialEq)]
/// Outcome of a confirmed payout, kept for the result screen.
pub struct Settlement {
    /// User as loaded before the credit.
    pub user: UserRecord,
    /// Amounts that were credited.
    pub payout: Payout,
    /// What the ledger wrote.
    pub receipt: LedgerReceipt,
}

impl Settlement {
    /// Balance after the credit, as shown to the user.
    #[must_use]
    pub fn final_ecopoints(&self) -> f64 {
        self.user.ecopoints + self.payout.total_payout
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Where the session currently is.
pub enum Stage {
    /// Waiting for a customer.
    Idle,
    /// Camera view is open.
    Capturing,
    /// Detected items are shown for review.
    Reviewing,
    /// Waiting for an email or phone number.
    IdentityEntry,
    /// A user was found; the quoted payout awaits confirmation.
    IdentityConfirmed {
        /// The matched user.
        user: UserRecord,
        /// Payout that will be credited on confirmation.
        quote: Payout,
    },
    /// Points were credited.
    PayoutConfirmed(Settlement),
}

impl Stage {
    /// Short name for logs and errors.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::Reviewing => "reviewing",
            Self::IdentityEntry => "identity entry",
            Self::IdentityConfirmed { .. } => "identity confirmed",
            Self::PayoutConfirmed(_) => "payout confirmed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
/// Errors raised by session transitions.
pub enum SessionError {
    /// The action is not allowed in the current stage.
    #[error("Cannot {action} while {stage}")]
    InvalidTransition {
        /// Stage the session was in.
        stage: &'static str,
        /// Rejected action.
        action: &'static str,
    },
}

/// Items and user gathered for one customer.
#[derive(Debug, Clone)]
pub struct Session {
    stage: Stage,
    detected: Vec<DetectedLabel>,
    recyclable: RecyclableCounts,
    frames: Vec<PathBuf>,
    captures: usize,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Fresh idle session.
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            detected: Vec::new(),
            recyclable: RecyclableCounts::new(),
            frames: Vec::new(),
            captures: 0,
        }
    }

    /// Current stage.
    #[must_use]
    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    /// All labels detected so far.
    #[must_use]
    pub fn detected(&self) -> &[DetectedLabel] {
        &self.detected
    }

    /// Recyclable counts accumulated so far.
    #[must_use]
    pub fn recyclable(&self) -> &RecyclableCounts {
        &self.recyclable
    }

    /// Number of captures recorded in this session.
    #[must_use]
    pub fn captures(&self) -> usize {
        self.captures
    }

    /// Archived frames for this session.
    #[must_use]
    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    /// Open the camera, from idle or to add more items.
    ///
    /// # Errors
    ///
    /// Fails unless idle or reviewing.
    pub fn start_capture(&mut self) -> Result<(), SessionError> {
        match self.stage {
            Stage::Idle | Stage::Reviewing => {
                self.enter(Stage::Capturing);
                Ok(())
            }
            _ => Err(self.invalid("start capture")),
        }
    }

    /// Add one capture's detections and move to review.
    ///
    /// # Errors
    ///
    /// Fails unless capturing.
    pub fn record_capture(
        &mut self,
        outcome: DetectionOutcome,
        frame: Option<PathBuf>,
    ) -> Result<(), SessionError> {
        if self.stage != Stage::Capturing {
            return Err(self.invalid("record a capture"));
        }
        self.detected.extend(outcome.labels);
        self.recyclable.merge(&outcome.recyclable);
        self.frames.extend(frame);
        self.captures += 1;
        self.enter(Stage::Reviewing);
        Ok(())
    }

    /// Close the camera without a capture. Returns to review if this session already
    /// captured something, otherwise resets to idle.
    ///
    /// # Errors
    ///
    /// Fails unless capturing.
    pub fn abandon_capture(&mut self) -> Result<(), SessionError> {
        if self.stage != Stage::Capturing {
            return Err(self.invalid("abandon capture"));
        }
        if self.captures == 0 {
            self.reset();
        } else {
            self.enter(Stage::Reviewing);
        }
        Ok(())
    }

    /// Continue from review. With nothing recyclable the session resets to idle.
    ///
    /// # Errors
    ///
    /// Fails unless reviewing.
    pub fn proceed(&mut self) -> Result<(), SessionError> {
        if self.stage != Stage::Reviewing {
            return Err(self.invalid("proceed"));
        }
        if self.recyclable.is_empty() {
            info!("nothing recyclable, returning to idle");
            self.reset();
        } else {
            self.enter(Stage::IdentityEntry);
        }
        Ok(())
    }

    /// Accept a user and the payout quoted for them.
    ///
    /// # Errors
    ///
    /// Fails unless waiting for identity entry.
    pub fn confirm_identity(&mut self, user: UserRecord, quote: Payout) -> Result<(), SessionError> {
        if self.stage != Stage::IdentityEntry {
            return Err(self.invalid("confirm identity"));
        }
        self.enter(Stage::IdentityConfirmed { user, quote });
        Ok(())
    }

    /// The shown user is not the customer; ask again.
    ///
    /// # Errors
    ///
    /// Fails unless an identity is confirmed.
    pub fn reject_identity(&mut self) -> Result<(), SessionError> {
        if !matches!(self.stage, Stage::IdentityConfirmed { .. }) {
            return Err(self.invalid("reject identity"));
        }
        self.enter(Stage::IdentityEntry);
        Ok(())
    }

    /// User and quote awaiting confirmation.
    #[must_use]
    pub fn pending_payout(&self) -> Option<(&UserRecord, &Payout)> {
        match &self.stage {
            Stage::IdentityConfirmed { user, quote } => Some((user, quote)),
            _ => None,
        }
    }

    /// Record a completed settlement.
    ///
    /// # Errors
    ///
    /// Fails unless an identity is confirmed.
    pub fn settle(&mut self, settlement: Settlement) -> Result<(), SessionError> {
        if !matches!(self.stage, Stage::IdentityConfirmed { .. }) {
            return Err(self.invalid("settle"));
        }
        self.enter(Stage::PayoutConfirmed(settlement));
        Ok(())
    }

    /// Leave the result screen.
    ///
    /// # Errors
    ///
    /// Fails unless a payout was confirmed.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        if !matches!(self.stage, Stage::PayoutConfirmed(_)) {
            return Err(self.invalid("finish"));
        }
        self.reset();
        Ok(())
    }

    /// Drop everything gathered and return to idle. Allowed from any stage.
    pub fn cancel(&mut self) {
        if self.stage != Stage::Idle {
            info!(stage = %self.stage, "session cancelled");
        }
        self.reset();
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn enter(&mut self, stage: Stage) {
        info!(from = %self.stage, to = %stage, "session transition");
        self.stage = stage;
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            stage: self.stage.name(),
            action,
        }
    }
}
