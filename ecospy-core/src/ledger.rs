//! Credits payouts to user records and writes the transaction history.
//!
//! The store offers no multi-document transactions, so a settlement is a sequence of
//! independent writes:
//!
//! 1. read the user's current `wastecollected`,
//! 2. increment `ecopoints` by the payout,
//! 3. write back `wastecollected + weight`,
//! 4. count the user's history records and write `DOC<count + 1>`.
//!
//! A failure in step 1, or a step 2 failure the store provably refused, leaves the
//! store untouched and is reported as [`LedgerError::Store`]. Any other step 2
//! failure may have credited the points anyway. That case, and every failure after
//! step 2, is reported as [`LedgerError::ReconciliationRequired`] so the payout is
//! never retried blindly.
//!
//! Two kiosks settling for the same user at the same time can compute the same
//! history id (one record overwrites the other) and can lose one weight update.
//! Calling [`LedgerUpdater::apply`] twice for one transaction credits twice.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info};

use crate::model::{GeoPoint, HistoryId, HistoryRecord, Payout, UserId};
use crate::ports::{PortError, UserStorePort};

/// Status written to history records unless configured otherwise.
pub const DEFAULT_HISTORY_STATUS: &str = "Recycled";

#[derive(Debug, Clone, PartialEq, Deserialize)]
/// Fixed fields stamped on every history record written by this kiosk.
pub struct HistoryTemplate {
    /// Kiosk location.
    #[serde(default = "default_location")]
    pub location: GeoPoint,
    /// Status tag.
    #[serde(default = "default_status")]
    pub status: String,
}

impl Default for HistoryTemplate {
    fn default() -> Self {
        Self {
            location: default_location(),
            status: default_status(),
        }
    }
}

fn default_location() -> GeoPoint {
    GeoPoint {
        latitude: 28.61,
        longitude: 77.20,
    }
}

fn default_status() -> String {
    DEFAULT_HISTORY_STATUS.to_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Last ledger write that succeeded before a failure.
pub enum LedgerStep {
    /// The increment failed in a way that does not tell whether it was applied.
    PointsMaybeCredited,
    /// `ecopoints` was incremented.
    PointsCredited,
    /// `wastecollected` was written back.
    WeightRecorded,
}

impl fmt::Display for LedgerStep {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PointsMaybeCredited => "points possibly credited",
            Self::PointsCredited => "points credited",
            Self::WeightRecorded => "points credited and weight recorded",
        };
        formatter.write_str(text)
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors raised while settling a payout.
pub enum LedgerError {
    /// Payout amounts must be finite and non-negative.
    #[error("Invalid payout: {0}")]
    InvalidPayout(String),
    /// Nothing was written.
    #[error("Ledger unavailable: {0}")]
    Store(#[source] PortError),
    /// Some writes succeeded; the user record needs manual reconciliation.
    #[error("Ledger for user {user} needs reconciliation ({completed}, history {history}): {source}")]
    ReconciliationRequired {
        /// Affected user.
        user: UserId,
        /// History record that was being written, if its id was known.
        history: String,
        /// Last write that went through.
        completed: LedgerStep,
        /// Failure that interrupted the settlement.
        #[source]
        source: PortError,
    },
}

#[derive(Debug, Clone, PartialEq)]
/// What a successful settlement wrote.
pub struct LedgerReceipt {
    /// Identifier of the new history record.
    pub history_id: HistoryId,
    /// User's cumulative weight after the update.
    pub new_waste_collected: f64,
    /// The record that was appended.
    pub record: HistoryRecord,
}

/// Applies payouts to the user store.
pub struct LedgerUpdater<'port> {
    store: &'port dyn UserStorePort,
    template: &'port HistoryTemplate,
}

impl<'port> LedgerUpdater<'port> {
    /// Bind the updater to a store and history template.
    #[must_use]
    pub fn new(store: &'port dyn UserStorePort, template: &'port HistoryTemplate) -> Self {
        Self { store, template }
    }

    /// Credit `payout` to `user`, stamping the history record with the current time.
    ///
    /// # Errors
    ///
    /// See [`LedgerUpdater::apply_at`].
    pub async fn apply(&self, user: &UserId, payout: &Payout) -> Result<LedgerReceipt, LedgerError> {
        self.apply_at(user, payout, Utc::now()).await
    }

    /// Credit `payout` to `user` with an explicit collection time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidPayout`] for negative or non-finite amounts,
    /// [`LedgerError::Store`] when nothing was written, and
    /// [`LedgerError::ReconciliationRequired`] when the store failed part-way.
    pub async fn apply_at(
        &self,
        user: &UserId,
        payout: &Payout,
        collected_at: DateTime<Utc>,
    ) -> Result<LedgerReceipt, LedgerError> {
        validate(payout)?;

        let existing = self.store.user(user).await.map_err(LedgerError::Store)?;
        let new_waste_collected = existing.wastecollected + payout.total_weight;

        if let Err(source) = self.store.increment_points(user, payout.total_payout).await {
            if source.left_store_untouched() {
                return Err(LedgerError::Store(source));
            }
            return Err(reconciliation(
                user,
                "<unassigned>",
                LedgerStep::PointsMaybeCredited,
                source,
            ));
        }

        if let Err(source) = self.store.set_waste_collected(user, new_waste_collected).await {
            return Err(reconciliation(user, "<unassigned>", LedgerStep::PointsCredited, source));
        }

        let next = match self.store.history_count(user).await {
            Ok(count) => count + 1,
            Err(source) => {
                return Err(reconciliation(
                    user,
                    "<unassigned>",
                    LedgerStep::WeightRecorded,
                    source,
                ));
            }
        };
        let history_id = HistoryId::sequential(next);

        let record = HistoryRecord {
            collection_date: collected_at,
            location: self.template.location,
            points_earned: payout.total_payout,
            status: self.template.status.clone(),
            waste_type: payout.waste_type.clone(),
            weight_kg: payout.total_weight,
        };

        if let Err(source) = self.store.put_history(user, &history_id, &record).await {
            return Err(reconciliation(
                user,
                &history_id.0,
                LedgerStep::WeightRecorded,
                source,
            ));
        }

        info!(
            %user,
            %history_id,
            points = payout.total_payout,
            weight = payout.total_weight,
            waste_type = %payout.waste_type,
            "payout settled"
        );

        Ok(LedgerReceipt {
            history_id,
            new_waste_collected,
            record,
        })
    }
}

fn reconciliation(
    user: &UserId,
    history: &str,
    completed: LedgerStep,
    source: PortError,
) -> LedgerError {
    error!(
        %user,
        history,
        %completed,
        error = %source,
        "ledger write interrupted, reconciliation required"
    );
    LedgerError::ReconciliationRequired {
        user: user.clone(),
        history: history.to_owned(),
        completed,
        source,
    }
}

fn validate(payout: &Payout) -> Result<(), LedgerError> {
    for (name, amount) in [
        ("payout", payout.total_payout),
        ("weight", payout.total_weight),
    ] {
        if !amount.is_finite() || amount < 0.0 {
            return Err(LedgerError::InvalidPayout(format!("{name} is {amount}")));
        }
    }
    Ok(())
}
