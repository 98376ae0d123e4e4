//! In-process backend: a document store, a scripted camera, and a scripted detector.
//!
//! Used by the test suites and by the kiosk's demo mode.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::model::{
    BoundingBox, Detection, Frame, HistoryId, HistoryRecord, IdentityField, PriceEntry, UserId,
    UserRecord,
};
use crate::ports::{CameraPort, DetectorPort, PortError, PriceCatalogPort, UserStorePort};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Store calls that can be made to fail on purpose.
pub enum StoreOperation {
    /// [`UserStorePort::increment_points`].
    IncrementPoints,
    /// [`UserStorePort::set_waste_collected`].
    SetWasteCollected,
    /// [`UserStorePort::history_count`].
    HistoryCount,
    /// [`UserStorePort::put_history`].
    PutHistory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Injected {
    /// Refused before anything is written.
    Refused,
    /// Applied, then reported as failed.
    LostReply,
}

#[derive(Default)]
struct StoreState {
    prices: HashMap<String, PriceEntry>,
    users: Vec<UserRecord>,
    history: HashMap<UserId, Vec<(HistoryId, HistoryRecord)>>,
    failing: Vec<(StoreOperation, Injected)>,
}

/// Price catalog and user store held in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a price entry.
    #[must_use]
    pub fn with_price(self, label: &str, price: f64, weight: f64, waste_type: &str) -> Self {
        self.insert_price(
            label,
            PriceEntry {
                price,
                weight,
                waste_type: waste_type.to_owned(),
            },
        );
        self
    }

    /// Add a user.
    #[must_use]
    pub fn with_user(self, user: UserRecord) -> Self {
        self.insert_user(user);
        self
    }

    /// Insert or replace a price entry.
    pub fn insert_price(&self, label: &str, entry: PriceEntry) {
        self.seed().prices.insert(label.to_lowercase(), entry);
    }

    /// Insert or replace a user.
    pub fn insert_user(&self, user: UserRecord) {
        let mut state = self.seed();
        state.users.retain(|existing| existing.id != user.id);
        state.users.push(user);
    }

    /// Make the next call of `operation` fail with [`PortError::Rejected`] and write nothing.
    pub fn fail_next(&self, operation: StoreOperation) {
        self.seed().failing.push((operation, Injected::Refused));
    }

    /// Make the next call of `operation` apply its write and then fail with
    /// [`PortError::Internal`], as when the reply to a committed write is lost.
    pub fn fail_after_next(&self, operation: StoreOperation) {
        self.seed().failing.push((operation, Injected::LostReply));
    }

    /// Current copy of a user, if present.
    #[must_use]
    pub fn snapshot(&self, id: &UserId) -> Option<UserRecord> {
        self.seed().users.iter().find(|user| &user.id == id).cloned()
    }

    /// History records stored under a user, in write order.
    #[must_use]
    pub fn history(&self, id: &UserId) -> Vec<(HistoryId, HistoryRecord)> {
        self.seed().history.get(id).cloned().unwrap_or_default()
    }

    /// Guard for setup and inspection helpers. A panic in another test thread
    /// does not make these silently skip.
    fn seed(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, PortError> {
        self.state
            .lock()
            .map_err(|err| PortError::Internal(format!("store lock poisoned: {err}")))
    }

    /// Lock for a write, firing a refusal queued for `operation`.
    ///
    /// Returns the queued lost-reply failure alongside the guard so the caller can
    /// apply its write first and then report it.
    fn lock_for(
        &self,
        operation: StoreOperation,
    ) -> Result<(MutexGuard<'_, StoreState>, Option<PortError>), PortError> {
        let mut state = self.lock()?;
        let Some(position) = state.failing.iter().position(|(failing, _)| *failing == operation)
        else {
            return Ok((state, None));
        };
        let (_, injected) = state.failing.remove(position);
        match injected {
            Injected::Refused => Err(PortError::Rejected(format!(
                "injected refusal in {operation:?}"
            ))),
            Injected::LostReply => Ok((
                state,
                Some(PortError::Internal(format!(
                    "injected lost reply in {operation:?}"
                ))),
            )),
        }
    }
}

/// `Err(lost)` when a lost reply was queued, after the write went through.
fn reply(lost: Option<PortError>) -> Result<(), PortError> {
    lost.map_or(Ok(()), Err)
}

impl StoreState {
    fn user_mut(&mut self, id: &UserId) -> Result<&mut UserRecord, PortError> {
        self.users
            .iter_mut()
            .find(|user| &user.id == id)
            .ok_or_else(|| PortError::NotFound(format!("user {id}")))
    }
}

#[async_trait]
impl PriceCatalogPort for InMemoryStore {
    async fn price_entry(&self, label: &str) -> Result<Option<PriceEntry>, PortError> {
        Ok(self.lock()?.prices.get(&label.to_lowercase()).cloned())
    }
}

#[async_trait]
impl UserStorePort for InMemoryStore {
    async fn find_user(
        &self,
        field: IdentityField,
        value: &str,
    ) -> Result<Option<UserRecord>, PortError> {
        Ok(self
            .lock()?
            .users
            .iter()
            .find(|user| user.identity(field) == Some(value))
            .cloned())
    }

    async fn user(&self, id: &UserId) -> Result<UserRecord, PortError> {
        self.lock()?.user_mut(id).map(|user| user.clone())
    }

    async fn increment_points(&self, id: &UserId, amount: f64) -> Result<(), PortError> {
        let (mut state, lost) = self.lock_for(StoreOperation::IncrementPoints)?;
        state.user_mut(id)?.ecopoints += amount;
        reply(lost)
    }

    async fn set_waste_collected(&self, id: &UserId, total: f64) -> Result<(), PortError> {
        let (mut state, lost) = self.lock_for(StoreOperation::SetWasteCollected)?;
        state.user_mut(id)?.wastecollected = total;
        reply(lost)
    }

    async fn history_count(&self, id: &UserId) -> Result<usize, PortError> {
        let (state, lost) = self.lock_for(StoreOperation::HistoryCount)?;
        let count = state.history.get(id).map_or(0, Vec::len);
        reply(lost).map(|()| count)
    }

    async fn put_history(
        &self,
        id: &UserId,
        history_id: &HistoryId,
        record: &HistoryRecord,
    ) -> Result<(), PortError> {
        let (mut state, lost) = self.lock_for(StoreOperation::PutHistory)?;
        state.user_mut(id)?;
        let records = state.history.entry(id.clone()).or_default();
        // Same id overwrites, like a document set.
        records.retain(|(existing, _)| existing != history_id);
        records.push((history_id.clone(), record.clone()));
        reply(lost)
    }
}

/// Camera that always returns the same frame, or always fails.
pub struct ScriptedCamera {
    frame: Option<Frame>,
}

impl ScriptedCamera {
    /// Camera returning `bytes` on every capture.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            frame: Some(Frame::new(bytes)),
        }
    }

    /// Camera that cannot be opened.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { frame: None }
    }
}

#[async_trait]
impl CameraPort for ScriptedCamera {
    async fn capture(&self) -> Result<Frame, PortError> {
        self.frame
            .clone()
            .ok_or_else(|| PortError::DeviceUnavailable("scripted camera is offline".to_owned()))
    }
}

/// Detector that replays label lists in rotation, one list per call.
pub struct ScriptedDetector {
    scripts: Vec<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    /// Detector replaying `scripts` in order, wrapping around at the end.
    #[must_use]
    pub fn new<I, L, S>(scripts: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            scripts: scripts
                .into_iter()
                .map(|labels| labels.into_iter().map(Into::into).collect())
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DetectorPort for ScriptedDetector {
    async fn detect(&self, _frame: &Frame) -> Result<Vec<Detection>, PortError> {
        if self.scripts.is_empty() {
            return Ok(Vec::new());
        }
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        let labels = self
            .scripts
            .get(call % self.scripts.len())
            .cloned()
            .unwrap_or_default();

        Ok(labels
            .into_iter()
            .map(|label| Detection {
                label,
                confidence: 1.0,
                bbox: BoundingBox {
                    x1: 0.0,
                    y1: 0.0,
                    x2: 0.0,
                    y2: 0.0,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn user(id: &str, email: Option<&str>, phone: Option<&str>) -> UserRecord {
        UserRecord {
            id: UserId(id.to_owned()),
            name: id.to_owned(),
            email: email.map(str::to_owned),
            phone: phone.map(str::to_owned),
            mobile: None,
            ecopoints: 0.0,
            wastecollected: 0.0,
        }
    }

    #[tokio::test]
    async fn find_user_matches_exactly() {
        let store = InMemoryStore::new().with_user(user("u1", Some("a@b.c"), Some("123")));

        let by_email = store
            .find_user(IdentityField::Email, "a@b.c")
            .await
            .expect("query succeeds");
        assert_eq!(by_email.map(|found| found.id), Some(UserId("u1".to_owned())));

        let wrong_case = store
            .find_user(IdentityField::Email, "A@B.C")
            .await
            .expect("query succeeds");
        assert!(wrong_case.is_none(), "lookups are exact matches");

        let wrong_field = store
            .find_user(IdentityField::Mobile, "123")
            .await
            .expect("query succeeds");
        assert!(wrong_field.is_none(), "phone does not match mobile lookups");
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let store = InMemoryStore::new().with_user(user("u1", None, None));
        let id = UserId("u1".to_owned());
        store.fail_next(StoreOperation::IncrementPoints);

        assert!(store.increment_points(&id, 1.0).await.is_err(), "first call fails");
        store
            .increment_points(&id, 1.0)
            .await
            .expect("second call succeeds");
        assert_eq!(store.snapshot(&id).map(|found| found.ecopoints), Some(1.0));
    }

    #[tokio::test]
    async fn refusals_write_nothing_and_lost_replies_write_anyway() {
        let store = InMemoryStore::new().with_user(user("u1", None, None));
        let id = UserId("u1".to_owned());

        store.fail_next(StoreOperation::IncrementPoints);
        let refused = store.increment_points(&id, 1.0).await.expect_err("refused");
        assert!(refused.left_store_untouched());
        assert_eq!(store.snapshot(&id).map(|found| found.ecopoints), Some(0.0));

        store.fail_after_next(StoreOperation::IncrementPoints);
        let lost = store.increment_points(&id, 1.0).await.expect_err("reply lost");
        assert!(!lost.left_store_untouched());
        assert_eq!(store.snapshot(&id).map(|found| found.ecopoints), Some(1.0));
    }

    #[test]
    fn seeding_survives_a_poisoned_lock() {
        let store = InMemoryStore::new();
        thread::scope(|scope| {
            let holder = scope.spawn(|| {
                let _guard = store.state.lock();
                panic!("poison the store lock");
            });
            assert!(holder.join().is_err(), "holder thread panicked");
        });
        assert!(store.state.is_poisoned());

        store.insert_user(user("u2", Some("x@y.z"), None));
        store.fail_next(StoreOperation::PutHistory);

        let seeded = store.snapshot(&UserId("u2".to_owned()));
        assert_eq!(seeded.and_then(|found| found.email), Some("x@y.z".to_owned()));
        assert_eq!(store.seed().failing.len(), 1, "injection was queued");
    }

    #[tokio::test]
    async fn scripted_detector_rotates() {
        let detector = ScriptedDetector::new([vec!["bottle"], vec!["cup", "can"]]);
        let frame = Frame::new(Vec::new());

        let first = detector.detect(&frame).await.expect("scripted");
        let second = detector.detect(&frame).await.expect("scripted");
        let third = detector.detect(&frame).await.expect("scripted");

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(third.first().map(|found| found.label.as_str()), Some("bottle"));
    }

    #[tokio::test]
    async fn offline_camera_reports_device_unavailable() {
        let camera = ScriptedCamera::unavailable();
        assert!(matches!(
            camera.capture().await,
            Err(PortError::DeviceUnavailable(_))
        ));
    }
}
