use std::time::{Duration, Instant};

use ecospy_core::{
    config::KioskConfig,
    ledger::LedgerError,
    ports::PortError,
    service::{KioskError, KioskService},
    session::{Session, Stage},
};
use tracing::warn;

use crate::input::Action;

pub(crate) struct App {
    pub service: KioskService,
    pub session: Session,

    pub identity_input: String,

    pub is_loading: bool,
    pub error_message: Option<String>,

    camera_timeout: Duration,
    return_countdown: Duration,
    stage_name: &'static str,
    stage_entered: Instant,
}

impl App {
    pub(crate) fn new(service: KioskService, config: &KioskConfig) -> Self {
        let session = Session::new();
        Self {
            service,
            stage_name: session.stage().name(),
            session,
            identity_input: String::new(),
            is_loading: false,
            error_message: None,
            camera_timeout: Duration::from_secs(config.camera_timeout_secs),
            return_countdown: Duration::from_secs(config.return_countdown_secs),
            stage_entered: Instant::now(),
        }
    }

    pub(crate) fn stage(&self) -> &Stage {
        self.session.stage()
    }

    /// Seconds left before the current screen closes by itself, if it does.
    pub(crate) fn seconds_left(&self, now: Instant) -> Option<u64> {
        let limit = self.stage_limit()?;
        let left = limit.saturating_sub(now.saturating_duration_since(self.stage_entered));
        // Round up so the display reaches 0 only when the screen closes.
        Some(left.as_secs() + u64::from(left.subsec_nanos() > 0))
    }

    /// Close the camera or the result screen once their time is up.
    pub(crate) fn tick(&mut self, now: Instant) {
        self.sync_stage_clock(now);
        let Some(limit) = self.stage_limit() else {
            return;
        };
        if now.saturating_duration_since(self.stage_entered) < limit {
            return;
        }

        match self.session.stage() {
            Stage::Capturing => {
                warn!(secs = limit.as_secs(), "camera view timed out");
                if self.session.abandon_capture().is_ok() {
                    self.error_message = Some("Camera closed after waiting too long".into());
                }
            }
            Stage::PayoutConfirmed(_) => {
                if self.session.finish().is_ok() {
                    self.error_message = None;
                }
            }
            _ => {}
        }
        self.sync_stage_clock(now);
    }

    /// Whether the action talks to the camera, detector, or store.
    pub(crate) fn is_blocking(action: Action) -> bool {
        matches!(
            action,
            Action::Capture | Action::SubmitIdentity | Action::ConfirmPayout
        )
    }

    pub(crate) async fn dispatch(&mut self, action: Action) {
        self.error_message = None;

        match action {
            Action::None | Action::Quit => {}
            Action::StartCapture => {
                if let Err(err) = self.session.start_capture() {
                    self.error_message = Some(err.to_string());
                }
            }
            Action::Capture => self.capture().await,
            Action::CloseCamera => {
                if let Err(err) = self.session.abandon_capture() {
                    self.error_message = Some(err.to_string());
                }
            }
            Action::Proceed => {
                let had_items = !self.session.recyclable().is_empty();
                match self.session.proceed() {
                    Ok(()) if !had_items => {
                        self.error_message = Some("No recyclable items were found".into());
                    }
                    Ok(()) => self.identity_input.clear(),
                    Err(err) => self.error_message = Some(err.to_string()),
                }
            }
            Action::SubmitIdentity => {
                let input = self.identity_input.clone();
                match self.service.identify(&mut self.session, &input).await {
                    Ok(()) => self.identity_input.clear(),
                    Err(err) => self.error_message = Some(err.to_string()),
                }
            }
            Action::RejectIdentity => {
                if let Err(err) = self.session.reject_identity() {
                    self.error_message = Some(err.to_string());
                }
            }
            Action::ConfirmPayout => self.settle().await,
            Action::ReturnHome => {
                if let Err(err) = self.session.finish() {
                    self.error_message = Some(err.to_string());
                }
            }
            Action::Cancel => {
                self.session.cancel();
                self.identity_input.clear();
            }
        }

        self.sync_stage_clock(Instant::now());
    }

    async fn capture(&mut self) {
        match self.service.capture(&mut self.session).await {
            Ok(outcome) if outcome.is_empty() => {
                self.error_message = Some("Nothing detected in that capture".into());
            }
            Ok(_) => {}
            Err(KioskError::Port(err)) => {
                let message = match &err {
                    PortError::DeviceUnavailable(_) => format!("Camera unavailable: {err}"),
                    _ => format!("Capture failed: {err}"),
                };
                // Close the camera view; the session keeps earlier captures.
                if let Err(close_err) = self.session.abandon_capture() {
                    warn!(error = %close_err, "could not close camera view");
                }
                self.error_message = Some(message);
            }
            Err(err) => self.error_message = Some(err.to_string()),
        }
    }

    async fn settle(&mut self) {
        match self.service.settle(&mut self.session).await {
            Ok(_) => {}
            Err(KioskError::Ledger(err @ LedgerError::ReconciliationRequired { .. })) => {
                self.error_message = Some(format!(
                    "Points may be recorded incompletely, please contact staff. {err}"
                ));
            }
            Err(err) => {
                self.error_message = Some(format!("Could not add points: {err}"));
            }
        }
    }

    fn stage_limit(&self) -> Option<Duration> {
        match self.session.stage() {
            Stage::Capturing => Some(self.camera_timeout),
            Stage::PayoutConfirmed(_) => Some(self.return_countdown),
            _ => None,
        }
    }

    fn sync_stage_clock(&mut self, now: Instant) {
        let name = self.session.stage().name();
        if name != self.stage_name {
            self.stage_name = name;
            self.stage_entered = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ecospy_core::{
        backend::KioskBackend,
        ledger::HistoryTemplate,
        memory::{InMemoryStore, ScriptedCamera, ScriptedDetector},
        model::{DetectedLabel, UserId, UserRecord},
    };

    use super::*;

    struct Fixture {
        app: App,
        store: Arc<InMemoryStore>,
        _dir: tempfile::TempDir,
    }

    fn fixture(scripts: Vec<Vec<&str>>, camera: ScriptedCamera) -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            InMemoryStore::new()
                .with_price("bottle", 2.0, 0.05, "Plastic")
                .with_user(UserRecord {
                    id: UserId("asha".to_owned()),
                    name: "Asha".to_owned(),
                    email: Some("asha@example.com".to_owned()),
                    phone: None,
                    mobile: None,
                    ecopoints: 0.0,
                    wastecollected: 0.0,
                }),
        );
        let backend = KioskBackend::in_memory(
            Arc::clone(&store),
            Arc::new(camera),
            Arc::new(ScriptedDetector::new(scripts)),
        );
        let config = KioskConfig {
            allow_list: vec!["bottle".to_owned()],
            capture_dir: dir.path().to_path_buf(),
            camera_timeout_secs: 30,
            return_countdown_secs: 10,
            history: HistoryTemplate::default(),
        };
        let service = KioskService::new(backend, &config).expect("service");
        Fixture {
            app: App::new(service, &config),
            store,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn walks_through_a_full_session() {
        let mut fixture = fixture(vec![vec!["bottle"]], ScriptedCamera::new(vec![1]));
        let app = &mut fixture.app;

        app.dispatch(Action::StartCapture).await;
        app.dispatch(Action::Capture).await;
        assert_eq!(app.stage(), &Stage::Reviewing);

        app.dispatch(Action::Proceed).await;
        app.identity_input.push_str("asha@example.com");
        app.dispatch(Action::SubmitIdentity).await;
        assert!(app.session.pending_payout().is_some(), "{:?}", app.error_message);

        app.dispatch(Action::ConfirmPayout).await;
        assert!(matches!(app.stage(), Stage::PayoutConfirmed(_)));
        let user = fixture
            .store
            .snapshot(&UserId("asha".to_owned()))
            .expect("user");
        assert!((user.ecopoints - 0.1).abs() < 1e-9, "credited");

        fixture.app.dispatch(Action::ReturnHome).await;
        assert_eq!(fixture.app.stage(), &Stage::Idle);
    }

    #[tokio::test]
    async fn review_keeps_labels_from_every_capture() {
        let mut fixture = fixture(
            vec![vec!["bottle"], vec!["person", "bottle"]],
            ScriptedCamera::new(vec![1]),
        );
        let app = &mut fixture.app;
        app.dispatch(Action::StartCapture).await;
        app.dispatch(Action::Capture).await;
        app.dispatch(Action::StartCapture).await;
        app.dispatch(Action::Capture).await;

        assert_eq!(app.stage(), &Stage::Reviewing);
        let labels = app
            .session
            .detected()
            .iter()
            .map(DetectedLabel::as_str)
            .collect::<Vec<_>>();
        assert_eq!(labels, ["bottle", "person", "bottle"]);
        assert_eq!(app.session.recyclable().total_items(), 2);
    }

    #[tokio::test]
    async fn unknown_user_stays_on_identity_entry() {
        let mut fixture = fixture(vec![vec!["bottle"]], ScriptedCamera::new(vec![1]));
        let app = &mut fixture.app;
        app.dispatch(Action::StartCapture).await;
        app.dispatch(Action::Capture).await;
        app.dispatch(Action::Proceed).await;

        app.identity_input.push_str("ghost@example.com");
        app.dispatch(Action::SubmitIdentity).await;

        assert_eq!(app.stage(), &Stage::IdentityEntry);
        assert!(app.error_message.is_some(), "user not found is reported");
    }

    #[tokio::test]
    async fn camera_failure_closes_the_camera_view() {
        let mut fixture = fixture(vec![vec!["bottle"]], ScriptedCamera::unavailable());
        let app = &mut fixture.app;
        app.dispatch(Action::StartCapture).await;

        app.dispatch(Action::Capture).await;

        assert_eq!(app.stage(), &Stage::Idle);
        assert!(
            app.error_message
                .as_deref()
                .is_some_and(|msg| msg.starts_with("Camera unavailable")),
            "{:?}",
            app.error_message
        );
    }

    #[tokio::test]
    async fn nothing_recyclable_returns_home() {
        let mut fixture = fixture(vec![vec!["person"]], ScriptedCamera::new(vec![1]));
        let app = &mut fixture.app;
        app.dispatch(Action::StartCapture).await;
        app.dispatch(Action::Capture).await;

        app.dispatch(Action::Proceed).await;

        assert_eq!(app.stage(), &Stage::Idle);
        assert!(app.error_message.is_some(), "operator is told why");
    }

    #[tokio::test]
    async fn camera_view_times_out() {
        let mut fixture = fixture(Vec::new(), ScriptedCamera::new(vec![1]));
        let app = &mut fixture.app;
        app.dispatch(Action::StartCapture).await;
        let opened = Instant::now();

        app.tick(opened);
        assert_eq!(app.stage(), &Stage::Capturing);
        assert_eq!(app.seconds_left(opened + Duration::from_secs(5)), Some(25));

        app.tick(opened + Duration::from_secs(31));
        assert_eq!(app.stage(), &Stage::Idle);
        assert_eq!(app.seconds_left(opened + Duration::from_secs(31)), None);
    }

    #[tokio::test]
    async fn result_screen_returns_home_after_countdown() {
        let mut fixture = fixture(vec![vec!["bottle"]], ScriptedCamera::new(vec![1]));
        let app = &mut fixture.app;
        app.dispatch(Action::StartCapture).await;
        app.dispatch(Action::Capture).await;
        app.dispatch(Action::Proceed).await;
        app.identity_input.push_str("asha@example.com");
        app.dispatch(Action::SubmitIdentity).await;
        app.dispatch(Action::ConfirmPayout).await;
        let shown = Instant::now();

        app.tick(shown + Duration::from_secs(9));
        assert!(matches!(app.stage(), Stage::PayoutConfirmed(_)));

        app.tick(shown + Duration::from_secs(11));
        assert_eq!(app.stage(), &Stage::Idle);
    }
}
