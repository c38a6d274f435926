use crate::api::ApiError;
use crate::notify::{Notification, Notifier};
use crate::project::ProjectState;
use aic_core::settings::{Settings, SettingsUpdate};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[async_trait::async_trait]
pub trait SettingsApi: Send + Sync {
    async fn get_settings(&self) -> Result<Settings, ApiError>;

    async fn save_settings(&self, update: &SettingsUpdate) -> Result<(), ApiError>;

    /// True when the backend accepts `key` for model calls.
    async fn check_key(&self, key: &str) -> Result<bool, ApiError>;

    async fn close_project(&self) -> Result<(), ApiError>;
}

/// Client-side view of the user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsSnapshot {
    pub openai_api_key: Option<String>,
    pub api_key_valid: bool,
    pub always_execute_code: bool,
}

/// Settings and credential checks. A rejected key ends the current project
/// session but leaves the client running.
pub struct SettingsSession {
    api: Arc<dyn SettingsApi>,
    project: ProjectState,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<SettingsSnapshot>,
}

impl SettingsSession {
    pub fn new(
        api: Arc<dyn SettingsApi>,
        project: ProjectState,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state, _rx) = watch::channel(SettingsSnapshot::default());
        Self {
            api,
            project,
            notifier,
            state,
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.state.subscribe()
    }

    /// Loads settings from the backend, then validates the stored key.
    pub async fn init_settings(&self) -> Result<SettingsSnapshot, ApiError> {
        let settings = self.api.get_settings().await?;
        let key = settings.openai_api_key.clone().unwrap_or_default();
        let valid = self.validate_api_key(&key).await?;
        let snapshot = SettingsSnapshot {
            openai_api_key: settings.openai_api_key,
            api_key_valid: valid,
            always_execute_code: settings.code_autorun,
        };
        self.state.send_replace(snapshot.clone());
        Ok(snapshot)
    }

    /// Persists `key` to the global settings. Callers validate first, so a
    /// stored key counts as valid.
    pub async fn save_api_key(&self, key: &str) -> Result<(), ApiError> {
        self.api
            .save_settings(&SettingsUpdate::global_api_key(key))
            .await?;
        self.state.send_modify(|snapshot| {
            snapshot.openai_api_key = Some(key.to_string());
            snapshot.api_key_valid = true;
        });
        info!("api_key_saved");
        Ok(())
    }

    pub async fn set_auto_code_execution(&self, enabled: bool) -> Result<(), ApiError> {
        self.api
            .save_settings(&SettingsUpdate::global_code_autorun(enabled))
            .await?;
        self.state
            .send_modify(|snapshot| snapshot.always_execute_code = enabled);
        Ok(())
    }

    pub async fn validate_api_key(&self, key: &str) -> Result<bool, ApiError> {
        if key.trim().is_empty() {
            return Ok(false);
        }
        let valid = self.api.check_key(key).await?;
        if valid {
            return Ok(true);
        }

        warn!("api_key_rejected");
        if self.project.is_open() {
            if let Err(err) = self.api.close_project().await {
                warn!("close_project_error: {err}");
            }
            self.project.close_project();
            info!("project_closed: invalid credentials");
        }
        self.notifier
            .notify(Notification::error("Invalid OpenAI API key."));
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationLevel;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct ScriptedSettings {
        valid: bool,
        stored: Mutex<Settings>,
        writes: Mutex<Vec<SettingsUpdate>>,
        checks: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl SettingsApi for ScriptedSettings {
        async fn get_settings(&self) -> Result<Settings, ApiError> {
            Ok(self.stored.lock().expect("lock").clone())
        }

        async fn save_settings(&self, update: &SettingsUpdate) -> Result<(), ApiError> {
            self.writes.lock().expect("lock").push(update.clone());
            Ok(())
        }

        async fn check_key(&self, _key: &str) -> Result<bool, ApiError> {
            self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(self.valid)
        }

        async fn close_project(&self) -> Result<(), ApiError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<Notification>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.seen.lock().expect("lock").push(notification);
        }
    }

    struct Fixture {
        session: SettingsSession,
        api: Arc<ScriptedSettings>,
        project: ProjectState,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture(valid: bool, stored: Settings) -> Fixture {
        let api = Arc::new(ScriptedSettings {
            valid,
            stored: Mutex::new(stored),
            writes: Mutex::new(Vec::new()),
            checks: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        });
        let project = ProjectState::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let session = SettingsSession::new(api.clone(), project.clone(), notifier.clone());
        Fixture {
            session,
            api,
            project,
            notifier,
        }
    }

    #[tokio::test]
    async fn empty_key_is_invalid_without_backend_call() {
        let f = fixture(true, Settings::default());
        assert!(!f.session.validate_api_key("").await.expect("validate"));
        assert_eq!(f.api.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rejected_key_closes_open_project() {
        let f = fixture(false, Settings::default());
        f.project.set_project("demo", "/tmp/demo");

        assert!(!f.session.validate_api_key("sk-bad").await.expect("validate"));
        assert!(!f.project.is_open());
        assert_eq!(f.api.closes.load(Ordering::SeqCst), 1);
        let seen = f.notifier.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].level, NotificationLevel::Error);
    }

    #[tokio::test]
    async fn accepted_key_keeps_project() {
        let f = fixture(true, Settings::default());
        f.project.set_project("demo", "/tmp/demo");
        assert!(f.session.validate_api_key("sk-good").await.expect("validate"));
        assert!(f.project.is_open());
        assert_eq!(f.api.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn init_loads_settings_and_validates_stored_key() {
        let f = fixture(
            true,
            Settings {
                code_autorun: true,
                openai_api_key: Some("sk-stored".to_string()),
            },
        );
        let snapshot = f.session.init_settings().await.expect("init");
        assert_eq!(snapshot.openai_api_key.as_deref(), Some("sk-stored"));
        assert!(snapshot.api_key_valid);
        assert!(snapshot.always_execute_code);
        assert_eq!(f.api.checks.load(Ordering::SeqCst), 1);
        assert_eq!(f.session.snapshot(), snapshot);
    }

    #[tokio::test]
    async fn init_without_key_is_invalid_and_skips_check() {
        let f = fixture(true, Settings::default());
        let snapshot = f.session.init_settings().await.expect("init");
        assert!(!snapshot.api_key_valid);
        assert!(!snapshot.always_execute_code);
        assert_eq!(f.api.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn saved_key_is_written_globally_and_marked_valid() {
        let f = fixture(false, Settings::default());
        f.session.save_api_key("sk-new").await.expect("save key");

        let writes = f.api.writes.lock().expect("lock").clone();
        assert_eq!(writes, vec![SettingsUpdate::global_api_key("sk-new")]);
        let snapshot = f.session.snapshot();
        assert_eq!(snapshot.openai_api_key.as_deref(), Some("sk-new"));
        assert!(snapshot.api_key_valid);
        assert_eq!(f.api.checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_code_execution_is_persisted() {
        let f = fixture(true, Settings::default());
        let mut rx = f.session.subscribe();
        f.session
            .set_auto_code_execution(true)
            .await
            .expect("set autorun");

        assert!(rx.has_changed().expect("sender alive"));
        assert!(rx.borrow_and_update().always_execute_code);
        let writes = f.api.writes.lock().expect("lock").clone();
        assert_eq!(writes, vec![SettingsUpdate::global_code_autorun(true)]);
    }
}
