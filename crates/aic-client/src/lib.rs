pub mod analysis;
pub mod api;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod editor;
pub mod local_flag;
pub mod notify;
pub mod project;
pub mod settings;

pub use analysis::{AnalysisSnapshot, AnalysisStore, AnalysisView};
pub use api::{ApiError, AssetApi};
pub use config::{ConnectionConfig, EditorConfig};
pub use connection::{ConnectionManager, ConnectionState, SessionRef};
pub use dispatch::Dispatcher;
pub use editor::{EditorError, EditorRoute, EditorSession, SaveAction, SaveReport, SubmitLabel};
pub use local_flag::{LocalFlagError, LocalFlagStore};
pub use notify::{ChannelNotifier, LogNotifier, Notification, NotificationLevel, Notifier};
pub use project::{ProjectInfo, ProjectState};
pub use settings::{SettingsApi, SettingsSession, SettingsSnapshot};
