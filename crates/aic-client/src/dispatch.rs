use crate::analysis::AnalysisStore;
use crate::notify::{Notification, Notifier};
use crate::project::ProjectState;
use aic_core::ws_protocol::{decode_incoming, IncomingMessage};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Routes decoded backend messages to the state holders that own them.
#[derive(Clone)]
pub struct Dispatcher {
    analysis: AnalysisStore,
    project: ProjectState,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(
        analysis: AnalysisStore,
        project: ProjectState,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            analysis,
            project,
            notifier,
        }
    }

    pub fn analysis(&self) -> &AnalysisStore {
        &self.analysis
    }

    pub fn project(&self) -> &ProjectState {
        &self.project
    }

    /// Decodes and applies one text frame. Malformed frames are logged and
    /// dropped; the return value is the handled kind, if any.
    pub fn dispatch_frame(&self, frame: &str) -> Option<&'static str> {
        match decode_incoming(frame) {
            Ok(message) => Some(self.dispatch(message)),
            Err(err) => {
                warn!("ws_decode_error: {err}");
                None
            }
        }
    }

    pub fn dispatch(&self, message: IncomingMessage) -> &'static str {
        let kind = message.kind_label();
        match message {
            IncomingMessage::Error { error: text } => {
                error!("backend_error: {text}");
                self.notifier.notify(Notification::error(text));
            }
            IncomingMessage::Notification { title, message } => {
                info!("backend_notification: {title}");
                self.notifier.notify(Notification::info(title, message));
            }
            IncomingMessage::DebugEcho { message, object } => {
                debug!("backend_debug: {message} {object}");
            }
            IncomingMessage::ProjectOpened { name, path } => {
                self.project.set_project(name, path);
            }
            IncomingMessage::AnalysisUpdate(update) => {
                self.analysis.apply_update(update);
            }
            IncomingMessage::Unknown => {
                debug!("ws_message_ignored");
            }
        }
        kind
    }
}
