use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub path: String,
}

/// Process-wide "which project is open" state, shared by handle.
#[derive(Clone)]
pub struct ProjectState {
    tx: watch::Sender<Option<ProjectInfo>>,
}

impl Default for ProjectState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn set_project(&self, name: impl Into<String>, path: impl Into<String>) {
        let project = ProjectInfo {
            name: name.into(),
            path: path.into(),
        };
        info!("project_opened: {} ({})", project.name, project.path);
        self.tx.send_replace(Some(project));
    }

    pub fn close_project(&self) {
        if self.tx.send_replace(None).is_some() {
            info!("project_closed");
        }
    }

    pub fn current(&self) -> Option<ProjectInfo> {
        self.tx.borrow().clone()
    }

    pub fn is_open(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ProjectInfo>> {
        self.tx.subscribe()
    }
}
