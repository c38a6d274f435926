use aic_core::ws_protocol::AnalysisUpdatePayload;
use tokio::sync::watch;
use tracing::debug;

/// Agent id the backend uses when the user, not an agent, is next to speak.
const USER_AGENT_ID: &str = "user";

/// Last-known analysis progress for the active chat.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnalysisSnapshot {
    pub agent_id: Option<String>,
    pub relevant_material_ids: Vec<String>,
    pub next_step: Option<String>,
    pub thinking_process: Option<String>,
    pub active_request_id: Option<String>,
}

impl AnalysisSnapshot {
    pub fn is_analysing(&self) -> bool {
        self.active_request_id.is_some()
    }
}

/// Read-model fed by `AnalysisUpdatedWSMessage` frames and observed by display
/// widgets through [`AnalysisStore::subscribe`].
#[derive(Clone)]
pub struct AnalysisStore {
    tx: watch::Sender<AnalysisSnapshot>,
}

impl Default for AnalysisStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AnalysisSnapshot::default());
        Self { tx }
    }

    /// Replaces the four analysis fields with the update's values. Nothing
    /// from the previous update survives.
    pub fn apply_update(&self, update: AnalysisUpdatePayload) {
        self.tx.send_modify(|snapshot| {
            snapshot.agent_id = update.agent_id;
            snapshot.relevant_material_ids = dedup_preserving_order(update.relevant_material_ids);
            snapshot.next_step = update.next_step;
            snapshot.thinking_process = update.thinking_process;
        });
    }

    pub fn begin_request(&self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        debug!("analysis_begin: {request_id}");
        self.tx.send_replace(AnalysisSnapshot {
            active_request_id: Some(request_id),
            ..AnalysisSnapshot::default()
        });
    }

    /// Clears the in-progress marker if `request_id` is still the active one.
    pub fn finish_request(&self, request_id: &str) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if snapshot.active_request_id.as_deref() == Some(request_id) {
                snapshot.active_request_id = None;
                true
            } else {
                false
            }
        })
    }

    pub fn snapshot(&self) -> AnalysisSnapshot {
        self.tx.borrow().clone()
    }

    pub fn is_analysing(&self) -> bool {
        self.tx.borrow().is_analysing()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisSnapshot> {
        self.tx.subscribe()
    }
}

fn dedup_preserving_order(ids: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// What an analysis indicator should show for a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisView {
    pub agent_id: Option<String>,
    pub material_ids: Vec<String>,
    pub headline: String,
    pub next_step: Option<String>,
}

impl AnalysisView {
    /// `None` while no analysis request is running.
    pub fn from_snapshot(snapshot: &AnalysisSnapshot) -> Option<Self> {
        if !snapshot.is_analysing() {
            return None;
        }
        let agent_visible = snapshot
            .agent_id
            .as_deref()
            .map(|id| id != USER_AGENT_ID)
            .unwrap_or(false);
        let thinking = snapshot.thinking_process.as_deref().unwrap_or("");
        let headline = format!("Analysing ... {thinking}").trim_end().to_string();
        Some(Self {
            agent_id: if agent_visible {
                snapshot.agent_id.clone()
            } else {
                None
            },
            material_ids: if agent_visible {
                snapshot.relevant_material_ids.clone()
            } else {
                Vec::new()
            },
            headline,
            next_step: snapshot
                .next_step
                .clone()
                .filter(|step| !step.trim().is_empty()),
        })
    }
}
