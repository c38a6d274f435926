//! Draft/snapshot reconciliation for the asset editor.
//!
//! An [`EditorSession`] owns the asset being edited (the draft) and the value
//! last confirmed persisted (the snapshot). Dirtiness, the save action and the
//! submit label are always derived from those two values, never cached.

mod guard;
mod preview;

pub use guard::{NavigationDecision, NavigationGuard};

use crate::api::{ApiError, AssetApi};
use crate::config::EditorConfig;
use crate::local_flag::{LocalFlagStore, ASSET_CHANGED_FLAG};
use crate::notify::{Notification, Notifier};
use aic_core::naming::is_new_asset_id;
use aic_core::{
    convert_name_to_id, preview_display_text, Asset, AssetKind, AssetOrigin, MaterialContentType,
    RenderedMaterial,
};
use preview::{PreviewDebouncer, PreviewKey};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("no asset loaded")]
    NoDraft,
    #[error("a save is already in progress")]
    SaveInFlight,
    #[error("asset needs both a name and an id before saving")]
    NotSaveEligible,
    #[error("expected a {expected} but the backend returned a {found}")]
    KindMismatch { expected: AssetKind, found: AssetKind },
    #[error("asset does not override a system default")]
    NothingToRevert,
    #[error("could not confirm whether a system default exists for this asset")]
    OverrideUnresolved,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Where the editor was opened: `/agents/<id>?copy=<copy_from>&type=<hint>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorRoute {
    pub kind: AssetKind,
    pub id: String,
    pub copy_from: Option<String>,
    pub type_hint: Option<String>,
}

impl EditorRoute {
    pub fn existing(kind: AssetKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
            copy_from: None,
            type_hint: None,
        }
    }

    pub fn new_asset(kind: AssetKind, type_hint: Option<&str>) -> Self {
        Self {
            kind,
            id: aic_core::NEW_ASSET_ID.to_string(),
            copy_from: None,
            type_hint: type_hint.map(str::to_string),
        }
    }

    pub fn copy_of(kind: AssetKind, source_id: impl Into<String>) -> Self {
        Self {
            kind,
            id: aic_core::NEW_ASSET_ID.to_string(),
            copy_from: Some(source_id.into()),
            type_hint: None,
        }
    }
}

/// What `save()` would do right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    Create,
    RenameAndSave,
    SaveChanges,
    NoOp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitLabel {
    Overwrite,
    Create,
    RenameAndSave,
    SaveChanges,
    Saved,
}

impl SubmitLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmitLabel::Overwrite => "Overwrite",
            SubmitLabel::Create => "Create",
            SubmitLabel::RenameAndSave => "Rename and Save Changes",
            SubmitLabel::SaveChanges => "Save Changes",
            SubmitLabel::Saved => "Saved",
        }
    }
}

impl fmt::Display for SubmitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    pub action: SaveAction,
    /// Canonical path to move to after an identity-changing save. Only set
    /// once the draft already reads clean.
    pub navigate_to: Option<String>,
}

#[derive(Default)]
struct EditorState {
    route: Option<EditorRoute>,
    /// Bumped when a load starts; a load only commits if still the latest.
    load_seq: u64,
    /// Bumped when a load commits; async results from older drafts are dropped.
    generation: u64,
    revision: u64,
    draft: Option<Asset>,
    snapshot: Option<Asset>,
    /// Value the draft was loaded as; the dirty reference while no snapshot
    /// exists.
    baseline: Option<Asset>,
    has_builtin_default: bool,
    saving: bool,
    preview: Option<RenderedMaterial>,
    pending_redirect: Option<String>,
    guard: NavigationGuard,
}

impl EditorState {
    fn is_dirty(&self) -> bool {
        match (&self.draft, &self.snapshot, &self.baseline) {
            (None, _, _) => false,
            (Some(draft), Some(snapshot), _) => draft != snapshot,
            (Some(draft), None, Some(baseline)) => draft != baseline,
            (Some(_), None, None) => true,
        }
    }

    /// A system default was edited and has not yet been turned into a
    /// project-level asset. Saving it as-is would overwrite the shared default.
    fn needs_override_check(&self) -> bool {
        let builtin = self
            .draft
            .as_ref()
            .map(|draft| draft.origin == AssetOrigin::Builtin)
            .unwrap_or(false);
        builtin && self.is_dirty()
    }

    fn save_action(&self) -> SaveAction {
        if self.needs_override_check() {
            return SaveAction::Create;
        }
        match (&self.snapshot, &self.draft) {
            (None, _) => SaveAction::Create,
            (Some(snapshot), Some(draft)) if snapshot.id != draft.id => SaveAction::RenameAndSave,
            (Some(_), Some(_)) if self.is_dirty() => SaveAction::SaveChanges,
            _ => SaveAction::NoOp,
        }
    }

    fn submit_label(&self) -> SubmitLabel {
        if self.needs_override_check() {
            return SubmitLabel::Overwrite;
        }
        match (&self.snapshot, &self.draft) {
            (None, _) if self.has_builtin_default => SubmitLabel::Overwrite,
            (None, _) => SubmitLabel::Create,
            (Some(snapshot), Some(draft)) if snapshot.id != draft.id => SubmitLabel::RenameAndSave,
            _ if self.is_dirty() => SubmitLabel::SaveChanges,
            _ => SubmitLabel::Saved,
        }
    }

    fn is_new_route(&self) -> bool {
        self.route
            .as_ref()
            .map(|route| route.copy_from.is_none() && is_new_asset_id(&route.id))
            .unwrap_or(false)
    }

    fn submit_enabled(&self) -> bool {
        if self.saving {
            return false;
        }
        let Some(draft) = self.draft.as_ref() else {
            return false;
        };
        if !draft.is_save_eligible() {
            return false;
        }
        self.is_new_route() || self.snapshot.is_none() || self.is_dirty()
    }

    /// Takes the post-save redirect once the draft reads clean.
    fn release_redirect(&mut self) -> Option<String> {
        if self.is_dirty() {
            return None;
        }
        let target = self.pending_redirect.take()?;
        match self.guard.request(target, false) {
            NavigationDecision::Proceed(target) => Some(target),
            NavigationDecision::Blocked => None,
        }
    }
}

struct EditorInner {
    api: Arc<dyn AssetApi>,
    notifier: Arc<dyn Notifier>,
    config: EditorConfig,
    flags: Option<LocalFlagStore>,
    state: Mutex<EditorState>,
    preview: PreviewDebouncer,
}

impl EditorInner {
    fn state(&self) -> MutexGuard<'_, EditorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle to one mounted editor. Clones share the same draft; dropping the
/// last handle cancels any pending preview.
#[derive(Clone)]
pub struct EditorSession {
    inner: Arc<EditorInner>,
}

/// Clears the in-flight marker even if the save future is dropped midway.
struct SavingGuard<'a> {
    inner: &'a EditorInner,
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.inner.state().saving = false;
    }
}

impl EditorSession {
    pub fn new(api: Arc<dyn AssetApi>, notifier: Arc<dyn Notifier>, config: EditorConfig) -> Self {
        Self::build(api, notifier, config, None)
    }

    /// Like [`EditorSession::new`], mirroring the dirty flag into `flags`.
    pub fn with_local_flags(
        api: Arc<dyn AssetApi>,
        notifier: Arc<dyn Notifier>,
        config: EditorConfig,
        flags: LocalFlagStore,
    ) -> Self {
        Self::build(api, notifier, config, Some(flags))
    }

    fn build(
        api: Arc<dyn AssetApi>,
        notifier: Arc<dyn Notifier>,
        config: EditorConfig,
        flags: Option<LocalFlagStore>,
    ) -> Self {
        Self {
            inner: Arc::new(EditorInner {
                api,
                notifier,
                config,
                flags,
                state: Mutex::new(EditorState::default()),
                preview: PreviewDebouncer::default(),
            }),
        }
    }

    pub fn draft(&self) -> Option<Asset> {
        self.inner.state().draft.clone()
    }

    pub fn snapshot(&self) -> Option<Asset> {
        self.inner.state().snapshot.clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state().is_dirty()
    }

    pub fn save_action(&self) -> SaveAction {
        self.inner.state().save_action()
    }

    pub fn submit_label(&self) -> SubmitLabel {
        self.inner.state().submit_label()
    }

    pub fn submit_enabled(&self) -> bool {
        self.inner.state().submit_enabled()
    }

    pub fn is_saving(&self) -> bool {
        self.inner.state().saving
    }

    pub fn has_builtin_default(&self) -> bool {
        self.inner.state().has_builtin_default
    }

    pub fn preview(&self) -> Option<RenderedMaterial> {
        self.inner.state().preview.clone()
    }

    pub fn preview_text(&self) -> String {
        preview_display_text(self.inner.state().preview.as_ref())
    }

    /// Banner explaining how the draft relates to a system default, if any.
    pub fn override_banner(&self) -> Option<String> {
        let state = self.inner.state();
        let draft = state.draft.as_ref()?;
        if !state.has_builtin_default {
            return None;
        }
        let kind = draft.kind();
        match draft.origin {
            AssetOrigin::Builtin => Some(format!(
                "This is a system {kind}, start editing to overwrite it."
            )),
            AssetOrigin::Project => {
                let verb = if state.snapshot.is_some() {
                    "is overwriting"
                } else {
                    "will overwrite"
                };
                Some(format!("This {kind} {verb} a default system {kind}."))
            }
        }
    }

    /// Fetches (or copies) the asset for `route` and makes it the draft.
    ///
    /// A load superseded by a newer one before it resolves is discarded. A
    /// failed load leaves the current draft, snapshot and route untouched.
    pub async fn load_initial(&self, route: EditorRoute) -> Result<(), EditorError> {
        let load = {
            let mut state = self.inner.state();
            state.load_seq += 1;
            state.load_seq
        };

        let (asset, snapshot) = match route.copy_from.as_deref() {
            Some(source_id) => {
                let mut asset = self.inner.api.fetch(route.kind, source_id, None).await?;
                asset.name.push_str(" Copy");
                asset.id = convert_name_to_id(&asset.name);
                asset.origin = AssetOrigin::Project;
                asset.overrides_builtin = false;
                (asset, None)
            }
            None => {
                let mut asset = self
                    .inner
                    .api
                    .fetch(route.kind, &route.id, route.type_hint.as_deref())
                    .await?;
                if is_new_asset_id(&route.id) {
                    apply_type_hint(&mut asset, route.type_hint.as_deref());
                    (asset, None)
                } else {
                    let snapshot = asset.clone();
                    (asset, Some(snapshot))
                }
            }
        };
        if asset.kind() != route.kind {
            return Err(EditorError::KindMismatch {
                expected: route.kind,
                found: asset.kind(),
            });
        }

        {
            let mut state = self.inner.state();
            if state.load_seq != load {
                debug!("editor_load_stale: {}", route.id);
                return Ok(());
            }
            state.generation += 1;
            state.route = Some(route);
            state.has_builtin_default = asset.shadows_builtin();
            state.baseline = Some(asset.clone());
            state.draft = Some(asset);
            state.snapshot = snapshot;
            state.preview = None;
            state.pending_redirect = None;
            state.guard = NavigationGuard::default();
        }
        self.inner.preview.cancel();
        self.after_mutation();
        Ok(())
    }

    /// Applies `mutate` to the draft. While the result is a dirty system
    /// default, [`resolve_override_status`](Self::resolve_override_status)
    /// runs; once it succeeds the draft is project-level and later edits skip
    /// it. A failed check is retried on the next edit or save.
    pub async fn edit<F>(&self, mutate: F) -> Result<(), EditorError>
    where
        F: FnOnce(&mut Asset),
    {
        let check_override = {
            let mut state = self.inner.state();
            let draft = state.draft.as_mut().ok_or(EditorError::NoDraft)?;
            mutate(draft);
            state.needs_override_check()
        };
        self.after_mutation();
        if check_override {
            self.resolve_override_status().await?;
        }
        Ok(())
    }

    /// Renames the draft; its id follows the name.
    pub async fn rename(&self, new_name: &str) -> Result<(), EditorError> {
        let new_name = new_name.to_string();
        self.edit(move |draft| {
            draft.id = convert_name_to_id(&new_name);
            draft.name = new_name;
        })
        .await
    }

    /// Asks the backend whether a system default exists under the draft's id,
    /// then turns the draft into a project-level asset (an override when the
    /// default exists) and drops the snapshot so the next save creates the
    /// override instead of mutating the shared default.
    pub async fn resolve_override_status(&self) -> Result<bool, EditorError> {
        let (generation, kind, id) = {
            let state = self.inner.state();
            let draft = state.draft.as_ref().ok_or(EditorError::NoDraft)?;
            (state.generation, draft.kind(), draft.id.clone())
        };
        let exists = self
            .inner
            .api
            .exists_as(kind, &id, AssetOrigin::Builtin)
            .await?;

        {
            let mut state = self.inner.state();
            if state.generation != generation {
                return Ok(false);
            }
            let Some(draft) = state.draft.as_mut() else {
                return Ok(false);
            };
            if draft.id != id {
                return Ok(false);
            }
            draft.origin = AssetOrigin::Project;
            draft.overrides_builtin = exists;
            state.has_builtin_default = exists;
            state.snapshot = None;
        }
        info!("editor_override_resolved: {kind} {id} builtin_exists={exists}");
        self.after_mutation();
        Ok(exists)
    }

    /// Persists the draft using whichever [`SaveAction`] currently applies.
    ///
    /// On failure nothing is adopted: draft and snapshot stay as they were and
    /// the error is both notified and returned.
    pub async fn save(&self) -> Result<SaveReport, EditorError> {
        let needs_check = {
            let state = self.inner.state();
            if state.saving {
                return Err(EditorError::SaveInFlight);
            }
            state.needs_override_check()
        };
        if needs_check {
            if let Err(err) = self.resolve_override_status().await {
                return Err(self.report_save_error(err));
            }
        }

        let (action, draft, previous_id, generation) = {
            let mut state = self.inner.state();
            if state.saving {
                return Err(EditorError::SaveInFlight);
            }
            let draft = state.draft.clone().ok_or(EditorError::NoDraft)?;
            if !draft.is_save_eligible() {
                return Err(EditorError::NotSaveEligible);
            }
            if state.needs_override_check() {
                return Err(EditorError::OverrideUnresolved);
            }
            state.saving = true;
            let previous_id = state.snapshot.as_ref().map(|snapshot| snapshot.id.clone());
            (state.save_action(), draft, previous_id, state.generation)
        };
        let _saving = SavingGuard { inner: &self.inner };

        self.execute_save(action, draft, previous_id, generation)
            .await
            .map_err(|err| self.report_save_error(err))
    }

    fn report_save_error(&self, err: EditorError) -> EditorError {
        warn!("editor_save_error: {err}");
        self.inner
            .notifier
            .notify(Notification::error(format!("Save failed: {err}")));
        err
    }

    async fn execute_save(
        &self,
        action: SaveAction,
        draft: Asset,
        previous_id: Option<String>,
        generation: u64,
    ) -> Result<SaveReport, EditorError> {
        let api = &self.inner.api;
        let kind = draft.kind();

        match action {
            SaveAction::Create => {
                api.create_new(kind, &draft.id, &draft).await?;
                self.refresh_builtin_default(kind, &draft.id, generation).await;
                self.inner
                    .notifier
                    .notify(Notification::success("Saved", "saved"));
                Ok(self.adopt_saved(action, draft, generation))
            }
            SaveAction::RenameAndSave => {
                let old_id = previous_id.unwrap_or_default();
                api.rename(kind, &old_id, &draft).await?;
                self.inner
                    .notifier
                    .notify(Notification::success("Renamed", "renamed"));
                Ok(self.adopt_saved(action, draft, generation))
            }
            SaveAction::SaveChanges => {
                api.update(kind, &draft).await?;
                self.inner
                    .notifier
                    .notify(Notification::success("Saved", "saved"));
                self.refresh_builtin_default(kind, &draft.id, generation).await;
                let fresh = match api.fetch(kind, &draft.id, None).await {
                    Ok(fresh) => fresh,
                    Err(err) => {
                        warn!("editor_refetch_error: {err}");
                        draft
                    }
                };
                {
                    let mut state = self.inner.state();
                    if state.generation == generation {
                        state.baseline = Some(fresh.clone());
                        state.snapshot = Some(fresh.clone());
                        state.draft = Some(fresh);
                    }
                }
                self.after_mutation();
                Ok(SaveReport {
                    action,
                    navigate_to: None,
                })
            }
            SaveAction::NoOp => {
                self.refresh_builtin_default(kind, &draft.id, generation).await;
                Ok(SaveReport {
                    action,
                    navigate_to: None,
                })
            }
        }
    }

    /// Adopts `saved` as the snapshot after a create or rename and queues the
    /// redirect to its canonical path.
    fn adopt_saved(&self, action: SaveAction, saved: Asset, generation: u64) -> SaveReport {
        let navigate_to = {
            let mut state = self.inner.state();
            if state.generation != generation {
                None
            } else {
                state.pending_redirect = Some(saved.canonical_path());
                if let Some(route) = state.route.as_mut() {
                    route.id = saved.id.clone();
                    route.copy_from = None;
                    route.type_hint = None;
                }
                state.baseline = Some(saved.clone());
                state.snapshot = Some(saved);
                state.release_redirect()
            }
        };
        self.mirror_dirty_flag();
        SaveReport {
            action,
            navigate_to,
        }
    }

    /// Side-channel refresh of "a system default exists under this id".
    /// Failures are logged and do not fail the save.
    async fn refresh_builtin_default(&self, kind: AssetKind, id: &str, generation: u64) {
        match self
            .inner
            .api
            .exists_as(kind, id, AssetOrigin::Builtin)
            .await
        {
            Ok(exists) => {
                let mut state = self.inner.state();
                if state.generation == generation {
                    state.has_builtin_default = exists;
                }
            }
            Err(err) => warn!("editor_default_status_error: {err}"),
        }
    }

    /// Redirect left over from a save that finished while the draft was still
    /// dirty; released once it reads clean.
    pub fn take_pending_redirect(&self) -> Option<String> {
        self.inner.state().release_redirect()
    }

    /// Throws away unsaved edits: back to the snapshot, or a fresh load when
    /// nothing was ever saved.
    pub async fn discard(&self) -> Result<(), EditorError> {
        let (snapshot, route) = {
            let state = self.inner.state();
            if state.draft.is_none() {
                return Ok(());
            }
            (state.snapshot.clone(), state.route.clone())
        };
        match (snapshot, route) {
            (Some(snapshot), _) => {
                {
                    let mut state = self.inner.state();
                    state.draft = Some(snapshot);
                }
                self.after_mutation();
                Ok(())
            }
            (None, Some(route)) => self.load_initial(route).await,
            (None, None) => Ok(()),
        }
    }

    /// Dirty drafts are discarded; a clean project override is deleted so the
    /// system default shows through again.
    pub async fn revert_override(&self) -> Result<(), EditorError> {
        if self.is_dirty() {
            return self.discard().await;
        }
        let draft = self.draft().ok_or(EditorError::NoDraft)?;
        if draft.origin != AssetOrigin::Project || !draft.overrides_builtin {
            return Err(EditorError::NothingToRevert);
        }
        let kind = draft.kind();
        self.inner.api.delete(kind, &draft.id).await?;
        self.inner
            .notifier
            .notify(Notification::success("Reverted", "reverted to the system default"));
        self.load_initial(EditorRoute::existing(kind, draft.id)).await
    }

    /// Intercepts leaving the editor while the draft is dirty.
    pub fn request_navigation(&self, target: &str) -> NavigationDecision {
        let mut state = self.inner.state();
        let dirty = state.is_dirty();
        state.guard.request(target, dirty)
    }

    pub fn blocked_navigation(&self) -> Option<String> {
        self.inner.state().guard.pending().map(str::to_string)
    }

    /// Discards the draft and releases the blocked navigation target.
    pub async fn confirm_navigation(&self) -> Result<Option<String>, EditorError> {
        let target = self.inner.state().guard.take_pending();
        let Some(target) = target else {
            return Ok(None);
        };
        if let Err(err) = self.discard().await {
            self.inner.state().guard.request(target, true);
            return Err(err);
        }
        Ok(Some(target))
    }

    pub fn cancel_navigation(&self) -> bool {
        self.inner.state().guard.cancel()
    }

    /// Called when the editor view goes away.
    pub fn unmount(&self) {
        self.inner.preview.cancel();
        let mut state = self.inner.state();
        state.load_seq += 1;
        state.generation += 1;
        state.draft = None;
        state.snapshot = None;
        state.baseline = None;
        state.preview = None;
        drop(state);
        self.mirror_dirty_flag();
    }

    fn after_mutation(&self) {
        self.mirror_dirty_flag();
        self.schedule_preview();
    }

    fn mirror_dirty_flag(&self) {
        let Some(flags) = self.inner.flags.as_ref() else {
            return;
        };
        let dirty = self.is_dirty();
        if let Err(err) = flags.set(ASSET_CHANGED_FLAG, dirty) {
            warn!("local_flag_write_error: {err}");
        }
    }

    fn schedule_preview(&self) {
        let (key, material) = {
            let mut state = self.inner.state();
            state.revision += 1;
            let Some(draft) = state.draft.as_ref() else {
                return;
            };
            if draft.kind() != AssetKind::Material {
                return;
            }
            let material = draft.clone();
            state.preview = None;
            (
                PreviewKey {
                    generation: state.generation,
                    revision: state.revision,
                    draft_id: material.id.clone(),
                },
                material,
            )
        };

        let api = self.inner.api.clone();
        let weak: Weak<EditorInner> = Arc::downgrade(&self.inner);
        self.inner
            .preview
            .schedule(self.inner.config.preview_quiet_period, async move {
                let rendered = match api.render_preview(&material).await {
                    Ok(rendered) => rendered,
                    Err(err) => {
                        warn!("preview_error: {err}");
                        return;
                    }
                };
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let mut state = inner.state();
                let current = state.draft.as_ref().map(|draft| draft.id.as_str());
                if state.generation != key.generation
                    || state.revision != key.revision
                    || current != Some(key.draft_id.as_str())
                {
                    debug!("preview_discarded: {}", key.draft_id);
                    return;
                }
                state.preview = Some(rendered);
            });
    }
}

fn apply_type_hint(asset: &mut Asset, type_hint: Option<&str>) {
    let Some(hint) = type_hint else {
        return;
    };
    let Some(material) = asset.material_mut() else {
        return;
    };
    match hint.parse::<MaterialContentType>() {
        Ok(content_type) => material.content_type = content_type,
        Err(err) => debug!("type_hint_ignored: {err}"),
    }
}
