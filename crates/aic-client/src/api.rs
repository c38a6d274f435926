//! Backend collaborator for asset persistence.
//!
//! The editor only talks to the backend through [`AssetApi`], so transports
//! (HTTP, IPC, in-process fakes) can be swapped without touching the
//! reconciliation logic.

use aic_core::{Asset, AssetKind, AssetOrigin, RenderedMaterial};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: AssetKind, id: String },
    #[error("{kind} '{id}' already exists")]
    Conflict { kind: AssetKind, id: String },
    #[error("backend rejected request: {0}")]
    Rejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

#[async_trait::async_trait]
pub trait AssetApi: Send + Sync {
    /// Fetches an asset; the `new` id yields a synthesized default, shaped by
    /// `type_hint` for materials.
    async fn fetch(
        &self,
        kind: AssetKind,
        id: &str,
        type_hint: Option<&str>,
    ) -> Result<Asset, ApiError>;

    async fn create_new(&self, kind: AssetKind, id: &str, asset: &Asset) -> Result<(), ApiError>;

    async fn update(&self, kind: AssetKind, asset: &Asset) -> Result<(), ApiError>;

    /// Moves `old_id` to `asset.id` and stores `asset` under the new id.
    async fn rename(&self, kind: AssetKind, old_id: &str, asset: &Asset) -> Result<(), ApiError>;

    async fn exists_as(
        &self,
        kind: AssetKind,
        id: &str,
        origin: AssetOrigin,
    ) -> Result<bool, ApiError>;

    async fn render_preview(&self, material: &Asset) -> Result<RenderedMaterial, ApiError>;

    /// Removes the project-level definition of an asset.
    async fn delete(&self, kind: AssetKind, id: &str) -> Result<(), ApiError>;
}
