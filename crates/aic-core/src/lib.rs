pub mod naming;
pub mod settings;
pub mod ws_protocol;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use naming::{convert_name_to_id, NEW_ASSET_ID};

const PREVIEW_PLACEHOLDER: &str = "Generating preview...";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Agent,
    Material,
    Chat,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Agent => "agent",
            AssetKind::Material => "material",
            AssetKind::Chat => "chat",
        }
    }

    /// Plural path segment used by editor routes, e.g. `/agents/<id>`.
    pub fn route_segment(&self) -> &'static str {
        match self {
            AssetKind::Agent => "agents",
            AssetKind::Material => "materials",
            AssetKind::Chat => "chats",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "agent" | "agents" => Ok(AssetKind::Agent),
            "material" | "materials" => Ok(AssetKind::Material),
            "chat" | "chats" => Ok(AssetKind::Chat),
            other => Err(format!("Unknown asset kind: {other}")),
        }
    }
}

/// Where the current definition of an asset lives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AssetOrigin {
    #[serde(rename = "aiconsole")]
    Builtin,
    #[default]
    #[serde(rename = "project")]
    Project,
}

impl AssetOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetOrigin::Builtin => "aiconsole",
            AssetOrigin::Project => "project",
        }
    }
}

impl fmt::Display for AssetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GptMode {
    #[default]
    Quality,
    Fast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaterialContentType {
    #[default]
    StaticText,
    DynamicText,
    Api,
}

impl MaterialContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialContentType::StaticText => "static_text",
            MaterialContentType::DynamicText => "dynamic_text",
            MaterialContentType::Api => "api",
        }
    }

    /// Human label shown next to the editor, e.g. "Static Text".
    pub fn display_name(&self) -> &'static str {
        match self {
            MaterialContentType::StaticText => "Static Text",
            MaterialContentType::DynamicText => "Dynamic Text",
            MaterialContentType::Api => "API",
        }
    }
}

impl FromStr for MaterialContentType {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_lowercase().as_str() {
            "static_text" | "static-text" => Ok(MaterialContentType::StaticText),
            "dynamic_text" | "dynamic-text" => Ok(MaterialContentType::DynamicText),
            "api" => Ok(MaterialContentType::Api),
            other => Err(format!("Unknown material content type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentBody {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub gpt_mode: GptMode,
    #[serde(default)]
    pub execution_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct MaterialBody {
    #[serde(default)]
    pub content_type: MaterialContentType,
    #[serde(default)]
    pub content_static_text: String,
    #[serde(default)]
    pub content_dynamic_text: String,
    #[serde(default)]
    pub content_api: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChatBody {
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title_edited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AssetBody {
    Agent(AgentBody),
    Material(MaterialBody),
    Chat(ChatBody),
}

impl AssetBody {
    pub fn kind(&self) -> AssetKind {
        match self {
            AssetBody::Agent(_) => AssetKind::Agent,
            AssetBody::Material(_) => AssetKind::Material,
            AssetBody::Chat(_) => AssetKind::Chat,
        }
    }
}

/// An editable object as exchanged with the backend.
///
/// Equality is structural over every declared field; the editor relies on it
/// for dirty tracking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default, rename = "defined_in")]
    pub origin: AssetOrigin,
    #[serde(default, rename = "override")]
    pub overrides_builtin: bool,
    #[serde(flatten)]
    pub body: AssetBody,
}

impl Asset {
    pub fn kind(&self) -> AssetKind {
        self.body.kind()
    }

    /// Both name and id are set, so the asset can be persisted.
    pub fn is_save_eligible(&self) -> bool {
        !self.id.trim().is_empty() && !self.name.trim().is_empty()
    }

    /// A system default with the same id exists underneath this asset.
    pub fn shadows_builtin(&self) -> bool {
        match self.origin {
            AssetOrigin::Builtin => true,
            AssetOrigin::Project => self.overrides_builtin,
        }
    }

    pub fn canonical_path(&self) -> String {
        format!("/{}/{}", self.kind().route_segment(), self.id)
    }

    pub fn material(&self) -> Option<&MaterialBody> {
        match &self.body {
            AssetBody::Material(material) => Some(material),
            _ => None,
        }
    }

    pub fn material_mut(&mut self) -> Option<&mut MaterialBody> {
        match &mut self.body {
            AssetBody::Material(material) => Some(material),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RenderedMaterial {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl RenderedMaterial {
    /// Text for the read-only preview pane. Errors win over content and the
    /// backend's escaped newlines are expanded.
    pub fn display_text(&self) -> String {
        match self.error.as_deref() {
            Some(error) if !error.is_empty() => error.to_string(),
            _ => self.content.replace("\\n", "\n"),
        }
    }
}

pub fn preview_display_text(preview: Option<&RenderedMaterial>) -> String {
    preview
        .map(RenderedMaterial::display_text)
        .unwrap_or_else(|| PREVIEW_PLACEHOLDER.to_string())
}
