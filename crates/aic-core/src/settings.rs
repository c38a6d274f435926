use serde::{Deserialize, Serialize};

/// Settings as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub code_autorun: bool,
    #[serde(default)]
    pub openai_api_key: Option<String>,
}

/// Partial settings write; unset fields are left alone by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_autorun: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    /// Write to the user-wide settings file instead of the project's.
    #[serde(default)]
    pub to_global: bool,
}

impl SettingsUpdate {
    pub fn global_api_key(key: impl Into<String>) -> Self {
        Self {
            openai_api_key: Some(key.into()),
            to_global: true,
            ..Self::default()
        }
    }

    pub fn global_code_autorun(enabled: bool) -> Self {
        Self {
            code_autorun: Some(enabled),
            to_global: true,
            ..Self::default()
        }
    }
}
