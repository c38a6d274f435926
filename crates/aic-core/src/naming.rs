use regex::Regex;
use std::sync::OnceLock;

/// Route id that asks the backend for a freshly synthesized default asset.
pub const NEW_ASSET_ID: &str = "new";

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn disallowed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_\-]").expect("valid id regex"))
}

/// Derives an asset id from its display name.
///
/// `"My Agent Copy"` becomes `"my_agent_copy"`; characters outside
/// `[a-z0-9_-]` are dropped.
pub fn convert_name_to_id(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let underscored = whitespace_re().replace_all(&lowered, "_");
    disallowed_re().replace_all(&underscored, "").into_owned()
}

pub fn is_new_asset_id(id: &str) -> bool {
    id == NEW_ASSET_ID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_spaces_and_case() {
        assert_eq!(convert_name_to_id("Foo"), "foo");
        assert_eq!(convert_name_to_id("  My   Agent Copy "), "my_agent_copy");
    }

    #[test]
    fn strips_punctuation_but_keeps_dashes() {
        assert_eq!(convert_name_to_id("Python-REPL (v2)!"), "python-repl_v2");
    }

    #[test]
    fn empty_name_yields_empty_id() {
        assert_eq!(convert_name_to_id("   "), "");
    }

    #[test]
    fn new_sentinel_is_recognised() {
        assert!(is_new_asset_id("new"));
        assert!(!is_new_asset_id("news"));
    }
}
