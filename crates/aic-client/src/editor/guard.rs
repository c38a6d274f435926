/// Result of asking to leave the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    Proceed(String),
    Blocked,
}

/// Holds a navigation attempt that was intercepted because the draft had
/// unsaved edits. At most one attempt is pending; a newer one replaces it.
#[derive(Debug, Default, Clone)]
pub struct NavigationGuard {
    blocked: Option<String>,
}

impl NavigationGuard {
    pub fn request(&mut self, target: impl Into<String>, dirty: bool) -> NavigationDecision {
        let target = target.into();
        if dirty {
            self.blocked = Some(target);
            NavigationDecision::Blocked
        } else {
            self.blocked = None;
            NavigationDecision::Proceed(target)
        }
    }

    pub fn pending(&self) -> Option<&str> {
        self.blocked.as_deref()
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.is_some()
    }

    pub fn take_pending(&mut self) -> Option<String> {
        self.blocked.take()
    }

    pub fn cancel(&mut self) -> bool {
        self.blocked.take().is_some()
    }
}
