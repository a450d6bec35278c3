//! Transport session identity registry.
//!
//! Both transport front-ends register a caller identity when a session is
//! established and remove it when the session closes. The registry holds no
//! transport handles - it is a weak association from session id to identity,
//! read during every tool dispatch to populate the audit field.
//!
//! The session id is threaded explicitly from the transport layer into each
//! dispatch; resolution never guesses among concurrently active sessions.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// User id recorded for unauthenticated callers.
pub const ANONYMOUS_USER_ID: &str = "anonymous";

/// Audit name used when a caller has neither a display name nor a user id.
const UNKNOWN_CALLER: &str = "unknown";

/// Resolved caller identity for one transport session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionIdentity {
    /// Transport session id this identity is bound to.
    pub session_id: String,

    /// Stable caller identifier (API-key principal id or "anonymous").
    pub user_id: String,

    /// Human-readable caller name, if known.
    pub display_name: Option<String>,
}

impl SessionIdentity {
    /// Create an identity for a session.
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        display_name: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            display_name,
        }
    }

    /// Create the anonymous identity for a session.
    pub fn anonymous(session_id: impl Into<String>) -> Self {
        Self::new(session_id, ANONYMOUS_USER_ID, None)
    }

    /// Name recorded in the `executedBy` audit field: the display name if
    /// known, else the user id, else the literal "unknown".
    pub fn audit_name(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ if !self.user_id.is_empty() => &self.user_id,
            _ => UNKNOWN_CALLER,
        }
    }
}

/// In-memory session-to-identity registry shared by both transports.
///
/// Single-instance state: horizontal scaling gives each instance its own
/// registry, which is acceptable since the mapping is ephemeral.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionIdentity>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the identity for a newly established transport session.
    pub fn register(&self, identity: SessionIdentity) {
        debug!(
            session_id = %identity.session_id,
            user_id = %identity.user_id,
            "session registered"
        );
        self.sessions
            .write()
            .insert(identity.session_id.clone(), identity);
    }

    /// Look up the identity for a session.
    ///
    /// Lookup never creates an entry: an absent session resolves to the
    /// anonymous identity.
    pub fn lookup(&self, session_id: &str) -> SessionIdentity {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| SessionIdentity::anonymous(session_id))
    }

    /// Remove a session's identity when its transport session closes.
    pub fn unregister(&self, session_id: &str) -> Option<SessionIdentity> {
        let removed = self.sessions.write().remove(session_id);
        if removed.is_some() {
            debug!(session_id, "session unregistered");
        }
        removed
    }

    /// Check whether a session is currently registered.
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().contains_key(session_id)
    }

    /// Number of currently registered sessions.
    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_lookup_unregister() {
        let registry = SessionRegistry::new();
        let identity = SessionIdentity::new("s-1", "api-key", Some("Data Agent".to_string()));
        registry.register(identity.clone());

        assert_eq!(registry.lookup("s-1"), identity);
        assert_eq!(registry.active_count(), 1);

        registry.unregister("s-1");
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn test_lookup_after_close_returns_anonymous() {
        let registry = SessionRegistry::new();
        registry.register(SessionIdentity::new(
            "s-2",
            "api-key",
            Some("Data Agent".to_string()),
        ));
        registry.unregister("s-2");

        let identity = registry.lookup("s-2");
        assert_eq!(identity.user_id, ANONYMOUS_USER_ID);
        assert!(identity.display_name.is_none());
    }

    #[test]
    fn test_lookup_never_creates() {
        let registry = SessionRegistry::new();
        let _ = registry.lookup("ghost");
        assert_eq!(registry.active_count(), 0);
        assert!(!registry.contains("ghost"));
    }

    #[test]
    fn test_concurrent_sessions_resolve_independently() {
        let registry = SessionRegistry::new();
        registry.register(SessionIdentity::new("a", "api-key", Some("Agent A".to_string())));
        registry.register(SessionIdentity::anonymous("b"));

        assert_eq!(registry.lookup("a").audit_name(), "Agent A");
        assert_eq!(registry.lookup("b").audit_name(), "anonymous");
    }

    #[test]
    fn test_audit_name_precedence() {
        let with_name = SessionIdentity::new("s", "api-key", Some("Data Agent".to_string()));
        assert_eq!(with_name.audit_name(), "Data Agent");

        let without_name = SessionIdentity::new("s", "api-key", None);
        assert_eq!(without_name.audit_name(), "api-key");

        let empty = SessionIdentity::new("s", "", None);
        assert_eq!(empty.audit_name(), "unknown");
    }
}
