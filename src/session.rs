use crate::types::Settings;

/// Default `session_timeout`, in seconds.
pub const DEFAULT_SESSION_TIMEOUT: u64 = 60;

/// A server-side session: temporary tables and `SET` statements live as long as it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub timeout_secs: u64,
}

impl Session {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timeout_secs: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// A session with a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Per-call options: extra settings and an optional session.
///
/// Per-call settings have the lowest precedence; connection settings override them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub settings: Settings,
    pub session: Option<Session>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_setting(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.settings.insert(name.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_sessions_are_distinct() {
        let first = Session::generate();
        let second = Session::generate();
        assert_ne!(first.id, second.id);
        assert_eq!(first.id.len(), 32);
        assert_eq!(first.timeout_secs, DEFAULT_SESSION_TIMEOUT);
    }

    #[test]
    fn options_builder() {
        let options = QueryOptions::new()
            .with_setting("max_threads", 4)
            .with_session(Session::new("abc").with_timeout(5));
        assert_eq!(options.settings.get("max_threads").map(String::as_str), Some("4"));
        assert_eq!(options.session.unwrap().timeout_secs, 5);
    }
}
