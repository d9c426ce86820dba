//! Signed-in session context.
//!
//! The identity collaborator hands over a `UserIdentity`; wrapping it in a
//! `SessionContext` and passing that to the session cache replaces any
//! process-wide auth state. A context lives exactly as long as the cache
//! built from it.

use chrono::{DateTime, Utc};

use dawntasy_types::identity::UserIdentity;

#[derive(Debug, Clone)]
pub struct SessionContext {
    identity: UserIdentity,
    started_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(identity: UserIdentity) -> Self {
        Self {
            identity,
            started_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Owner id used for every store call made on behalf of this session.
    pub fn owner_id(&self) -> &str {
        &self.identity.owner_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
