//! Identity of the signed-in user.
//!
//! Supplied by the identity collaborator; Dawntasy only consumes the opaque
//! owner id and an optional display name.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Opaque authenticated-user id. Chats are owned by this id.
    pub owner_id: String,
    pub display_name: Option<String>,
}

impl UserIdentity {
    pub fn new(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name, falling back to the owner id.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.owner_id)
    }
}
