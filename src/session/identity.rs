use serde::{Deserialize, Serialize};

/// Who the assistant is acting for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Credential forwarded to services that scope data per user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Source of the current user/workspace identity.
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

/// An identity fixed at construction.
#[derive(Debug, Clone)]
pub struct StaticIdentity(Option<Identity>);

impl StaticIdentity {
    pub fn new(identity: Identity) -> Self {
        Self(Some(identity))
    }

    /// No signed-in user.
    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.0.clone()
    }
}
