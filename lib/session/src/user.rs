//! Users as referenced by sessions and credentials.

use portcullis_core::UserId;
use serde::{Deserialize, Serialize};

/// Synthetic id of the root user.
pub const ROOT_USER_ID: UserId = UserId::new(-1);
/// Synthetic id of the anonymous user.
pub const ANONYMOUS_USER_ID: UserId = UserId::new(-2);

/// A user known to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    id: UserId,
    username: String,
}

impl User {
    #[must_use]
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
        }
    }

    #[must_use]
    pub fn root() -> Self {
        Self::new(ROOT_USER_ID, "root")
    }

    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS_USER_ID, "anonymous")
    }

    #[must_use]
    pub fn id(&self) -> UserId {
        self.id
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.id == ROOT_USER_ID
    }
}
