use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PASSWORD_MIN_LEN: usize = 8;
/// bcrypt ignores input past 72 bytes
pub const PASSWORD_MAX_LEN: usize = 72;
pub const DISPLAY_NAME_MAX_LEN: usize = 64;
/// Work-factor range accepted by bcrypt.
pub const BCRYPT_MIN_COST: u32 = 4;
pub const BCRYPT_MAX_COST: u32 = 31;

/// Login identity, stored under `user:<handle>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub handle: String,
    pub display_name: String,
    /// Absent for accounts created through an external identity provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub banned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invited_by_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Public view of a user; never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub handle: String,
    pub display_name: String,
    pub banned: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserRecord> for UserProfile {
    fn from(user: &UserRecord) -> Self {
        Self {
            handle: user.handle.clone(),
            display_name: user.display_name.clone(),
            banned: user.banned,
            created_at: user.created_at,
        }
    }
}

/// Input for password registration.
#[derive(Clone, Deserialize)]
pub struct Registration {
    pub handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub password: String,
    #[serde(default)]
    pub invite_code: Option<String>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("handle", &self.handle)
            .field("display_name", &self.display_name)
            .field("password", &"<redacted>")
            .field("invite_code", &self.invite_code)
            .finish()
    }
}

/// A verified identity handed over by an external OAuth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentity {
    pub provider: String,
    pub subject: String,
    /// Provider login, used as the basis for a new local handle
    pub suggested_handle: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Stored under `oauth:<provider>:<subject>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLink {
    pub handle: String,
    pub provider: String,
    pub subject: String,
    pub linked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalLogin {
    pub handle: String,
    /// A new account was registered for this identity
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSettings {
    pub registration_enabled: bool,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            registration_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_debug_redacts_password() {
        let registration = Registration {
            handle: "alice".into(),
            display_name: None,
            password: "hunter2hunter2".into(),
            invite_code: None,
        };
        let rendered = format!("{:?}", registration);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_legacy_user_record_defaults() {
        let json = r#"{"handle":"bob","display_name":"Bob","created_at":"2024-01-01T00:00:00Z"}"#;
        let user: UserRecord = serde_json::from_str(json).unwrap();
        assert!(!user.banned);
        assert!(!user.has_password());
    }
}
