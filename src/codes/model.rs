use crate::codec::keys::{INVITE_PREFIX, REDEEM_PREFIX, invite_key, redeem_key};
use crate::core::{LedgerError, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// The two code namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeKind {
    /// Gates account registration
    Invite,
    /// Credits points to a ledger
    Redeem,
}

impl CodeKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Invite => INVITE_PREFIX,
            Self::Redeem => REDEEM_PREFIX,
        }
    }

    pub fn key(self, code: &str) -> String {
        match self {
            Self::Invite => invite_key(code),
            Self::Redeem => redeem_key(code),
        }
    }

    /// Collision retries before generation gives up.
    pub fn max_generation_attempts(self) -> usize {
        match self {
            Self::Invite => 50,
            Self::Redeem => 10,
        }
    }

    pub fn max_batch(self) -> usize {
        match self {
            Self::Invite => 200,
            Self::Redeem => 100,
        }
    }
}

/// Shared one-time-consumption contract of invite and redeem codes.
pub trait CodeRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: CodeKind;

    fn code(&self) -> &str;
    fn is_used(&self) -> bool;
    fn created_at(&self) -> DateTime<Utc>;

    /// Flip `used` and stamp the consumer. Callers check `ensure_usable` first.
    fn consume(&mut self, used_by: &str, at: DateTime<Utc>);

    fn ensure_usable(&self, _now: DateTime<Utc>) -> Result<()> {
        if self.is_used() {
            return Err(LedgerError::CodeAlreadyUsed(self.code().to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub used: bool,
    pub used_by: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl InviteCode {
    pub fn new(code: String, created_at: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            code,
            used: false,
            used_by: None,
            used_at: None,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}

impl CodeRecord for InviteCode {
    const KIND: CodeKind = CodeKind::Invite;

    fn code(&self) -> &str {
        &self.code
    }

    fn is_used(&self) -> bool {
        self.used
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn consume(&mut self, used_by: &str, at: DateTime<Utc>) {
        self.used = true;
        self.used_by = Some(used_by.to_string());
        self.used_at = Some(at);
    }

    fn ensure_usable(&self, now: DateTime<Utc>) -> Result<()> {
        if self.used {
            return Err(LedgerError::CodeAlreadyUsed(self.code.clone()));
        }
        if self.is_expired(now) {
            return Err(LedgerError::CodeExpired(self.code.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemCode {
    pub code: String,
    pub used: bool,
    pub used_by: Option<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub points: u32,
}

impl RedeemCode {
    pub fn new(code: String, created_at: DateTime<Utc>, points: u32) -> Self {
        Self {
            code,
            used: false,
            used_by: None,
            used_at: None,
            created_at,
            points,
        }
    }
}

impl CodeRecord for RedeemCode {
    const KIND: CodeKind = CodeKind::Redeem;

    fn code(&self) -> &str {
        &self.code
    }

    fn is_used(&self) -> bool {
        self.used
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn consume(&mut self, used_by: &str, at: DateTime<Utc>) {
        self.used = true;
        self.used_by = Some(used_by.to_string());
        self.used_at = Some(at);
    }
}
