//! Administrative console: credential check, user overview and the
//! privileged operations on ledgers, bans, codes and registration.

use crate::codec::normalize_handle;
use crate::core::{LedgerError, Points, Result};
use crate::codes::{InviteCode, RedeemCode};
use crate::facade::PointGate;
use crate::identity::{RegistrationSettings, UserRecord};
use crate::ledger::AdjustAction;
use crate::purge::PurgeReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

/// Injected at startup; there is no built-in default account.
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password: String,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = self.username.as_bytes().ct_eq(username.as_bytes());
        let pass_ok = self.password.as_bytes().ct_eq(password.as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// One row of the admin user list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub handle: String,
    pub display_name: String,
    pub banned: bool,
    pub external: bool,
    pub created_at: DateTime<Utc>,
    /// `None` until the user's ledger is first touched
    pub points: Option<Points>,
    pub access_on: Option<bool>,
    pub off_days: i64,
    pub storage_bytes: u64,
}

pub struct AdminConsole {
    gate: Arc<PointGate>,
    credentials: AdminCredentials,
}

impl AdminConsole {
    pub fn new(gate: Arc<PointGate>, credentials: AdminCredentials) -> Self {
        Self { gate, credentials }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        if self.credentials.matches(username, password) {
            Ok(())
        } else {
            warn!(username, "admin login rejected");
            Err(LedgerError::InvalidCredentials)
        }
    }

    /// Users with their projected balance and content usage. Listing never
    /// settles or purges a ledger.
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let ledger = self.gate.ledger();
        let now = ledger.now();
        let users = self.gate.identity().list_users().await?;

        let mut summaries = Vec::with_capacity(users.len());
        for user in users {
            let projected = ledger.projected(&user.handle).await?;
            let storage_bytes = match self.gate.purger().content() {
                Some(content) => content.usage_bytes(&user.handle).await.unwrap_or_else(|err| {
                    warn!(handle = %user.handle, error = %err, "failed to measure content usage");
                    0
                }),
                None => 0,
            };
            summaries.push(UserSummary {
                external: !user.has_password(),
                points: projected.as_ref().map(|l| l.points),
                access_on: projected.as_ref().map(|l| l.access_on),
                off_days: projected.as_ref().map_or(0, |l| l.off_days(now, ledger.zone())),
                storage_bytes,
                handle: user.handle,
                display_name: user.display_name,
                banned: user.banned,
                created_at: user.created_at,
            });
        }
        Ok(summaries)
    }

    /// Only registered users can be adjusted; an unknown handle is left
    /// untouched.
    pub async fn adjust_points(&self, handle: &str, action: AdjustAction, amount: f64) -> Result<Points> {
        let handle = normalize_handle(handle)?;
        if self.gate.identity().get_user(&handle).await?.is_none() {
            return Err(LedgerError::UserNotFound(handle));
        }
        self.gate.ledger().admin_adjust(&handle, action, amount).await
    }

    pub async fn set_banned(&self, handle: &str, banned: bool) -> Result<UserRecord> {
        self.gate.identity().set_banned(handle, banned).await
    }

    pub async fn delete_user_data(&self, handle: &str) -> Result<PurgeReport> {
        info!(admin = self.credentials.username(), handle, "deleting user data");
        self.gate.delete_user_data(handle).await
    }

    pub async fn create_redeem_codes(&self, count: usize, points: u32) -> Result<Vec<RedeemCode>> {
        self.gate.codes().create_redeem_batch(count, points).await
    }

    pub async fn list_redeem_codes(&self) -> Result<Vec<RedeemCode>> {
        self.gate.codes().list::<RedeemCode>().await
    }

    pub async fn delete_redeem_code(&self, code: &str) -> Result<()> {
        self.gate.codes().delete::<RedeemCode>(code).await
    }

    pub async fn create_invite_codes(&self, count: usize, expires_in_days: Option<u32>) -> Result<Vec<InviteCode>> {
        self.gate.codes().create_invite_batch(count, expires_in_days).await
    }

    pub async fn list_invite_codes(&self) -> Result<Vec<InviteCode>> {
        self.gate.codes().list::<InviteCode>().await
    }

    pub async fn delete_invite_code(&self, code: &str) -> Result<()> {
        self.gate.codes().delete::<InviteCode>(code).await
    }

    pub async fn registration_settings(&self) -> Result<RegistrationSettings> {
        self.gate.identity().registration_settings().await
    }

    pub async fn set_registration_enabled(&self, enabled: bool) -> Result<RegistrationSettings> {
        self.gate.identity().set_registration_enabled(enabled).await
    }
}
