use super::model::{
    DISPLAY_NAME_MAX_LEN, ExternalIdentity, ExternalLink, ExternalLogin, PASSWORD_MAX_LEN,
    PASSWORD_MIN_LEN, Registration, RegistrationSettings, UserRecord,
};
use crate::clock::Clock;
use crate::codec::keys::{HANDLE_MAX_LEN, REGISTRATION_SETTINGS_KEY, USER_PREFIX};
use crate::codec::{external_key, normalize_handle, sanitize_handle, user_key};
use crate::codes::{CodeStore, InviteCode};
use crate::core::{LedgerError, Result};
use crate::ledger::LedgerService;
use crate::storage::{KeyedLocks, KvStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Candidate handles tried when an external login's name is taken
const MAX_HANDLE_SUFFIX: usize = 100;

/// User identities, password hashing and invite-gated registration.
///
/// Registration writes the identity record and a fresh default ledger, so a
/// re-registered handle never inherits the balance of a purged account.
pub struct IdentityManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    codes: Arc<CodeStore>,
    ledger: Arc<LedgerService>,
    bcrypt_cost: u32,
}

impl IdentityManager {
    pub fn new(
        store: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        locks: KeyedLocks,
        codes: Arc<CodeStore>,
        ledger: Arc<LedgerService>,
    ) -> Self {
        Self {
            store,
            clock,
            locks,
            codes,
            ledger,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    /// Hashes a password with bcrypt off the async runtime.
    async fn hash_password(&self, password: &str) -> Result<String> {
        let password = password.to_string();
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| LedgerError::Internal(format!("hashing task failed: {}", e)))?
            .map_err(|e| LedgerError::Internal(format!("password hashing failed: {}", e)))
    }

    /// A malformed hash counts as a mismatch.
    async fn verify_password(password: &str, hash: &str) -> Result<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
            .await
            .map_err(|e| LedgerError::Internal(format!("verification task failed: {}", e)))
    }

    fn validate_password(password: &str) -> Result<()> {
        if password.len() < PASSWORD_MIN_LEN {
            return Err(LedgerError::WeakPassword(format!(
                "password must be at least {} characters long",
                PASSWORD_MIN_LEN
            )));
        }
        if password.len() > PASSWORD_MAX_LEN {
            return Err(LedgerError::WeakPassword(format!(
                "password must be at most {} bytes long",
                PASSWORD_MAX_LEN
            )));
        }
        Ok(())
    }

    fn validate_display_name(raw: Option<&str>, handle: &str) -> Result<String> {
        let name = raw.map(str::trim).filter(|name| !name.is_empty()).unwrap_or(handle);
        if name.chars().count() > DISPLAY_NAME_MAX_LEN {
            return Err(LedgerError::Validation(format!(
                "display name must be at most {} characters",
                DISPLAY_NAME_MAX_LEN
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(LedgerError::Validation("display name must not contain control characters".into()));
        }
        Ok(name.to_string())
    }

    /// Checks the invite rules before any write. Returns the normalised invite
    /// to consume, if one was supplied.
    async fn admission(&self, invite_code: Option<&str>) -> Result<Option<String>> {
        match invite_code.map(str::trim).filter(|code| !code.is_empty()) {
            Some(code) => Ok(Some(self.codes.check_invite(code).await?.code)),
            None if self.registration_settings().await?.registration_enabled => Ok(None),
            None => Err(LedgerError::RegistrationClosed),
        }
    }

    /// Caller must hold the user key lock. Consumes the invite, then writes the
    /// identity record and a fresh ledger.
    async fn create_account(&self, mut user: UserRecord, invite: Option<String>) -> Result<UserRecord> {
        if let Some(code) = invite {
            self.codes.mark_used::<InviteCode>(&code, &user.handle).await?;
            user.invited_by_code = Some(code);
        }
        self.store.set_json(&user_key(&user.handle), &user).await?;
        self.ledger.reset(&user.handle).await?;
        info!(
            handle = %user.handle,
            external = !user.has_password(),
            invite = ?user.invited_by_code,
            "account registered"
        );
        Ok(user)
    }

    pub async fn register(&self, registration: &Registration) -> Result<UserRecord> {
        let handle = normalize_handle(&registration.handle)?;
        Self::validate_password(&registration.password)?;
        let display_name = Self::validate_display_name(registration.display_name.as_deref(), &handle)?;

        if self.get_user(&handle).await?.is_some() {
            return Err(LedgerError::HandleTaken(handle));
        }
        let invite = self.admission(registration.invite_code.as_deref()).await?;
        let password_hash = self.hash_password(&registration.password).await?;

        let _guard = self.locks.lock(&user_key(&handle)).await?;
        if self.get_user(&handle).await?.is_some() {
            return Err(LedgerError::HandleTaken(handle));
        }
        let user = UserRecord {
            handle,
            display_name,
            password_hash: Some(password_hash),
            banned: false,
            invited_by_code: None,
            created_at: self.clock.now(),
        };
        self.create_account(user, invite).await
    }

    /// Maps a verified external identity to a local handle, registering a
    /// password-less account on first sight.
    pub async fn resolve_external(&self, identity: &ExternalIdentity, invite_code: Option<&str>) -> Result<ExternalLogin> {
        if identity.provider.trim().is_empty() || identity.subject.trim().is_empty() {
            return Err(LedgerError::Validation("external identity needs a provider and a subject".into()));
        }
        let link_key = external_key(&identity.provider, &identity.subject);
        let _link_guard = self.locks.lock(&link_key).await?;

        if let Some(link) = self.store.get_json::<ExternalLink>(&link_key).await? {
            match self.get_user(&link.handle).await? {
                Some(user) if user.banned => return Err(LedgerError::Banned(user.handle)),
                Some(user) => {
                    return Ok(ExternalLogin {
                        handle: user.handle,
                        created: false,
                    });
                }
                None => {
                    warn!(handle = %link.handle, key = %link_key, "dropping external link to a missing user");
                    self.store.delete(&link_key).await?;
                }
            }
        }

        let invite = self.admission(invite_code).await?;
        let base = sanitize_handle(&identity.suggested_handle);

        for attempt in 1..=MAX_HANDLE_SUFFIX {
            let candidate = handle_candidate(&base, attempt);
            let _guard = self.locks.lock(&user_key(&candidate)).await?;
            if self.get_user(&candidate).await?.is_some() {
                continue;
            }

            let display_name = Self::validate_display_name(identity.display_name.as_deref(), &candidate)?;
            let user = UserRecord {
                handle: candidate.clone(),
                display_name,
                password_hash: None,
                banned: false,
                invited_by_code: None,
                created_at: self.clock.now(),
            };
            self.create_account(user, invite).await?;

            let link = ExternalLink {
                handle: candidate.clone(),
                provider: identity.provider.trim().to_lowercase(),
                subject: identity.subject.trim().to_string(),
                linked_at: self.clock.now(),
            };
            self.store.set_json(&link_key, &link).await?;
            return Ok(ExternalLogin {
                handle: candidate,
                created: true,
            });
        }

        Err(LedgerError::HandleTaken(base))
    }

    /// Password login. Unknown handles and wrong passwords are
    /// indistinguishable to the caller.
    pub async fn authenticate(&self, handle: &str, password: &str) -> Result<UserRecord> {
        let handle = normalize_handle(handle).map_err(|_| LedgerError::InvalidCredentials)?;
        let user = self.get_user(&handle).await?.ok_or(LedgerError::InvalidCredentials)?;
        let Some(hash) = user.password_hash.as_deref() else {
            return Err(LedgerError::InvalidCredentials);
        };
        if !Self::verify_password(password, hash).await? {
            return Err(LedgerError::InvalidCredentials);
        }
        if user.banned {
            return Err(LedgerError::Banned(user.handle));
        }
        Ok(user)
    }

    /// Accounts without a password (external logins) may set one without
    /// supplying `current`.
    pub async fn change_password(&self, handle: &str, current: &str, new_password: &str) -> Result<()> {
        Self::validate_password(new_password)?;
        let handle = normalize_handle(handle)?;
        let new_hash = self.hash_password(new_password).await?;

        let _guard = self.locks.lock(&user_key(&handle)).await?;
        let mut user = self
            .get_user(&handle)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(handle.clone()))?;
        if let Some(hash) = user.password_hash.as_deref() {
            if !Self::verify_password(current, hash).await? {
                return Err(LedgerError::InvalidCredentials);
            }
        }
        user.password_hash = Some(new_hash);
        self.store.set_json(&user_key(&handle), &user).await?;
        info!(handle = %handle, "password changed");
        Ok(())
    }

    pub async fn set_banned(&self, handle: &str, banned: bool) -> Result<UserRecord> {
        let handle = normalize_handle(handle)?;
        let _guard = self.locks.lock(&user_key(&handle)).await?;
        let mut user = self
            .get_user(&handle)
            .await?
            .ok_or_else(|| LedgerError::UserNotFound(handle.clone()))?;
        user.banned = banned;
        self.store.set_json(&user_key(&handle), &user).await?;
        info!(handle = %handle, banned, "ban flag updated");
        Ok(user)
    }

    pub async fn get_user(&self, handle: &str) -> Result<Option<UserRecord>> {
        self.store.get_json(&user_key(handle)).await
    }

    /// All users sorted by handle.
    pub async fn list_users(&self) -> Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .store
            .scan_json::<UserRecord>(USER_PREFIX)
            .await?
            .into_iter()
            .map(|(_, user)| user)
            .collect();
        users.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(users)
    }

    pub async fn delete_user(&self, handle: &str) -> Result<bool> {
        let handle = normalize_handle(handle)?;
        let _guard = self.locks.lock(&user_key(&handle)).await?;
        self.store.delete(&user_key(&handle)).await
    }

    pub async fn registration_settings(&self) -> Result<RegistrationSettings> {
        Ok(self
            .store
            .get_json::<RegistrationSettings>(REGISTRATION_SETTINGS_KEY)
            .await?
            .unwrap_or_default())
    }

    pub async fn set_registration_enabled(&self, enabled: bool) -> Result<RegistrationSettings> {
        let settings = RegistrationSettings {
            registration_enabled: enabled,
        };
        self.store.set_json(REGISTRATION_SETTINGS_KEY, &settings).await?;
        info!(registration_enabled = enabled, "registration settings updated");
        Ok(settings)
    }
}

/// `base`, then `base_2`, `base_3`, ... truncated to the handle length limit.
fn handle_candidate(base: &str, attempt: usize) -> String {
    if attempt == 1 {
        return base.to_string();
    }
    let suffix = format!("_{}", attempt);
    let keep = HANDLE_MAX_LEN.saturating_sub(suffix.len()).min(base.len());
    format!("{}{}", &base[..keep], suffix)
}
