use super::generator::{DEFAULT_CODE_LENGTH, generate_code};
use super::model::{CodeKind, CodeRecord, InviteCode, RedeemCode};
use crate::clock::Clock;
use crate::codec::normalize_code;
use crate::core::{LedgerError, Result};
use crate::storage::{KeyedLocks, KvStore};
use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MAX_INVITE_EXPIRY_DAYS: u32 = 365;

/// Single-use invite and redeem codes.
///
/// Every state change on a code (`mark_used`, `delete`) happens under that
/// code's key lock with a fresh re-read, so two concurrent consumers can never
/// both succeed.
pub struct CodeStore {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
    code_length: usize,
}

impl CodeStore {
    pub fn new(store: Arc<dyn KvStore>, clock: Arc<dyn Clock>, locks: KeyedLocks) -> Self {
        Self {
            store,
            clock,
            locks,
            code_length: DEFAULT_CODE_LENGTH,
        }
    }

    /// Override the generated code length (short codes make collisions testable).
    pub fn with_code_length(mut self, code_length: usize) -> Self {
        self.code_length = code_length.max(1);
        self
    }

    /// Generates a code that is not yet taken and stores the record built by
    /// `build`, all under the new key's lock.
    async fn insert_unique<C, F>(&self, build: F) -> Result<C>
    where
        C: CodeRecord,
        F: Fn(String) -> C,
    {
        let attempts = C::KIND.max_generation_attempts();
        for attempt in 1..=attempts {
            let code = generate_code(self.code_length);
            let key = C::KIND.key(&code);
            let _guard = self.locks.lock(&key).await?;
            if self.store.get(&key).await?.is_some() {
                debug!(kind = ?C::KIND, attempt, "code collision, retrying");
                continue;
            }
            let record = build(code);
            self.store.set_json(&key, &record).await?;
            return Ok(record);
        }
        warn!(kind = ?C::KIND, attempts, "code generation exhausted");
        Err(LedgerError::CodeSpaceExhausted { attempts })
    }

    fn check_count(kind: CodeKind, count: usize) -> Result<()> {
        if count == 0 || count > kind.max_batch() {
            return Err(LedgerError::InvalidBatch(format!(
                "count must be between 1 and {}, got {}",
                kind.max_batch(),
                count
            )));
        }
        Ok(())
    }

    pub async fn create_redeem_batch(&self, count: usize, points: u32) -> Result<Vec<RedeemCode>> {
        Self::check_count(CodeKind::Redeem, count)?;
        if points == 0 {
            return Err(LedgerError::InvalidBatch("points must be a positive integer".into()));
        }
        let now = self.clock.now();
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            created.push(self.insert_unique(|code| RedeemCode::new(code, now, points)).await?);
        }
        info!(count, points, "redeem codes created");
        Ok(created)
    }

    /// `expires_in_days = None` creates permanent invites.
    pub async fn create_invite_batch(&self, count: usize, expires_in_days: Option<u32>) -> Result<Vec<InviteCode>> {
        Self::check_count(CodeKind::Invite, count)?;
        if let Some(days) = expires_in_days {
            if days == 0 || days > MAX_INVITE_EXPIRY_DAYS {
                return Err(LedgerError::InvalidBatch(format!(
                    "expiry must be between 1 and {} days, got {}",
                    MAX_INVITE_EXPIRY_DAYS, days
                )));
            }
        }
        let now = self.clock.now();
        let expires_at = expires_in_days.map(|days| now + Duration::days(days as i64));
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            created.push(self.insert_unique(|code| InviteCode::new(code, now, expires_at)).await?);
        }
        info!(count, ?expires_in_days, "invite codes created");
        Ok(created)
    }

    pub async fn get<C: CodeRecord>(&self, code: &str) -> Result<Option<C>> {
        self.store.get_json(&C::KIND.key(code)).await
    }

    /// Newest first.
    pub async fn list<C: CodeRecord>(&self) -> Result<Vec<C>> {
        let mut codes: Vec<C> = self
            .store
            .scan_json::<C>(C::KIND.prefix())
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .collect();
        codes.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then_with(|| a.code().cmp(b.code())));
        Ok(codes)
    }

    /// Loads an invite and reports why it cannot be used, if it cannot.
    pub async fn check_invite(&self, code: &str) -> Result<InviteCode> {
        let invite = self
            .get::<InviteCode>(code)
            .await?
            .ok_or_else(|| LedgerError::CodeNotFound(normalize_code(code)))?;
        invite.ensure_usable(self.clock.now())?;
        Ok(invite)
    }

    /// True iff the invite exists, is unused and has not expired.
    pub async fn validate_invite(&self, code: &str) -> Result<bool> {
        match self.check_invite(code).await {
            Ok(_) => Ok(true),
            Err(LedgerError::CodeNotFound(_) | LedgerError::CodeAlreadyUsed(_) | LedgerError::CodeExpired(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Consumes a code on behalf of `used_by`, returning the updated record.
    pub async fn mark_used<C: CodeRecord>(&self, code: &str, used_by: &str) -> Result<C> {
        let key = C::KIND.key(code);
        let _guard = self.locks.lock(&key).await?;
        let mut record: C = self
            .store
            .get_json(&key)
            .await?
            .ok_or_else(|| LedgerError::CodeNotFound(normalize_code(code)))?;
        let now = self.clock.now();
        record.ensure_usable(now)?;
        record.consume(used_by, now);
        self.store.set_json(&key, &record).await?;
        info!(kind = ?C::KIND, code = record.code(), used_by, "code consumed");
        Ok(record)
    }

    /// Deletes an unused code; used codes are retained for audit.
    pub async fn delete<C: CodeRecord>(&self, code: &str) -> Result<()> {
        let key = C::KIND.key(code);
        let _guard = self.locks.lock(&key).await?;
        let record: C = self
            .store
            .get_json(&key)
            .await?
            .ok_or_else(|| LedgerError::CodeNotFound(normalize_code(code)))?;
        if record.is_used() {
            return Err(LedgerError::CodeAlreadyUsed(record.code().to_string()));
        }
        self.store.delete(&key).await?;
        info!(kind = ?C::KIND, code = record.code(), "code deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::MemoryKvStore;
    use chrono::{TimeZone, Utc};

    fn setup() -> (CodeStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap()));
        let store = CodeStore::new(Arc::new(MemoryKvStore::new()), clock.clone(), KeyedLocks::new());
        (store, clock)
    }

    #[tokio::test]
    async fn test_batch_bounds() {
        let (codes, _) = setup();
        assert!(matches!(codes.create_redeem_batch(0, 10).await, Err(LedgerError::InvalidBatch(_))));
        assert!(codes.create_redeem_batch(101, 10).await.is_err());
        assert!(codes.create_redeem_batch(1, 0).await.is_err());
        assert!(codes.create_invite_batch(201, None).await.is_err());
        assert!(codes.create_invite_batch(1, Some(0)).await.is_err());
        assert!(codes.create_invite_batch(1, Some(366)).await.is_err());
        assert_eq!(codes.create_invite_batch(200, Some(365)).await.unwrap().len(), 200);
    }

    #[tokio::test]
    async fn test_invite_expires() {
        let (codes, clock) = setup();
        let invite = codes.create_invite_batch(1, Some(7)).await.unwrap().remove(0);
        assert!(codes.validate_invite(&invite.code).await.unwrap());
        // lower-case input resolves to the same code
        assert!(codes.validate_invite(&invite.code.to_lowercase()).await.unwrap());

        clock.advance(Duration::days(7));
        assert!(!codes.validate_invite(&invite.code).await.unwrap());
        assert!(matches!(
            codes.mark_used::<InviteCode>(&invite.code, "bob").await,
            Err(LedgerError::CodeExpired(_))
        ));
        // still listable
        assert_eq!(codes.list::<InviteCode>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_is_reported() {
        let (codes, _) = setup();
        let codes = codes.with_code_length(1);
        // fill the whole one-character space
        for c in super::super::generator::CODE_ALPHABET {
            let code = (*c as char).to_string();
            codes
                .store
                .set_json(&CodeKind::Redeem.key(&code), &RedeemCode::new(code.clone(), Utc::now(), 1))
                .await
                .unwrap();
        }
        let err = codes.create_redeem_batch(1, 5).await.unwrap_err();
        assert!(matches!(err, LedgerError::CodeSpaceExhausted { attempts: 10 }));
    }

    #[tokio::test]
    async fn test_used_codes_cannot_be_deleted() {
        let (codes, _) = setup();
        let batch = codes.create_redeem_batch(2, 30).await.unwrap();
        codes.mark_used::<RedeemCode>(&batch[0].code, "alice").await.unwrap();

        assert!(matches!(
            codes.delete::<RedeemCode>(&batch[0].code).await,
            Err(LedgerError::CodeAlreadyUsed(_))
        ));
        codes.delete::<RedeemCode>(&batch[1].code).await.unwrap();
        assert!(matches!(
            codes.delete::<RedeemCode>(&batch[1].code).await,
            Err(LedgerError::CodeNotFound(_))
        ));

        let remaining = codes.list::<RedeemCode>().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].used_by.as_deref(), Some("alice"));
    }
}
