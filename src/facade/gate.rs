use crate::clock::{AccrualZone, Clock, SystemClock};
use crate::codes::CodeStore;
use crate::core::{LedgerError, Result};
use crate::identity::{IdentityManager, Registration, UserRecord};
use crate::ledger::{DenyReason, EffectiveAccess, Leaderboard, LedgerService};
use crate::purge::{ContentRoot, PurgeExecutor, PurgeReport};
use crate::storage::{KeyedLocks, KvStore, MemoryKvStore};
use crate::codec::normalize_handle;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Wires the ledger, code store, identity manager and purge executor over a
/// single key-value store and clock.
pub struct PointGate {
    clock: Arc<dyn Clock>,
    ledger: Arc<LedgerService>,
    codes: Arc<CodeStore>,
    identity: Arc<IdentityManager>,
    purger: Arc<PurgeExecutor>,
}

pub struct PointGateBuilder {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    zone: AccrualZone,
    content_root: Option<PathBuf>,
    bcrypt_cost: u32,
    code_length: Option<usize>,
}

impl PointGateBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn zone(mut self, zone: AccrualZone) -> Self {
        self.zone = zone;
        self
    }

    /// Directory holding one sub-directory of user content per handle.
    pub fn content_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.content_root = Some(root.into());
        self
    }

    pub fn bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn code_length(mut self, length: usize) -> Self {
        self.code_length = Some(length);
        self
    }

    pub fn build(self) -> PointGate {
        let locks = KeyedLocks::new();

        let mut codes = CodeStore::new(self.store.clone(), self.clock.clone(), locks.clone());
        if let Some(length) = self.code_length {
            codes = codes.with_code_length(length);
        }
        let codes = Arc::new(codes);

        let purger = Arc::new(PurgeExecutor::new(
            self.store.clone(),
            self.content_root.map(ContentRoot::new),
        ));
        let ledger = Arc::new(LedgerService::new(
            self.store.clone(),
            self.clock.clone(),
            self.zone,
            locks.clone(),
            codes.clone(),
            purger.clone(),
        ));
        let identity = Arc::new(
            IdentityManager::new(self.store, self.clock.clone(), locks, codes.clone(), ledger.clone())
                .with_bcrypt_cost(self.bcrypt_cost),
        );

        PointGate {
            clock: self.clock,
            ledger,
            codes,
            identity,
            purger,
        }
    }
}

impl PointGate {
    pub fn builder(store: Arc<dyn KvStore>) -> PointGateBuilder {
        PointGateBuilder {
            store,
            clock: Arc::new(SystemClock),
            zone: AccrualZone::default(),
            content_root: None,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            code_length: None,
        }
    }

    /// Volatile instance over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::builder(Arc::new(MemoryKvStore::new())).build()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ledger(&self) -> &LedgerService {
        &self.ledger
    }

    pub fn codes(&self) -> &CodeStore {
        &self.codes
    }

    pub fn identity(&self) -> &IdentityManager {
        &self.identity
    }

    pub fn purger(&self) -> &PurgeExecutor {
        &self.purger
    }

    pub async fn register(&self, registration: &Registration) -> Result<UserRecord> {
        self.identity.register(registration).await
    }

    /// Normalises a session handle and rejects banned accounts. Handles without
    /// an identity record (external sessions, purged accounts) pass through.
    pub async fn member(&self, handle: &str) -> Result<String> {
        let handle = normalize_handle(handle)?;
        match self.identity.get_user(&handle).await? {
            Some(user) if user.banned => Err(LedgerError::Banned(handle)),
            _ => Ok(handle),
        }
    }

    /// Whether the caller may enter the main experience right now.
    pub async fn effective_access(&self, handle: Option<&str>) -> Result<EffectiveAccess> {
        let Some(handle) = handle else {
            return Ok(EffectiveAccess::denied(DenyReason::NotLoggedIn));
        };
        match self.member(handle).await {
            Ok(handle) => self.ledger.effective_access(Some(&handle)).await,
            Err(LedgerError::Banned(_)) => Ok(EffectiveAccess::denied(DenyReason::Banned)),
            Err(err) => Err(err),
        }
    }

    /// Top balances among users with an identity record that are not banned.
    pub async fn leaderboard(&self, caller: &str) -> Result<Leaderboard> {
        let eligible: HashMap<String, String> = self
            .identity
            .list_users()
            .await?
            .into_iter()
            .filter(|user| !user.banned)
            .map(|user| (user.handle, user.display_name))
            .collect();
        self.ledger.leaderboard(caller, &eligible).await
    }

    /// Purges the account immediately and drops its ledger record.
    pub async fn delete_user_data(&self, handle: &str) -> Result<PurgeReport> {
        let handle = normalize_handle(handle)?;
        let report = self.purger.purge(&handle).await;
        let ledger_removed = self.ledger.remove(&handle).await?;
        if !ledger_removed && report == PurgeReport::default() {
            return Err(LedgerError::UserNotFound(handle));
        }
        info!(handle = %handle, ledger_removed, "user data deleted");
        Ok(report)
    }
}
