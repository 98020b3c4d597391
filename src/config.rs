use crate::clock::AccrualZone;
use crate::identity::{BCRYPT_MAX_COST, BCRYPT_MIN_COST};
use crate::storage::DurabilityMode;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// Volatile, for demos and tests
    Memory,
    /// WAL + snapshot files under `--data-dir`
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Durability {
    /// fsync after every WAL append
    Sync,
    Async,
}

impl From<Durability> for DurabilityMode {
    fn from(value: Durability) -> Self {
        match value {
            Durability::Sync => DurabilityMode::Sync,
            Durability::Async => DurabilityMode::Async,
        }
    }
}

/// Process configuration; every flag can also come from the environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "pointgate", version, about = "Point ledger and entitlement service")]
pub struct AppConfig {
    #[arg(long, env = "POINTGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "POINTGATE_PORT", default_value_t = 8080)]
    pub port: u16,

    #[arg(long, env = "POINTGATE_STORAGE", value_enum, default_value_t = StorageBackend::File)]
    pub storage: StorageBackend,

    #[arg(long, env = "POINTGATE_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "POINTGATE_DURABILITY", value_enum, default_value_t = Durability::Async)]
    pub durability: Durability,

    /// WAL entries between snapshots
    #[arg(long, env = "POINTGATE_SNAPSHOT_EVERY", default_value_t = 1000)]
    pub snapshot_every: usize,

    /// Per-user content directories removed on purge
    #[arg(long, env = "POINTGATE_CONTENT_ROOT")]
    pub content_root: Option<PathBuf>,

    /// Accrual day boundary as minutes east of UTC; server local time if unset
    #[arg(long, env = "POINTGATE_ACCRUAL_UTC_OFFSET", allow_hyphen_values = true)]
    pub accrual_utc_offset_minutes: Option<i32>,

    #[arg(long, env = "POINTGATE_BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    #[arg(long, env = "ADMIN_USERNAME")]
    pub admin_username: String,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: String,
}

impl AppConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn accrual_zone(&self) -> Result<AccrualZone> {
        AccrualZone::from_offset_minutes(self.accrual_utc_offset_minutes)
            .context("POINTGATE_ACCRUAL_UTC_OFFSET is out of range")
    }

    pub fn validate(&self) -> Result<()> {
        if self.admin_username.trim().is_empty() {
            bail!("ADMIN_USERNAME must not be blank");
        }
        if self.admin_password.len() < 8 {
            bail!("ADMIN_PASSWORD must be at least 8 characters long");
        }
        if !(BCRYPT_MIN_COST..=BCRYPT_MAX_COST).contains(&self.bcrypt_cost) {
            bail!(
                "POINTGATE_BCRYPT_COST must be between {} and {}",
                BCRYPT_MIN_COST,
                BCRYPT_MAX_COST
            );
        }
        if self.snapshot_every == 0 {
            bail!("POINTGATE_SNAPSHOT_EVERY must be positive");
        }
        self.accrual_zone()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut argv = vec!["pointgate", "--admin-username", "root", "--admin-password", "password123"];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert_eq!(config.address(), "0.0.0.0:8080");
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.accrual_zone().unwrap(), AccrualZone::ServerLocal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fixed_accrual_offset() {
        let config = parse(&["--accrual-utc-offset-minutes", "-300"]);
        assert!(matches!(config.accrual_zone().unwrap(), AccrualZone::Fixed(_)));

        let config = parse(&["--accrual-utc-offset-minutes", "5000"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_short_admin_password() {
        let config = AppConfig::try_parse_from(["pointgate", "--admin-username", "root", "--admin-password", "short"]).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        assert!(parse(&["--bcrypt-cost", "4"]).validate().is_ok());
        assert!(parse(&["--bcrypt-cost", "31"]).validate().is_ok());
        assert!(parse(&["--bcrypt-cost", "3"]).validate().is_err());
        assert!(parse(&["--bcrypt-cost", "32"]).validate().is_err());
    }
}
