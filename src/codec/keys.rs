use crate::core::{LedgerError, Result};
use lazy_static::lazy_static;
use regex::Regex;

pub const ACCOUNT_PREFIX: &str = "account:";
pub const USER_PREFIX: &str = "user:";
pub const REDEEM_PREFIX: &str = "redeem:";
pub const INVITE_PREFIX: &str = "invite:";
pub const EXTERNAL_PREFIX: &str = "oauth:";
pub const REGISTRATION_SETTINGS_KEY: &str = "settings:registration";

pub const HANDLE_MIN_LEN: usize = 1;
pub const HANDLE_MAX_LEN: usize = 32;

lazy_static! {
    static ref HANDLE_PATTERN: Regex = Regex::new(r"^[a-z0-9_-]{1,32}$").expect("handle pattern is valid");
}

/// Lower-cases and validates a user handle.
pub fn normalize_handle(raw: &str) -> Result<String> {
    let handle = raw.trim().to_lowercase();
    if HANDLE_PATTERN.is_match(&handle) {
        Ok(handle)
    } else {
        Err(LedgerError::InvalidHandle(raw.to_string()))
    }
}

/// Best-effort conversion of an arbitrary name (e.g. an OAuth login) into a
/// string that passes `normalize_handle`.
pub fn sanitize_handle(raw: &str) -> String {
    let mut handle: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(HANDLE_MAX_LEN)
        .collect();
    while handle.len() < HANDLE_MIN_LEN {
        handle.push('_');
    }
    handle
}

/// Upper-cases a code and drops everything outside `A-Z0-9`, so codes pasted
/// with spaces or dashes still resolve.
pub fn normalize_code(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn account_key(handle: &str) -> String {
    format!("{}{}", ACCOUNT_PREFIX, handle)
}

pub fn user_key(handle: &str) -> String {
    format!("{}{}", USER_PREFIX, handle)
}

pub fn redeem_key(code: &str) -> String {
    format!("{}{}", REDEEM_PREFIX, normalize_code(code))
}

pub fn invite_key(code: &str) -> String {
    format!("{}{}", INVITE_PREFIX, normalize_code(code))
}

pub fn external_key(provider: &str, subject: &str) -> String {
    format!("{}{}:{}", EXTERNAL_PREFIX, provider.trim().to_lowercase(), subject.trim())
}

/// Strips `prefix` from a scanned key.
pub fn key_suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
