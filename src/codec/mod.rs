//! Storage key naming and identifier normalization.

pub mod keys;

pub use keys::{
    account_key, external_key, invite_key, normalize_code, normalize_handle, redeem_key,
    sanitize_handle, user_key,
};
