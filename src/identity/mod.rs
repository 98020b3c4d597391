//! User identities: password and external-provider logins, registration
//! gated by invite codes, and the ban flag.

pub mod manager;
pub mod model;

pub use manager::IdentityManager;
pub use model::{
    BCRYPT_MAX_COST, BCRYPT_MIN_COST,
    ExternalIdentity, ExternalLink, ExternalLogin, Registration, RegistrationSettings, UserProfile,
    UserRecord,
};
