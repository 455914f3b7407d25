//! Security core: envelope encryption, authentication and sessions, an
//! append-only audit trail, pluggable access control and a threat monitor,
//! all driven by `SecurityManager`.

pub mod config;
pub mod error;
pub mod manager;
pub mod store;
pub mod worker;

pub mod crypto {
    pub mod aes;
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod audit;
    pub mod envelope;
    pub mod key;
    pub mod session;
    pub mod status;
    pub mod threat;
    pub mod user;
}

pub mod services {
    pub mod access;
    pub mod audit;
    pub mod auth;
    pub mod encryption;
    pub mod governance;
}

pub mod validation {
    pub mod auth;
}

pub use config::SecurityConfig;
pub use error::{AuthFailure, Result, SecurityError, TokenFailure};
pub use manager::{SecurityManager, SecurityManagerBuilder};
pub use store::{MemoryStore, Store};
