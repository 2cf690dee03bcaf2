//! Secret generation, storage and redaction.
//!
//! The administrator password minted for a new VM never leaves this process
//! except in two places: the body of the Key Vault write and the VM create
//! request. Everywhere else it is a [`SensitiveString`].
//!
//! ## Architecture
//!
//! ```text
//! +-------------------+      +-------------------+
//! | PasswordGenerator |----->| SensitiveString   |
//! | (OsRng)           |      +-------------------+
//! +-------------------+          |          |
//!                                v          v
//!                  +----------------+  +---------------+
//!                  | SecretStore    |  | NoLogRegistry |
//!                  | (trait)        |  | (redaction)   |
//!                  +----------------+  +---------------+
//!                          ^
//!                          |
//!                  +----------------+
//!                  | Key Vault      |
//!                  +----------------+
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use azvm::secrets::{NoLogRegistry, PasswordGenerator};
//!
//! let registry = NoLogRegistry::new();
//! let password = PasswordGenerator::default().generate();
//! registry.register_sensitive(&password);
//!
//! let line = format!("generated {}", password.expose());
//! assert_eq!(registry.redact(&line), "generated [REDACTED]");
//! ```

mod error;
mod generator;
mod key_vault;
mod no_log;
mod store;

pub use error::{SecretError, SecretResult};
pub use generator::{
    character_classes, PasswordGenerator, PasswordPolicy, DEFAULT_ALPHABET,
    DEFAULT_MIN_CHARACTER_CLASSES, DEFAULT_PASSWORD_LENGTH,
};
pub use key_vault::{KeyVaultSecretStore, KEY_VAULT_API_VERSION};
pub use no_log::{
    serialize_exposed, NoLogRegistry, RedactingMakeWriter, RedactingWriter, SensitiveString,
};
pub use store::{SecretMetadata, SecretStore};
