//! Operator input and naming rules.

use serde::{Deserialize, Serialize};

use crate::azure::ImageReference;
use crate::error::{Error, Result};
use crate::secrets::SensitiveString;

/// Maximum VM name length.
pub const MAX_VM_NAME_LEN: usize = 64;

/// Maximum computer name length on Windows images.
pub const MAX_WINDOWS_COMPUTER_NAME_LEN: usize = 15;

/// Maximum administrator username length.
pub const MAX_ADMIN_USERNAME_LEN: usize = 20;

/// Maximum administrator password length accepted by the VM API.
pub const MAX_ADMIN_PASSWORD_LEN: usize = 123;

/// Usernames Azure refuses for the administrator account.
const RESERVED_USERNAMES: &[&str] = &[
    "1",
    "123",
    "a",
    "actuser",
    "adm",
    "admin",
    "admin1",
    "admin2",
    "administrator",
    "aspnet",
    "backup",
    "console",
    "david",
    "guest",
    "john",
    "owner",
    "root",
    "server",
    "sql",
    "support",
    "support_388945a0",
    "sys",
    "test",
    "test1",
    "test2",
    "test3",
    "user",
    "user1",
    "user2",
    "user3",
    "user4",
    "user5",
];

/// What the operator asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmRequest {
    /// VM name, also used as the guest computer name
    pub vm_name: String,
    /// Administrator account name
    pub admin_username: String,
}

impl VmRequest {
    /// Create a request.
    pub fn new(vm_name: impl Into<String>, admin_username: impl Into<String>) -> Self {
        Self {
            vm_name: vm_name.into(),
            admin_username: admin_username.into(),
        }
    }

    /// Check both names against the VM resource rules.
    pub fn validate(&self) -> Result<()> {
        validate_vm_name(&self.vm_name)?;
        validate_admin_username(&self.admin_username)
    }

    /// Check both names, including the computer name rules of `image`.
    pub fn validate_for(&self, image: &ImageReference) -> Result<()> {
        validate_computer_name(&self.vm_name, image)?;
        validate_admin_username(&self.admin_username)
    }
}

/// Check a VM name against the Compute naming rules.
pub fn validate_vm_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidInput("VM name must not be empty".into()));
    }
    if name.chars().count() > MAX_VM_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "VM name must be at most {} characters",
            MAX_VM_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::InvalidInput(format!(
            "VM name contains invalid character '{}'",
            c
        )));
    }
    if name.starts_with('_') {
        return Err(Error::InvalidInput(
            "VM name must not start with '_'".into(),
        ));
    }
    if name.ends_with('.') || name.ends_with('-') {
        return Err(Error::InvalidInput(
            "VM name must not end with '.' or '-'".into(),
        ));
    }
    Ok(())
}

/// Check a VM name that also becomes the guest computer name of `image`.
pub fn validate_computer_name(name: &str, image: &ImageReference) -> Result<()> {
    validate_vm_name(name)?;
    if image.is_windows() {
        validate_windows_computer_name(name)?;
    }
    Ok(())
}

/// Check a Windows computer name: at most 15 characters, letters, digits
/// and `-` only, not all digits.
pub fn validate_windows_computer_name(name: &str) -> Result<()> {
    if name.chars().count() > MAX_WINDOWS_COMPUTER_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "VM name '{}' is used as the Windows computer name, which is limited to {} characters",
            name, MAX_WINDOWS_COMPUTER_NAME_LEN
        )));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(Error::InvalidInput(format!(
            "Windows computer names cannot contain '{}'",
            c
        )));
    }
    if name.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidInput(
            "Windows computer names cannot be entirely numeric".into(),
        ));
    }
    Ok(())
}

/// Check an administrator username.
pub fn validate_admin_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::InvalidInput("username must not be empty".into()));
    }
    if username.chars().count() > MAX_ADMIN_USERNAME_LEN {
        return Err(Error::InvalidInput(format!(
            "username must be at most {} characters",
            MAX_ADMIN_USERNAME_LEN
        )));
    }
    if username.ends_with('.') {
        return Err(Error::InvalidInput("username must not end with '.'".into()));
    }
    if username.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidInput(
            "username must not contain whitespace".into(),
        ));
    }
    let lower = username.to_ascii_lowercase();
    if RESERVED_USERNAMES.contains(&lower.as_str()) {
        return Err(Error::InvalidInput(format!(
            "username '{}' is reserved by Azure",
            username
        )));
    }
    Ok(())
}

/// Check a password against the VM `adminPassword` field: non-empty and at
/// most [`MAX_ADMIN_PASSWORD_LEN`] characters.
pub fn validate_admin_password(password: &SensitiveString) -> Result<()> {
    if password.is_empty() {
        return Err(Error::InvalidInput("generated password is empty".into()));
    }
    let length = password.char_count();
    if length > MAX_ADMIN_PASSWORD_LEN {
        return Err(Error::InvalidInput(format!(
            "generated password has {} characters; the VM API accepts at most {}",
            length, MAX_ADMIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
