//! Interactive fallback for missing VM inputs.
//!
//! Prompts only when stdin is a terminal; otherwise a missing value is a
//! usage error.

use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Input};
use is_terminal::IsTerminal;

use azvm::azure::ImageReference;
use azvm::provisioner::{validate_admin_username, validate_computer_name, VmRequest};

/// Prompt session state
pub struct InteractiveSession {
    theme: ColorfulTheme,
}

impl Default for InteractiveSession {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractiveSession {
    /// Create a new interactive session
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }

    /// True when stdin is attached to a terminal.
    pub fn is_available() -> bool {
        std::io::stdin().is_terminal()
    }

    fn prompt<V>(&self, prompt: &str, validate: V) -> Result<String>
    where
        V: Fn(&str) -> azvm::Result<()>,
    {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(prompt)
            .validate_with(|input: &String| -> std::result::Result<(), String> {
                validate(input.trim()).map_err(|e| e.to_string())
            })
            .interact_text()
            .map(|value| value.trim().to_string())
            .with_context(|| format!("failed to read '{}'", prompt))
    }

    /// Prompt for the VM name, checked against the computer name rules of `image`
    pub fn vm_name(&self, image: &ImageReference) -> Result<String> {
        self.prompt("Enter VM name", |name| validate_computer_name(name, image))
    }

    /// Prompt for the administrator username
    pub fn admin_username(&self) -> Result<String> {
        self.prompt("Enter Username", validate_admin_username)
    }
}

/// Build the request from flags, prompting for whatever is missing.
pub fn resolve_request(
    vm_name: Option<String>,
    admin_username: Option<String>,
    image: &ImageReference,
) -> Result<VmRequest> {
    if let (Some(vm_name), Some(admin_username)) = (&vm_name, &admin_username) {
        return Ok(VmRequest::new(vm_name.clone(), admin_username.clone()));
    }

    if !InteractiveSession::is_available() {
        let missing: Vec<&str> = [
            vm_name.is_none().then_some("--vm-name"),
            admin_username.is_none().then_some("--admin-username"),
        ]
        .into_iter()
        .flatten()
        .collect();
        bail!(MissingInput(missing.join(" and ")));
    }

    let session = InteractiveSession::new();
    let vm_name = match vm_name {
        Some(name) => name,
        None => session.vm_name(image)?,
    };
    let admin_username = match admin_username {
        Some(user) => user,
        None => session.admin_username()?,
    };
    Ok(VmRequest::new(vm_name, admin_username))
}

/// Required input missing and no terminal to prompt on.
#[derive(Debug, thiserror::Error)]
#[error("{0} is required when stdin is not a terminal")]
pub struct MissingInput(pub String);
