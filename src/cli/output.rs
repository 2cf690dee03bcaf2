//! Output formatting module for azvm
//!
//! Human-readable progress lines or a single JSON document. Every line passes
//! through the no-log registry before it is printed.

use colored::Colorize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use azvm::error::{Error, ErrorHints, LeftBehind};
use azvm::provisioner::{CreatedResource, ProvisionObserver, ProvisionReport, ProvisionStep};
use azvm::secrets::{NoLogRegistry, SecretMetadata};
use azvm::Vault;

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
    /// Values that must never be printed
    registry: Arc<NoLogRegistry>,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(
        use_color: bool,
        json_mode: bool,
        verbosity: u8,
        registry: Arc<NoLogRegistry>,
    ) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
            registry,
        }
    }

    fn out(&self, line: &str) {
        println!("{}", self.registry.redact(line));
    }

    fn err(&self, line: &str) {
        eprintln!("{}", self.registry.redact(line));
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            self.out(&format!("\n{}", line.bright_blue()));
            self.out(&format!("{}", format!("  {}  ", title).bright_blue().bold()));
            self.out(&format!("{}\n", line.bright_blue()));
        } else {
            self.out(&format!("\n{}", line));
            self.out(&format!("  {}  ", title));
            self.out(&format!("{}\n", line));
        }
    }

    /// Render a progress line. Shown at every verbosity, never in JSON mode.
    pub fn render_info(&self, message: &str) -> Option<String> {
        if self.json_mode {
            return None;
        }
        Some(if self.use_color {
            format!("{} {}", "=>".bright_black(), message)
        } else {
            format!("=> {}", message)
        })
    }

    /// Print a progress line.
    pub fn info(&self, message: &str) {
        if let Some(line) = self.render_info(message) {
            self.out(&line);
        }
    }

    /// Print a debug message, shown from -vv
    pub fn debug(&self, message: &str) {
        if self.json_mode || self.verbosity < 2 {
            return;
        }
        if self.use_color {
            self.err(&format!("{} {}", "DEBUG:".bright_black(), message.bright_black()));
        } else {
            self.err(&format!("DEBUG: {}", message));
        }
    }

    /// Render the line printed when a resource is created.
    pub fn render_created(&self, resource: &CreatedResource) -> String {
        let label = format!("[{}]", resource.step);
        if self.use_color {
            format!("{}: {} {}", "created".green(), label.bright_white().bold(), resource.name)
        } else {
            format!("created: {} {}", label, resource.name)
        }
    }

    /// Render the final summary of a successful run.
    pub fn render_report(&self, report: &ProvisionReport) -> String {
        if self.json_mode {
            let document = serde_json::json!({
                "status": "succeeded",
                "report": report,
            });
            return serde_json::to_string_pretty(&document).unwrap_or_default();
        }

        let mut lines = Vec::new();
        let header = "SUMMARY";
        lines.push(format!(
            "\n{} {}",
            header,
            "*".repeat(60_usize.saturating_sub(header.len()))
        ));
        lines.push(format!("{:<16} {}", "region:", report.region));
        lines.push(format!("{:<16} {}", "key vault:", report.vault_name));
        lines.push(format!("{:<16} {}", "secret:", describe_secret(&report.secret)));
        for resource in &report.resources {
            lines.push(format!("{:<16} {}", format!("{}:", resource.step), resource.id));
        }
        lines.push(format!(
            "{:<16} {}",
            "vm state:",
            report.vm.provisioning_state.as_deref().unwrap_or("unknown")
        ));
        lines.push(format!(
            "\nProvisioning took {}",
            format_duration(self.start_time.elapsed())
        ));

        let done = format!("VM {} created.", report.vm.name);
        lines.push(if self.use_color {
            done.green().bold().to_string()
        } else {
            done
        });
        lines.join("\n")
    }

    /// Print the final summary of a successful run.
    pub fn report(&self, report: &ProvisionReport) {
        self.out(&self.render_report(report));
    }

    /// Render a failed run: the error, operator hints and what was left behind.
    pub fn render_failure(&self, error: &Error) -> String {
        let (step, left_behind): (Option<ProvisionStep>, &[CreatedResource]) = match error {
            Error::Step {
                step, left_behind, ..
            } => (Some(*step), left_behind.as_slice()),
            _ => (None, &[]),
        };

        if self.json_mode {
            let document = serde_json::json!({
                "status": "failed",
                "step": step,
                "error": error.to_string(),
                "hints": ErrorHints::get_hints(error),
                "left_behind": left_behind,
            });
            return serde_json::to_string_pretty(&document).unwrap_or_default();
        }

        let mut text = ErrorHints::format_with_hints(error);
        if step.is_some() {
            text.push_str("\n\nLeft behind (not rolled back):\n");
            for line in LeftBehind(left_behind).to_string().lines() {
                text.push_str(&format!("  {}\n", line));
            }
        }
        if self.use_color {
            text.red().to_string()
        } else {
            text
        }
    }

    /// Print a failed run. JSON goes to stdout, text to stderr.
    pub fn failure(&self, error: &Error) {
        let rendered = self.render_failure(error);
        if self.json_mode {
            self.out(&rendered);
        } else {
            self.err(&rendered);
        }
    }
}

impl ProvisionObserver for OutputFormatter {
    fn step_started(&self, step: ProvisionStep) {
        self.debug(&format!("starting {}", step));
        if step == ProvisionStep::VirtualMachine {
            self.info("Provisioning the VM; this operation may take a few minutes!");
        }
    }

    fn vault_resolved(&self, vault: &Vault) {
        self.info(&format!(
            "Using existing Key Vault {} in the region {}",
            vault.name, vault.location
        ));
    }

    fn secret_stored(&self, metadata: &SecretMetadata) {
        self.info(&format!(
            "Password stored in Key Vault: {}",
            describe_secret(metadata)
        ));
    }

    fn resource_created(&self, resource: &CreatedResource) {
        if self.json_mode {
            return;
        }
        self.out(&self.render_created(resource));
    }
}

fn describe_secret(metadata: &SecretMetadata) -> String {
    match &metadata.version {
        Some(version) => format!("{} (version {})", metadata.name, version),
        None => metadata.name.clone(),
    }
}

/// Format a duration for display
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:03}s", secs, millis)
    }
}
