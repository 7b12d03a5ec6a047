//! `pinkeeper config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use pinkeeper_core::config::PinkeeperConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const REDACTED: &str = "***REDACTED***";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => execute_validate(config_path, writer).await,
        ConfigAction::Show { section } => execute_show(config_path, section, writer).await,
    }
}

/// Execute the config validate subcommand.
///
/// A missing file is valid: every setting has a default.
///
/// # Errors
///
/// Returns `CliError::Config` if the file cannot be parsed or a value is invalid.
async fn execute_validate(config_path: &Path, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %config_path.display(), "validating configuration");

    let report = match PinkeeperConfig::load_or_default(config_path).await {
        Ok(_) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: true,
            errors: Vec::new(),
        },
        Err(e) => ConfigValidationReport {
            source: config_path.display().to_string(),
            valid: false,
            errors: vec![e.to_string()],
        },
    };

    writer.render(&report)?;

    if !report.valid {
        return Err(CliError::Config("configuration is invalid".to_owned()));
    }

    Ok(())
}

/// Execute the config show subcommand.
///
/// Displays the effective configuration (file + env overrides + defaults)
/// with provider tokens redacted.
async fn execute_show(
    config_path: &Path,
    section: Option<String>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let mut config = PinkeeperConfig::load_or_default(config_path).await?;
    redact_tokens(&mut config);

    let rendered = match section.as_deref() {
        None => toml::to_string_pretty(&config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("workspace") => toml::to_string_pretty(&config.workspace),
        Some("security") => toml::to_string_pretty(&config.security),
        Some("mode") => toml::to_string_pretty(&config.mode),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: general, workspace, security, mode)",
                other
            )));
        }
    };

    let report = ConfigReport {
        source: config_path.display().to_string(),
        section,
        config_toml: rendered.map_err(|e| CliError::Command(format!("cannot render config: {e}")))?,
    };
    writer.render(&report)?;

    Ok(())
}

/// Replace provider tokens so that `config show` output is safe to paste.
fn redact_tokens(config: &mut PinkeeperConfig) {
    for provider in &mut config.security.providers {
        if provider.token.is_some() {
            provider.token = Some(REDACTED.to_owned());
        }
    }
}

/// Configuration display report.
///
/// The `config_toml` field is skipped during JSON serialization (only used for text rendering).
#[derive(Serialize)]
pub struct ConfigReport {
    /// Configuration file path
    pub source: String,
    /// Optional section name (None = full config)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    /// Serialized TOML configuration
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(w, "# {} [{}]", self.source.bold(), section)?,
            None => writeln!(w, "# {}", self.source.bold())?,
        }
        write!(w, "{}", self.config_toml)?;
        Ok(())
    }
}

/// Configuration validation report.
#[derive(Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        if self.valid {
            writeln!(w, "{} {}", "valid:".green().bold(), self.source)?;
        } else {
            writeln!(w, "{} {}", "invalid:".red().bold(), self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {}", error)?;
            }
        }
        Ok(())
    }
}
