//! CLI handlers for config subcommands.

use anyhow::{bail, Context, Result};
use std::fs;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use crate::common::config::{config_path, AppConfig};

fn defaults_toml() -> Result<String> {
    toml::to_string_pretty(&AppConfig::default()).context("Failed to serialize default config")
}

/// Print resolved config file path.
pub fn run_config_path() -> Result<()> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    writeln!(output, "{}", config_path().display())?;
    Ok(())
}

/// Print config file contents or default-config guidance when missing.
pub fn run_config_show() -> Result<()> {
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let stderr = std::io::stderr();
    let mut err_output = stderr.lock();
    show_config_with_io(&config_path(), &mut output, &mut err_output)
}

/// Reset config to defaults (with confirmation).
pub fn run_config_reset(yes: bool) -> Result<bool> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let stdout = std::io::stdout();
    let mut output = stdout.lock();
    let interactive = std::io::stdin().is_terminal();

    reset_config_with_io(&config_path(), yes, interactive, &mut input, &mut output)
}

/// Stream config file contents (fallback guidance when missing).
fn show_config_with_io(
    path: &Path,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<()> {
    if path.exists() {
        let mut file = fs::File::open(path)
            .with_context(|| format!("Failed to open config file {}", path.display()))?;
        std::io::copy(&mut file, stdout)?;
    } else {
        writeln!(stderr, "No config file found at {}", path.display())?;
        writeln!(
            stderr,
            "Using default settings. Create {} to override defaults.",
            path.display()
        )?;
    }

    Ok(())
}

/// Reset config to defaults, enforcing confirmation in interactive mode.
fn reset_config_with_io(
    path: &Path,
    yes: bool,
    interactive: bool,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<bool> {
    if !yes {
        if !interactive {
            bail!("Refusing to reset config in non-interactive mode. Use --yes");
        }

        write!(
            output,
            "Reset config to application defaults at {}? [y/N]: ",
            path.display()
        )?;
        output.flush()?;

        let mut response = String::new();
        input.read_line(&mut response)?;
        let confirmed = matches!(response.trim().to_ascii_lowercase().as_str(), "y" | "yes");
        if !confirmed {
            writeln!(output, "Reset cancelled. Existing config unchanged.")?;
            return Ok(false);
        }
    }

    let text = defaults_toml()?;
    atomic_write(path, &text)?;
    writeln!(output, "Config reset to defaults: {}", path.display())?;
    Ok(true)
}

/// Atomically replace a config file with new contents.
fn atomic_write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }

    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("Failed to write temporary file {}", tmp_path.display()))?;

    let file = fs::OpenOptions::new()
        .write(true)
        .open(&tmp_path)
        .with_context(|| format!("Failed to reopen temporary file {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync temporary file {}", tmp_path.display()))?;

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "Failed to replace config file {} from {}",
            path.display(),
            tmp_path.display()
        )
    })?;

    Ok(())
}

/// Build a unique temp path next to the target config file.
fn temp_path_for(path: &Path) -> PathBuf {
    let base_name = path
        .file_name()
        .and_then(|x| x.to_str())
        .unwrap_or("config.toml");
    let tmp_name = format!(".{base_name}.{}.tmp", std::process::id());
    path.with_file_name(tmp_name)
}
