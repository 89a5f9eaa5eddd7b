mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use archconv::auth::{AuthStore, TokenLifecycle};
use archconv::common::config::{apply_overrides, load_config, ConfigOverrides};
use archconv::common::{config_commands, NotificationSink};
use archconv::transport::ApiClient;
use archconv::workflow::ConversionSession;

#[derive(Parser)]
#[command(name = "archconv")]
#[command(about = "Archive conversion workflow client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one conversion workflow: scan, convert, download, cleanup
    Convert {
        #[arg(help = "Path to archive to convert")]
        file: PathBuf,
        #[arg(long, help = "Backend account username")]
        username: String,
        #[arg(long, help = "Output format (defaults to config)")]
        format: Option<String>,
        #[arg(long, help = "Directory to save downloads into")]
        output: Option<PathBuf>,
        #[arg(long, help = "Backend base URL")]
        base_url: Option<String>,
    },
    /// Inspect or manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the resolved config file path
    Path,
    /// Print the config file contents
    Show,
    /// Reset the config file to defaults
    Reset {
        #[arg(long, help = "Skip the confirmation prompt")]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Convert {
            file,
            username,
            format,
            output,
            base_url,
        } => run_convert(file, username, format, output, base_url).await,
        Commands::Config { command } => match command {
            ConfigCommands::Path => config_commands::run_config_path(),
            ConfigCommands::Show => config_commands::run_config_show(),
            ConfigCommands::Reset { yes } => config_commands::run_config_reset(yes).map(|_| ()),
        },
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

async fn run_convert(
    file: PathBuf,
    username: String,
    format: Option<String>,
    output: Option<PathBuf>,
    base_url: Option<String>,
) -> Result<()> {
    // Fail fast before touching the network
    if !file.exists() {
        bail!("File not found: {}", file.display());
    }

    let password = std::env::var("ARCHCONV_PASSWORD")
        .context("Set ARCHCONV_PASSWORD to the backend account password")?;

    let overrides = ConfigOverrides {
        base_url,
        output_dir: output,
        output_format: format,
    };
    let config = apply_overrides(load_config()?, &overrides);

    let notices = NotificationSink::new(Duration::from_secs(config.workflow.notice_ttl_secs));
    let api = Arc::new(ApiClient::new(&config.api, AuthStore::new(), notices.clone())?);
    let auth = TokenLifecycle::new(api.clone());
    let session = ConversionSession::new(api, notices.clone(), &config);

    let login_spinner = output::spinner("Logging in...");
    match auth.login(&username, &password).await {
        Ok(_) => output::finish_spinner_success(&login_spinner, "Logged in"),
        Err(err) => {
            output::finish_spinner_error(&login_spinner, "Login failed");
            bail!(err);
        }
    }

    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("archive.zip")
        .to_string();
    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    session.add_file(filename, bytes);

    let scan_spinner = output::spinner("Scanning archive...");
    if let Err(err) = session.scan().await {
        output::finish_spinner_error(&scan_spinner, "Scan failed");
        auth.logout().await;
        bail!(err);
    }
    let state = session.snapshot();
    let summary = state.summary.unwrap_or_default();
    output::finish_spinner_success(
        &scan_spinner,
        &format!(
            "Scanned {} group(s), {} file(s)",
            summary.total_groups, summary.total_files
        ),
    );

    let convert_spinner = output::spinner("Converting...");
    if let Err(err) = session.convert().await {
        output::finish_spinner_error(&convert_spinner, "Conversion failed");
        auth.logout().await;
        bail!(err);
    }
    let state = session.snapshot();
    output::finish_spinner_success(
        &convert_spinner,
        &format!("Converted {} file(s)", state.total_files),
    );

    let download_spinner = output::spinner("Downloading converted archive...");
    match session.download_all().await {
        Ok(Some(path)) => output::finish_spinner_success(
            &download_spinner,
            &format!("Saved {}", path.display()),
        ),
        Ok(None) => output::finish_spinner_error(&download_spinner, "No active session"),
        Err(err) => {
            output::finish_spinner_error(&download_spinner, "Download failed");
            auth.logout().await;
            bail!(err);
        }
    }

    let cleanup_spinner = output::spinner("Cleaning up session...");
    match session.cleanup().await {
        Ok(()) => output::finish_spinner_success(&cleanup_spinner, "Session cleaned up"),
        // Cleanup failure leaves server artifacts; report it but finish the run.
        Err(err) => output::finish_spinner_error(&cleanup_spinner, &format!("Cleanup failed: {err}")),
    }

    auth.logout().await;

    for notice in notices.active() {
        eprintln!("{}", notice.message);
    }

    Ok(())
}
