//! CertMate - Main entry point
//!
//! Operator CLI for DNS-01 certificate automation.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{error, info, warn};

use certmate::acme::{CertError, CertbotRunner, CertificateOrchestrator, CertificateStore, RenewalScheduler};
use certmate::inspect::{check_deployment, CertificateInspector};
use certmate::providers::ProviderRegistry;
use certmate_common::generate_token;
use certmate_config::{AppConfig, SettingsStore, SettingsUpdate};

/// CertMate - DNS-01 certificate automation
/// Exit status when a create or renew is refused before certbot runs
const EXIT_REJECTED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "certmate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(long = "verbose", global = true)]
    verbose: bool,

    /// Log output format
    #[arg(
        long = "log-format",
        env = "CERTMATE_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Text,
        global = true
    )]
    log_format: LogFormat,

    /// Directory holding settings.json
    #[arg(long = "data-dir", global = true)]
    data_dir: Option<PathBuf>,

    /// Certificate store root
    #[arg(long = "cert-dir", global = true)]
    cert_dir: Option<PathBuf>,

    /// Root for per-domain certbot state
    #[arg(long = "acme-dir", global = true)]
    acme_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the renewal scheduler until interrupted
    Serve,
    /// Issue a certificate for a domain and its wildcard
    Create {
        domain: String,
        /// Account email (defaults to the configured email)
        #[arg(short = 'e', long = "email")]
        email: Option<String>,
        /// DNS provider (defaults to the domain's or the active provider)
        #[arg(short = 'p', long = "provider")]
        provider: Option<String>,
    },
    /// Renew a domain's certificate
    Renew { domain: String },
    /// Run one renewal sweep over all configured domains
    Sweep,
    /// Show expiry status of stored certificates
    Status {
        /// Single domain (defaults to every configured domain)
        domain: Option<String>,
    },
    /// Check which certificate a domain's HTTPS endpoint serves
    Check { domain: String },
    /// List DNS providers and whether they are configured
    Providers,
    /// Show or change settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Generate a secure API bearer token
    Token {
        /// Store the new token in settings
        #[arg(long = "rotate")]
        rotate: bool,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print settings with secrets masked
    Show,
    /// Merge a JSON settings update and save
    Set {
        /// Partial settings document, e.g. '{"email":"ops@example.org"}'
        json: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let mut config = AppConfig::from_env().context("Invalid CERTMATE_* configuration")?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.cert_dir {
        config.cert_dir = dir;
    }
    if let Some(dir) = cli.acme_dir {
        config.acme_dir = dir;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run(cli.command, config));
    if let Err(e) = &result {
        if rejected_upfront(e) {
            let message = format!("{e:#}");
            error!(error = %message, "Request rejected, certbot was not run");
            std::process::exit(EXIT_REJECTED);
        }
    }
    result
}

/// Whether the failure was invalid input or an unconfigured provider
fn rejected_upfront(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<CertError>())
        .any(CertError::is_rejected_upfront)
}

/// Logs go to stderr; stdout carries command output
fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Long-lived components built from the service configuration
struct Services {
    settings: SettingsStore,
    registry: Arc<ProviderRegistry>,
    inspector: CertificateInspector,
    orchestrator: CertificateOrchestrator,
}

impl Services {
    fn build(config: &AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

        let settings =
            SettingsStore::new(config.settings_path()).with_token_override(config.api_bearer_token.clone());
        let store = CertificateStore::new(&config.cert_dir).context("Failed to open certificate store")?;
        let registry = Arc::new(ProviderRegistry::new());
        let runner = CertbotRunner::new(config.certbot_bin.clone())
            .with_timeout(config.acme_timeout_secs.map(Duration::from_secs));

        let orchestrator = CertificateOrchestrator::new(
            Arc::clone(&registry),
            Arc::new(runner),
            store.clone(),
            &config.acme_dir,
            config.max_workers,
        );

        Ok(Self {
            settings,
            registry,
            inspector: CertificateInspector::new(store),
            orchestrator,
        })
    }
}

async fn run(command: Commands, config: AppConfig) -> Result<()> {
    let services = Services::build(&config)?;

    match command {
        Commands::Serve => serve(services, &config).await,
        Commands::Create {
            domain,
            email,
            provider,
        } => create(&services, &domain, email, provider).await,
        Commands::Renew { domain } => {
            services
                .orchestrator
                .renew(&domain)
                .await
                .with_context(|| format!("Renewal failed for {domain}"))?;
            print_json(&services.inspector.inspect(&domain, &services.settings.load()))
        }
        Commands::Sweep => {
            let scheduler = RenewalScheduler::from_expression(
                services.settings.clone(),
                services.inspector.clone(),
                services.orchestrator.clone(),
                &config.renewal_schedule,
            )?;
            print_json(&scheduler.run_sweep().await)
        }
        Commands::Status { domain } => {
            let settings = services.settings.load();
            let domains: Vec<String> = match domain {
                Some(domain) => vec![domain],
                None => settings.domains.iter().map(|entry| entry.domain.clone()).collect(),
            };
            let records: Vec<_> = domains
                .iter()
                .map(|domain| services.inspector.inspect(domain, &settings))
                .collect();
            print_json(&records)
        }
        Commands::Check { domain } => {
            let timeout = Duration::from_secs(config.deployment_timeout_secs);
            let status = check_deployment(&domain, timeout, Some(services.inspector.store())).await;
            print_json(&status)
        }
        Commands::Providers => print_json(&services.registry.describe(&services.settings.load())),
        Commands::Settings { command } => settings_command(&services.settings, command),
        Commands::Token { rotate } => {
            let token = generate_token();
            if rotate {
                let mut settings = services.settings.load();
                settings.api_bearer_token = token.clone();
                services.settings.save(&settings).context("Failed to save settings")?;
                info!("API bearer token rotated");
            }
            println!("{token}");
            Ok(())
        }
    }
}

async fn create(services: &Services, domain: &str, email: Option<String>, provider: Option<String>) -> Result<()> {
    let mut settings = services.settings.load();

    let email = email.unwrap_or_else(|| settings.email.clone());
    if email.is_empty() {
        bail!("No email given and none configured; pass --email or set it in settings");
    }

    // Fails before anything is written when the provider is not configured
    let prepared = services
        .orchestrator
        .prepare_create(domain, &email, provider.as_deref(), &settings)
        .with_context(|| format!("Cannot issue a certificate for {domain}"))?;

    let provider = provider.unwrap_or_else(|| settings.provider_for(&prepared.domain).to_string());
    if settings.track_domain(&prepared.domain, &provider) {
        settings = services.settings.save(&settings).context("Failed to record domain")?;
    }

    let domain = prepared.domain.clone();
    services
        .orchestrator
        .execute(prepared)
        .await
        .with_context(|| format!("Certificate issuance failed for {domain}"))?;

    print_json(&services.inspector.inspect(&domain, &settings))
}

fn settings_command(store: &SettingsStore, command: SettingsCommand) -> Result<()> {
    match command {
        SettingsCommand::Show => print_json(&SettingsStore::mask(&store.load())),
        SettingsCommand::Set { json } => {
            let update: SettingsUpdate = serde_json::from_str(&json).context("Invalid settings JSON")?;
            let mut settings = store.load();
            settings.apply(update);
            let saved = store.save(&settings).context("Settings rejected")?;
            print_json(&SettingsStore::mask(&saved))
        }
    }
}

async fn serve(services: Services, config: &AppConfig) -> Result<()> {
    let settings = services.settings.load();
    info!(
        settings = %services.settings.path().display(),
        domains = settings.domains.len(),
        auto_renew = settings.auto_renew,
        schedule = %config.renewal_schedule,
        "Starting CertMate"
    );

    let tracker = services.orchestrator.tracker().clone();
    let scheduler = RenewalScheduler::from_expression(
        services.settings,
        services.inspector,
        services.orchestrator,
        &config.renewal_schedule,
    )?;
    let handle = scheduler.start();

    wait_for_signal().await?;

    let grace = Duration::from_secs(config.shutdown_grace_secs);
    if !handle.shutdown(grace).await {
        warn!("Renewal sweep did not finish within the grace period");
    }
    if !tracker.wait_for_drain(grace).await {
        warn!(
            remaining = tracker.active_count(),
            "Exiting with certificate operations still running"
        );
    }

    info!("CertMate stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> Result<()> {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to wait for Ctrl-C");
        return Err(e.into());
    }
    info!("Received Ctrl-C");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}
