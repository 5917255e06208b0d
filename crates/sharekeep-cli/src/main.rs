//! sharekeep: key custody command-line tool
//!
//! Commands:
//!   keygen                                  - generate and SSS-split a project key
//!   split [--legacy]                        - split an existing key
//!   reconstruct --stored S --project P      - rebuild a key from its parts
//!   encrypt <plaintext>                     - encrypt a secret
//!   decrypt <ciphertext>                    - decrypt a secret
//!   selftest                                - run the custody flow in memory
//!   config show                             - display current configuration
//!
//! `split`, `encrypt` and `decrypt` take the key from `$SHAREKEEP_KEY`, or
//! from the first line of stdin when it is unset. Keys never go on argv.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

use sharekeep_core::config::SharekeepConfig;
use sharekeep_core::{Entropy, Project, ProjectRepository, Share};
use sharekeep_crypto::{generate_key, Cipher, ReconstructionStrategy, SplitKey};
use sharekeep_custody::{CustodyService, KeySource};

const KEY_ENV: &str = "SHAREKEEP_KEY";

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sharekeep",
    version,
    about = "sharekeep key custody tool",
    long_about = "sharekeep: split, rebuild and use project encryption keys held in two parts"
)]
struct Cli {
    /// Path to sharekeep.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SHAREKEEP_CONFIG",
        default_value = "/etc/sharekeep/config.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "SHAREKEEP_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "SHAREKEEP_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a project key and print its SSS parts as JSON
    Keygen,

    /// Split an existing base64 key into stored and project parts
    Split {
        /// Use the XOR scheme of pre-migration projects
        #[arg(long)]
        legacy: bool,
    },

    /// Rebuild a key from its stored and project parts
    Reconstruct {
        #[arg(long)]
        stored: String,
        #[arg(long)]
        project: String,
        /// Use the XOR scheme of pre-migration projects
        #[arg(long)]
        legacy: bool,
    },

    /// Encrypt a UTF-8 secret with a base64 key
    Encrypt {
        plaintext: String,
    },

    /// Decrypt a ciphertext produced by `encrypt`
    Decrypt {
        ciphertext: String,
    },

    /// Register a project, store and read back a share, all in memory
    Selftest,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn from_config(format: &str) -> Self {
        if format.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Serialize)]
struct PartsOutput<'a> {
    scheme: &'a str,
    stored_part: &'a str,
    project_part: &'a str,
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = load_config(&cli.config).await?;
    let config = loaded.clone().unwrap_or_default();

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| LogFormat::from_config(&config.log.format));
    init_logging(&level, &format);

    if loaded.is_none() {
        warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    match cli.command {
        Commands::Keygen => cmd_keygen(),
        Commands::Split { legacy } => cmd_split(&key_from_env_or_stdin()?, legacy),
        Commands::Reconstruct {
            stored,
            project,
            legacy,
        } => cmd_reconstruct(&stored, &project, legacy),
        Commands::Encrypt { plaintext } => cmd_encrypt(&key_from_env_or_stdin()?, &plaintext),
        Commands::Decrypt { ciphertext } => {
            cmd_decrypt(&key_from_env_or_stdin()?, &ciphertext)
        }
        Commands::Selftest => cmd_selftest(&config).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
    }
}

/// `None` when the file does not exist.
async fn load_config(path: &Path) -> Result<Option<SharekeepConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config: {}", path.display()))?;
    let config = toml::from_str(&content)
        .with_context(|| format!("parsing config: {}", path.display()))?;
    Ok(Some(config))
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn scheme(legacy: bool) -> ReconstructionStrategy {
    if legacy {
        ReconstructionStrategy::Legacy
    } else {
        ReconstructionStrategy::Sss
    }
}

fn render_parts(strategy: ReconstructionStrategy, parts: &SplitKey) -> Result<String> {
    serde_json::to_string_pretty(&PartsOutput {
        scheme: strategy.name(),
        stored_part: &parts.stored_part,
        project_part: &parts.project_part,
    })
    .context("serializing key parts")
}

fn key_from_env_or_stdin() -> Result<Zeroizing<String>> {
    read_key(std::env::var(KEY_ENV).ok(), std::io::stdin().lock())
}

/// `from_env` wins when set and non-empty; otherwise the first line of `input`.
fn read_key(from_env: Option<String>, mut input: impl BufRead) -> Result<Zeroizing<String>> {
    let from_env = Zeroizing::new(from_env.unwrap_or_default());
    if !from_env.trim().is_empty() {
        return Ok(Zeroizing::new(from_env.trim().to_string()));
    }

    let mut line = Zeroizing::new(String::new());
    input.read_line(&mut line).context("reading key from stdin")?;
    let key = line.trim();
    anyhow::ensure!(!key.is_empty(), "no key given: set {KEY_ENV} or pipe the key on stdin");
    Ok(Zeroizing::new(key.to_string()))
}

// ── Key commands ───────────────────────────────────────────────────────────────

fn cmd_keygen() -> Result<()> {
    let key = generate_key();
    let parts = ReconstructionStrategy::Sss
        .split(&key)
        .context("splitting generated key")?;
    println!("{}", render_parts(ReconstructionStrategy::Sss, &parts)?);
    Ok(())
}

fn cmd_split(key: &str, legacy: bool) -> Result<()> {
    let strategy = scheme(legacy);
    let parts = strategy.split(key).context("splitting key")?;
    println!("{}", render_parts(strategy, &parts)?);
    Ok(())
}

fn cmd_reconstruct(stored: &str, project: &str, legacy: bool) -> Result<()> {
    let key = scheme(legacy)
        .reconstruct(stored, project)
        .context("reconstructing key")?;
    println!("{key}");
    Ok(())
}

fn cmd_encrypt(key: &str, plaintext: &str) -> Result<()> {
    let cipher = Cipher::new(key).context("loading key")?;
    println!("{}", cipher.encrypt(plaintext).context("encrypting")?);
    Ok(())
}

fn cmd_decrypt(key: &str, ciphertext: &str) -> Result<()> {
    let cipher = Cipher::new(key).context("loading key")?;
    println!("{}", cipher.decrypt(ciphertext).context("decrypting")?);
    Ok(())
}

// ── `sharekeep selftest` ──────────────────────────────────────────────────────

async fn cmd_selftest(config: &SharekeepConfig) -> Result<()> {
    let cancel = CancellationToken::new();
    let service = CustodyService::in_memory(config);

    let project = Project::new("selftest", "ak_selftest", "as_selftest");
    let project_id = project.id.clone();
    service
        .projects()
        .create(&cancel, project)
        .await
        .context("creating project")?;

    let project_part = service
        .register_encryption_key(&cancel, &project_id)
        .await
        .context("registering encryption key")?;

    let session = KeySource::Session(
        service
            .register_encryption_session(&project_part)
            .await
            .context("registering session")?,
    );
    let stored = service
        .create_share(
            &cancel,
            &project_id,
            Share::new(&project_id, "selftest-secret", Entropy::Project).with_user("usr_selftest"),
            Some(&session),
        )
        .await
        .context("creating share")?;

    let fetched = service
        .get_share_by_user(
            &cancel,
            &project_id,
            "usr_selftest",
            Some(&KeySource::Plain(project_part)),
        )
        .await
        .context("reading share back")?;

    anyhow::ensure!(
        fetched.secret == "selftest-secret",
        "share did not round-trip through custody"
    );
    anyhow::ensure!(
        stored.secret != fetched.secret,
        "share was stored in plaintext"
    );

    info!(%project_id, "selftest passed");
    println!("ok");
    Ok(())
}

// ── `sharekeep config show` ───────────────────────────────────────────────────

fn cmd_config_show(config: &SharekeepConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
