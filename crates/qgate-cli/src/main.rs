//! qgate CLI - Command-line interface
//!
//! Usage:
//!   qgate check --config qgate.toml --key <key> --op write --collection products
//!   qgate keys list --config qgate.toml
//!   qgate keys generate --name products --read --write --collections products
//!   qgate keys revoke --config qgate.toml --name products
//!   qgate validate --config qgate.toml

use anyhow::{bail, Context};
use base64::Engine;
use clap::{Parser, Subcommand};
use qgate_core::{
    build_evaluator, AccessRequest, AppConfig, KeySet, MemoryAuditSink, Operation,
};
use rand::Rng;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "qgate")]
#[command(about = "API-key authorization gateway for vector databases")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one request against the configured keys
    Check {
        /// Path to the TOML configuration
        #[arg(long)]
        config: PathBuf,
        /// Key to evaluate
        #[arg(long)]
        key: String,
        /// Operation kind (read or write)
        #[arg(long)]
        op: Operation,
        /// Target collection; omit for instance-level operations
        #[arg(long)]
        collection: Option<String>,
    },
    /// Inspect or create API keys
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Load the configuration and key set, reporting any error
    Validate {
        /// Path to the TOML configuration
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// List configured keys (fingerprints only)
    List {
        #[arg(long)]
        config: PathBuf,
    },
    /// Generate a new random key and print its config table
    Generate {
        /// Label for the key
        #[arg(long)]
        name: Option<String>,
        /// Allow read access
        #[arg(long)]
        read: bool,
        /// Allow write access
        #[arg(long)]
        write: bool,
        /// Allowed collections (space-separated); all if omitted
        #[arg(long, num_args = 1..)]
        collections: Option<Vec<String>>,
    },
    /// Remove a key from the configuration file.
    ///
    /// The file is rewritten without comments. Send SIGHUP to a running
    /// gateway afterwards.
    Revoke {
        #[arg(long)]
        config: PathBuf,
        /// Label of the key (its `[auth.keys.<name>]` table)
        #[arg(long)]
        name: String,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            config,
            key,
            op,
            collection,
        } => check(config, key, op, collection),
        Commands::Keys { action } => match action {
            KeysAction::List { config } => {
                list_keys(config)?;
                Ok(ExitCode::SUCCESS)
            }
            KeysAction::Generate {
                name,
                read,
                write,
                collections,
            } => {
                if !read && !write {
                    bail!("a key needs --read and/or --write");
                }
                let name = name.unwrap_or_else(default_key_name);
                print!("{}", key_table(&name, &generate_key(), read, write, collections)?);
                Ok(ExitCode::SUCCESS)
            }
            KeysAction::Revoke { config, name } => {
                let source = std::fs::read_to_string(&config)
                    .with_context(|| format!("Failed to read {}", config.display()))?;
                let (rewritten, fingerprint) = revoke_key(&source, &name)?;
                std::fs::write(&config, rewritten)
                    .with_context(|| format!("Failed to write {}", config.display()))?;
                println!("Revoked key '{name}' ({fingerprint})");
                println!("Send SIGHUP to the running gateway to apply the change");
                Ok(ExitCode::SUCCESS)
            }
        },
        Commands::Validate { config } => {
            let config = load(config)?;
            config.validate()?;
            let keys = KeySet::from_config(&config.auth.keys)?;
            println!(
                "Configuration OK: {} key(s), instance scope policy: {:?}",
                keys.len(),
                config.auth.instance_scope
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load(path: PathBuf) -> anyhow::Result<AppConfig> {
    let display = path.display().to_string();
    AppConfig::load(Some(path)).with_context(|| format!("Failed to load {display}"))
}

fn check(
    config: PathBuf,
    key: String,
    op: Operation,
    collection: Option<String>,
) -> anyhow::Result<ExitCode> {
    let config = load(config)?;
    let sink = Arc::new(MemoryAuditSink::new());
    let evaluator = build_evaluator(&config.auth, sink)?;

    let mut request = AccessRequest::new(key, op);
    request.collection = collection;

    let verdict = evaluator.authorize(&request);
    let label = verdict
        .key
        .as_ref()
        .map(|k| k.name.clone().unwrap_or_else(|| k.key_id.clone()))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{} (key: {label}, operation: {op}, collection: {})",
        verdict.decision,
        request.collection.as_deref().unwrap_or("<instance>")
    );

    if verdict.decision.is_allowed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn list_keys(config: PathBuf) -> anyhow::Result<()> {
    let config = load(config)?;
    let keys = KeySet::from_config(&config.auth.keys)?;

    println!("Found {} API key(s):", keys.len());
    for record in keys.records() {
        println!(
            "  {:<16} {}  {:<10} {}",
            record.display_name(),
            record.key.fingerprint(),
            record.policy.permissions.to_string(),
            record.policy.scope
        );
    }
    Ok(())
}

/// Random 32-byte key, URL-safe base64 without padding
fn generate_key() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn default_key_name() -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("key-{suffix:08x}")
}

/// Drop `[auth.keys.<name>]` from a config document.
///
/// Returns the rewritten document and the removed key's fingerprint. The
/// result must still load, so revoking the last key is refused.
fn revoke_key(source: &str, name: &str) -> anyhow::Result<(String, String)> {
    let mut root: toml::Table = toml::from_str(source).context("Failed to parse configuration")?;

    let keys = root
        .get_mut("auth")
        .and_then(|auth| auth.get_mut("keys"))
        .and_then(|keys| keys.as_table_mut())
        .context("No [auth.keys] section in configuration")?;

    let removed = keys
        .remove(name)
        .with_context(|| format!("No key named '{name}'"))?;
    let fingerprint = removed
        .get("key")
        .and_then(|key| key.as_str())
        .map(qgate_core::key::fingerprint)
        .unwrap_or_else(|| "-".to_string());

    let rewritten = toml::to_string(&root).context("Failed to render configuration")?;
    let config: AppConfig = toml::from_str(&rewritten).context("Rewritten configuration is invalid")?;
    if config.auth.keys.is_empty() {
        bail!("refusing to revoke '{name}': it is the only configured key");
    }

    Ok((rewritten, fingerprint))
}

/// Render an `[auth.keys.<name>]` table
fn key_table(
    name: &str,
    key: &str,
    read: bool,
    write: bool,
    collections: Option<Vec<String>>,
) -> anyhow::Result<String> {
    use toml::{Table, Value};

    let mut entry = Table::new();
    entry.insert("key".into(), Value::String(key.to_string()));
    entry.insert("read".into(), Value::Boolean(read));
    entry.insert("write".into(), Value::Boolean(write));
    if let Some(collections) = collections.filter(|c| !c.is_empty()) {
        entry.insert(
            "collections".into(),
            Value::Array(collections.into_iter().map(Value::String).collect()),
        );
    }

    let mut keys = Table::new();
    keys.insert(name.to_string(), Value::Table(entry));
    let mut auth = Table::new();
    auth.insert("keys".into(), Value::Table(keys));
    let mut root = Table::new();
    root.insert("auth".into(), Value::Table(auth));

    toml::to_string(&root).context("Failed to render key table")
}
