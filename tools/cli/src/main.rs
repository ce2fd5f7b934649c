//! CloudVault CLI - operator tool for a vault deployment.
//!
//! Runs single create/fetch/list operations against the storage backend
//! named in the settings file.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::io::{IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use cloudvault_common::{EntryId, OwnerId};
use cloudvault_crypto::MasterKey;
use cloudvault_vault::{open_service, DynVaultService, VaultSettings};

#[derive(Parser)]
#[command(name = "cloudvault")]
#[command(about = "CloudVault - Envelope-encrypted secret storage")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: <config dir>/cloudvault/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new secret read from stdin.
    Create {
        /// Owner the secret belongs to.
        #[arg(short, long)]
        owner: String,

        /// Label for the secret.
        #[arg(short, long)]
        name: String,
    },

    /// Decrypt a secret and write it to stdout.
    Fetch {
        /// Owner the secret belongs to.
        #[arg(short, long)]
        owner: String,

        /// Entry id returned by `create`.
        #[arg(short, long)]
        entry: String,
    },

    /// List an owner's entries.
    List {
        /// Owner whose entries to list.
        #[arg(short, long)]
        owner: String,

        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Rebuild an owner's entry index from stored entries.
    Reindex {
        /// Owner whose index to rebuild.
        #[arg(short, long)]
        owner: String,
    },

    /// Print a fresh base64 master key for the settings key ring.
    GenMasterKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Create { owner, name } => {
            let service = open(cli.config.as_deref())?;
            cmd_create(&service, &owner, &name).await
        }

        Commands::Fetch { owner, entry } => {
            let service = open(cli.config.as_deref())?;
            cmd_fetch(&service, &owner, &entry).await
        }

        Commands::List { owner, json } => {
            let service = open(cli.config.as_deref())?;
            cmd_list(&service, &owner, json).await
        }

        Commands::Reindex { owner } => {
            let service = open(cli.config.as_deref())?;
            cmd_reindex(&service, &owner).await
        }

        Commands::GenMasterKey => cmd_gen_master_key(),
    }
}

/// Load settings and build the service.
fn open(config: Option<&Path>) -> Result<DynVaultService> {
    let settings = VaultSettings::load(config).context("Failed to load settings")?;
    if settings.storage.is_ephemeral() {
        warn!(
            backend = %settings.storage.backend,
            "In-memory backend: entries are lost when this command exits"
        );
    }
    open_service(&settings).context("Failed to open vault service")
}

fn parse_owner(owner: &str) -> Result<OwnerId> {
    OwnerId::new(owner).context("Invalid owner id")
}

/// Read the secret from stdin, prompting without echo on a terminal.
fn read_secret() -> Result<Zeroizing<Vec<u8>>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        let secret = Zeroizing::new(
            rpassword::prompt_password("Secret: ").context("Failed to read secret")?,
        );
        return Ok(Zeroizing::new(secret.as_bytes().to_vec()));
    }

    let mut buffer = Zeroizing::new(Vec::new());
    stdin
        .lock()
        .read_to_end(&mut buffer)
        .context("Failed to read secret from stdin")?;

    // Drop one trailing newline from piped input
    if buffer.last() == Some(&b'\n') {
        buffer.pop();
        if buffer.last() == Some(&b'\r') {
            buffer.pop();
        }
    }
    Ok(buffer)
}

/// Create a secret.
async fn cmd_create(service: &DynVaultService, owner: &str, name: &str) -> Result<()> {
    let owner = parse_owner(owner)?;
    let secret = read_secret()?;

    let created = service
        .create(&owner, name, &secret)
        .await
        .context("Failed to create secret")?;

    println!("Secret stored.");
    println!("  Entry: {}", created.entry_id);
    println!("  Name: {}", created.name);
    println!("  Created: {}", created.created_at.to_rfc3339());

    Ok(())
}

/// Fetch a secret.
async fn cmd_fetch(service: &DynVaultService, owner: &str, entry: &str) -> Result<()> {
    let owner = parse_owner(owner)?;
    let entry_id = EntryId::new(entry).context("Invalid entry id")?;

    let revealed = service
        .fetch(&owner, &entry_id)
        .await
        .context("Failed to fetch secret")?;

    info!(entry = %revealed.metadata.entry_id, name = %revealed.metadata.name, "Secret decrypted");

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(revealed.secret.as_bytes())?;
    if stdout.is_terminal() {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    Ok(())
}

/// List entries.
async fn cmd_list(service: &DynVaultService, owner: &str, json: bool) -> Result<()> {
    let owner = parse_owner(owner)?;

    let mut entries = service
        .list(&owner)
        .await
        .context("Failed to list entries")?;
    entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No entries for {}.", owner);
    } else {
        println!("Entries of {}:", owner);
        for entry in entries {
            println!(
                "  {}  {}  (updated {})",
                entry.entry_id,
                entry.name,
                entry.updated_at.to_rfc3339()
            );
        }
    }

    Ok(())
}

/// Rebuild an owner's index.
async fn cmd_reindex(service: &DynVaultService, owner: &str) -> Result<()> {
    let owner = parse_owner(owner)?;

    let count = service
        .reindex(&owner)
        .await
        .context("Failed to rebuild index")?;

    println!("Index of {} holds {} entries.", owner, count);

    Ok(())
}

/// Generate a master key.
fn cmd_gen_master_key() -> Result<()> {
    let key = MasterKey::generate();
    let encoded = Zeroizing::new(STANDARD.encode(key.as_bytes()));

    println!("{}", encoded.as_str());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cloudvault", "list", "--owner", "u1", "-v", "--config", "vault.json",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("vault.json")));
        assert!(matches!(cli.command, Commands::List { ref owner, json: false } if owner == "u1"));
    }

    #[test]
    fn test_global_flags_before_subcommand() {
        let cli = Cli::try_parse_from(["cloudvault", "--verbose", "reindex", "-o", "u1"]).unwrap();

        assert!(cli.verbose);
        assert!(cli.config.is_none());
        assert!(matches!(cli.command, Commands::Reindex { .. }));
    }

    #[test]
    fn test_missing_owner_is_rejected() {
        assert!(Cli::try_parse_from(["cloudvault", "list"]).is_err());
    }
}
