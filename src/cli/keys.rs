use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use super::{open_core, print_json};
use crate::crypto::{Algorithm, Ciphertext};

#[derive(Args)]
pub struct KeysArgs {
    #[command(subcommand)]
    pub command: KeysCommands,
}

#[derive(Subcommand)]
pub enum KeysCommands {
    /// Show current key, algorithms and keys nearing expiry
    Status,

    /// Generate a new current key (old keys stay usable for decryption)
    Rotate,

    /// Encrypt a UTF-8 string
    Encrypt {
        plaintext: String,

        /// AES-256-GCM (default), AES-256-CBC or ChaCha20-Poly1305
        #[arg(short, long)]
        algorithm: Option<String>,
    },

    /// Decrypt a ciphertext produced by `encrypt`
    Decrypt { ciphertext: String },

    /// Drop retired keys older than the given age
    Purge {
        /// Age in days (default: keys.purge_after_days)
        #[arg(short, long)]
        days: Option<u32>,
    },
}

pub fn run(args: KeysArgs, json: bool) -> Result<()> {
    let core = open_core()?;

    match args.command {
        KeysCommands::Status => {
            let status = core.keys().status();
            if json {
                return print_json(&status);
            }
            println!("Key Store");
            println!("---------");
            println!(
                "Current key:  {}",
                status.current_key_id.as_deref().unwrap_or("(none)")
            );
            if let Some(alg) = status.current_algorithm {
                println!("Algorithm:    {}", alg.name());
            }
            println!(
                "Keys:         {} ({} active)",
                status.total_keys, status.active_keys
            );
            println!("Rotation:     every {} days", status.rotation_days);
            println!("Supported:    {}", status.supported_algorithms.join(", "));
            if !status.expiring_soon.is_empty() {
                println!("Expiring:     {}", status.expiring_soon.join(", "));
            }
            if let Some(path) = &status.store_path {
                println!("Store:        {}", path.display());
            }
            if let Some(err) = &status.last_persistence_error {
                println!("Last error:   {}", err);
            }
        }
        KeysCommands::Rotate => {
            let key_id = core.rotate_keys();
            println!("Rotated to key {}", key_id);
        }
        KeysCommands::Encrypt {
            plaintext,
            algorithm,
        } => {
            let algorithm = algorithm
                .as_deref()
                .map(str::parse::<Algorithm>)
                .transpose()?;
            let sealed = core.encrypt(plaintext.as_bytes(), algorithm)?;
            println!("{}", sealed);
        }
        KeysCommands::Decrypt { ciphertext } => {
            let plain = core.decrypt(&Ciphertext::from(ciphertext.trim()))?;
            let text = String::from_utf8(plain).context("Decrypted data is not UTF-8")?;
            println!("{}", text);
        }
        KeysCommands::Purge { days } => {
            let max_age = match days {
                Some(d) => chrono::Duration::days(i64::from(d)),
                None => core.keys().settings().purge_after,
            };
            let purged = core.keys().purge_retired(max_age);
            println!("Purged {} retired key(s)", purged);
        }
    }

    Ok(())
}
