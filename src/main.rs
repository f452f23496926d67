//! Secure remote dump retrieval and restore tool
//!
//! Fetches an encrypted database snapshot and its sealed symmetric key from
//! a remote file store, decrypts and decompresses it, replays it into the
//! target database, and records provenance.

// restoretool/src/main.rs
mod access;
mod config;
mod errors;
mod keys;
mod remote;
mod restore;
mod revision;

use anyhow::{Context, Result};
use config::AppConfig;
use keys::AsymmetricKeyStore;
use remote::S3RemoteStore;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    // Expects config.json in the working directory, next to the executable
    // or the project root when running with `cargo run`.
    let config_path = PathBuf::from("config.json");
    let app_config = AppConfig::load_from_json(&config_path).context(format!(
        "Failed to load application configuration from {}",
        config_path.display()
    ))?;

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_choice()?
    };

    match choice.as_str() {
        "1" | "restore" => {
            let dump_name = if args.len() > 2 {
                args[2].trim().to_string()
            } else {
                prompt_dump_name()?
            };
            if dump_name.is_empty() {
                anyhow::bail!("A dump name is required for restore");
            }

            let remote_config = app_config
                .remote_storage
                .as_ref()
                .context("remote_storage must be configured in config.json for restore")?;

            println!(
                "🔄 Starting Restore of '{}' into database '{}'...",
                dump_name, app_config.database.database
            );
            let remote = S3RemoteStore::connect(remote_config).await;
            let key_store =
                AsymmetricKeyStore::new(app_config.key_file.clone(), app_config.key_expiry_secs);
            restore::run_restore_flow(&app_config, &key_store, &remote, &dump_name)
                .await
                .context("Restore process failed")?;
        }
        "2" | "grant" => {
            println!("🔑 Granting database account privileges...");
            let manager = access::AccessManager::new(
                &app_config.database,
                &app_config.admin,
                app_config.append_secret_path.as_deref(),
            );
            manager.grant("%").await.context("Grant process failed")?;
        }
        "3" | "revoke" => {
            println!("🔒 Revoking database account privileges...");
            let manager = access::AccessManager::new(
                &app_config.database,
                &app_config.admin,
                app_config.append_secret_path.as_deref(),
            );
            manager.revoke("%").await.context("Revoke process failed")?;
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (restore), '2' (grant), or '3' (revoke).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(())
}

/// Prompts user to select an operation
///
/// Returns the user's choice as String
fn prompt_choice() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    println!("Select an operation:");
    println!("1. Restore Dump (or type 'restore')");
    println!("2. Grant Account Privileges (or type 'grant')");
    println!("3. Revoke Account Privileges (or type 'revoke')");
    print!("Enter your choice: ");
    let _ = stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}

fn prompt_dump_name() -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("Enter the logical dump name (e.g. masked_trunk_1-23): ");
    let _ = stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin()
        .read_line(&mut input)
        .context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
