// restoretool/src/restore/logic.rs
use sqlx::mysql::MySqlConnectOptions;
use sqlx::{Connection, MySqlConnection};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;

use crate::access::{AccessManager, quote_identifier};
use crate::config::{AppConfig, DatabaseConfig};
use crate::errors::{RestoreError, Result};
use crate::keys::AsymmetricKeyStore;
use crate::remote::RemoteFileSource;
use crate::restore::archive::extract_dump_from_archive;
use crate::restore::crypt::open_dump_payload;
use crate::restore::splitter::StatementSplitter;
use crate::revision::{self, RevisionRecord};

/// Runs the full restore pipeline for one dump: download payload and key
/// blob, recover the symmetric key, decrypt and decompress the dump, rebuild
/// the target database, replay the SQL, record provenance.
///
/// Every temp artifact created along the way is owned here and deleted when
/// this function returns, on success and on every error path alike.
pub async fn perform_restore_orchestration<R: RemoteFileSource>(
    app_config: &AppConfig,
    key_store: &AsymmetricKeyStore,
    remote: &R,
    dump_name: &str,
) -> Result<Option<RevisionRecord>> {
    println!("Downloading dump file");
    let payload_file = download_dump(remote, dump_name).await?;

    println!("Downloading key file");
    let key_blob_file = download_key_file(remote, dump_name, key_store).await?;

    println!("Decrypting key file");
    let symmetric_key = decrypt_key_file(key_store, key_blob_file.path())?;

    println!("Decrypting dump file");
    let archive_file = decrypt_dump_file(&symmetric_key, payload_file.path())?;

    println!("Extracting archive");
    let sql_file = extract_dump_from_archive(archive_file.path())?;

    println!("Dropping and re-creating database");
    create_database(app_config).await?;

    println!("Importing dump");
    let mut conn = connect_to_target(&app_config.database).await?;
    import_database(&mut conn, sql_file.path()).await?;

    let record = revision::record_revision(&mut conn, dump_name).await?;

    println!("✓ Restore of '{}' finished", dump_name);
    Ok(record)
}

/// Fetches the encrypted payload `<dump_name>.box` into a fresh temp file.
pub async fn download_dump<R: RemoteFileSource>(
    remote: &R,
    dump_name: &str,
) -> Result<NamedTempFile> {
    fetch_remote_file(remote, &format!("{}.box", dump_name)).await
}

/// Fetches the encrypted symmetric key `<dump_name>.key.<checksum>`. The
/// checksum-qualified name is what selects the key blob sealed for the
/// currently active keypair generation.
pub async fn download_key_file<R: RemoteFileSource>(
    remote: &R,
    dump_name: &str,
    key_store: &AsymmetricKeyStore,
) -> Result<NamedTempFile> {
    let remote_name = format!("{}.key.{}", dump_name, key_store.key_checksum()?);
    fetch_remote_file(remote, &remote_name).await
}

async fn fetch_remote_file<R: RemoteFileSource>(
    remote: &R,
    remote_name: &str,
) -> Result<NamedTempFile> {
    let local = NamedTempFile::new()?;
    if !remote.fetch(remote_name, local.path()).await? {
        return Err(RestoreError::Transfer {
            name: remote_name.to_string(),
            reason: "Remote file not found".to_string(),
        });
    }
    Ok(local)
}

/// Recovers the symmetric key by asymmetric decryption of the key blob.
pub fn decrypt_key_file(key_store: &AsymmetricKeyStore, key_blob_path: &Path) -> Result<Vec<u8>> {
    let blob = fs::read(key_blob_path).map_err(|e| {
        RestoreError::KeyUnavailable(format!(
            "Could not read key blob {}: {}",
            key_blob_path.display(),
            e
        ))
    })?;
    key_store.decrypt(&blob)
}

/// Symmetric-decrypts the payload into a temp file holding the compressed
/// archive. Nothing is written unless authentication succeeds.
pub fn decrypt_dump_file(symmetric_key: &[u8], payload_path: &Path) -> Result<NamedTempFile> {
    let payload = fs::read(payload_path)?;
    let archive_bytes = open_dump_payload(symmetric_key, &payload)?;

    let mut archive_file = NamedTempFile::new()?;
    archive_file.write_all(&archive_bytes)?;
    archive_file.as_file_mut().flush()?;
    Ok(archive_file)
}

/// Drops the target database if it exists and creates it fresh, then tries
/// to re-provision the accounts. An already-correctly-provisioned account
/// must not block a restore, so the grant failure is swallowed.
pub async fn create_database(app_config: &AppConfig) -> Result<()> {
    let database = &app_config.database.database;
    let mut admin = connect_as_admin(app_config).await?;

    let exists: Option<(String,)> =
        sqlx::query_as("SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?")
            .bind(database)
            .fetch_optional(&mut admin)
            .await?;

    if exists.is_some() {
        sqlx::query(&format!("DROP DATABASE {}", quote_identifier(database)))
            .execute(&mut admin)
            .await
            .map_err(|e| RestoreError::Schema(format!("Could not drop database: {}", e)))?;
    }
    sqlx::query(&format!("CREATE DATABASE {}", quote_identifier(database)))
        .execute(&mut admin)
        .await
        .map_err(|e| RestoreError::Schema(format!("Could not create database: {}", e)))?;
    println!("✓ Database '{}' re-created", database);

    let manager = AccessManager::new(
        &app_config.database,
        &app_config.admin,
        app_config.append_secret_path.as_deref(),
    );
    if let Err(err) = manager.grant("%").await {
        println!("⚠️ Could not re-grant account privileges, continuing: {}", err);
    }
    Ok(())
}

/// Streams the extracted SQL file through the statement splitter and replays
/// each statement. The first rejected statement aborts the whole restore;
/// there is no partial-success continuation.
pub async fn import_database(conn: &mut MySqlConnection, sql_path: &Path) -> Result<()> {
    // Dumps routinely contain constructs the strict modes reject.
    let _ = sqlx::query("SET sql_mode=NO_ENGINE_SUBSTITUTION,innodb_strict_mode=0")
        .execute(&mut *conn)
        .await;

    let reader = BufReader::new(fs::File::open(sql_path)?);
    let mut splitter = StatementSplitter::new();
    let mut executed = 0u64;

    for line in reader.lines() {
        let line = line?;
        if let Some(statement) = splitter.push_line(&line) {
            if let Err(e) = sqlx::query(&statement).execute(&mut *conn).await {
                return Err(RestoreError::Import {
                    statement,
                    error: e.to_string(),
                });
            }
            executed += 1;
        }
    }

    // Legacy behavior: a dump whose final statement lacks its delimiter gets
    // that statement dropped. Log it so a malformed dump is at least visible.
    if let Some(pending) = splitter.pending() {
        println!(
            "⚠️ Discarding unterminated trailing statement ({} chars) at end of dump",
            pending.len()
        );
    }

    println!("✓ Imported {} statements", executed);
    Ok(())
}

pub async fn connect_to_target(config: &DatabaseConfig) -> Result<MySqlConnection> {
    let options = MySqlConnectOptions::new()
        .host(&config.host)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database);
    Ok(MySqlConnection::connect_with(&options).await?)
}

async fn connect_as_admin(app_config: &AppConfig) -> Result<MySqlConnection> {
    let options = MySqlConnectOptions::new()
        .host(&app_config.admin.host)
        .username(&app_config.admin.username)
        .password(&app_config.admin.password);
    Ok(MySqlConnection::connect_with(&options).await?)
}
