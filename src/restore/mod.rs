// restoretool/src/restore/mod.rs
pub(crate) mod archive;
pub(crate) mod crypt;
mod logic;
pub(crate) mod splitter;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::keys::AsymmetricKeyStore;
use crate::remote::RemoteFileSource;
use crate::revision::RevisionRecord;

/// Public entry point for the restore process: downloads, decrypts,
/// decompresses, and replays the named dump into the configured target
/// database, returning the recorded provenance when the dump name carries
/// any.
pub async fn run_restore_flow<R: RemoteFileSource>(
    app_config: &AppConfig,
    key_store: &AsymmetricKeyStore,
    remote: &R,
    dump_name: &str,
) -> Result<Option<RevisionRecord>> {
    logic::perform_restore_orchestration(app_config, key_store, remote, dump_name).await
}
