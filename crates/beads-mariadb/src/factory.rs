//! Registration with the backend-neutral [`BackendRegistry`].

use beads_storage::{BackendKind, BackendRegistry, BoxedStorage, Options, StorageResult};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::store::MariaDbStore;

/// Install the MariaDB opener into `registry`.
pub fn register(registry: &mut BackendRegistry) {
    registry.register(BackendKind::MariaDb, open_backend);
}

/// Map backend-neutral options onto a MariaDB [`Config`].
///
/// The password is never carried in [`Options`]; it comes from the
/// environment when the config is resolved.
pub fn config_from_options(options: &Options) -> Config {
    Config {
        host: options.server_host.clone(),
        port: options.server_port,
        user: options.server_user.clone(),
        database: options.database.clone(),
        read_only: options.read_only,
        ..Config::default()
    }
}

fn open_backend(
    path: String,
    options: Options,
    cancel: CancellationToken,
) -> BoxFuture<'static, StorageResult<BoxedStorage>> {
    Box::pin(async move {
        // Server stores are identified by database name, not by path.
        debug!(path = %path, "opening mariadb backend");
        let store = MariaDbStore::open(&config_from_options(&options), &cancel).await?;
        let store: BoxedStorage = Box::new(store);
        Ok(store)
    })
}
