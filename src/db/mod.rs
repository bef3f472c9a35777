pub mod from_row;
pub mod ledger;
pub mod queries;
mod schema;

use std::path::Path;
use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

pub use schema::{init_audit_db, init_db};

use crate::events::EventBus;
use crate::payments::{PaymentSettings, QrRenderer};
use crate::uploads::SlipStore;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Milliseconds a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub audit: DbPool,
    pub audit_log_enabled: bool,
    pub payments: PaymentSettings,
    pub slips: SlipStore,
    pub session_ttl_secs: i64,
    pub events: EventBus,
    pub qr: Arc<dyn QrRenderer>,
}

/// Open a file-backed pool. Every connection runs in WAL mode with a busy
/// timeout so concurrent writers queue on the IMMEDIATE lock instead of
/// failing with SQLITE_BUSY.
pub fn create_pool(path: impl AsRef<Path>) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    });
    Pool::builder().max_size(16).build(manager)
}
