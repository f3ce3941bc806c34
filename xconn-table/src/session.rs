use crate::config::Config;
use crate::error::{Error, Result};
use crate::oem::OemModule;
use crate::remote::DriverFactory;
use parking_lot::{Mutex, RwLock};
use semistr::SemiStr;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use xconn_catalog::OptionBag;

/// GlobalState holds process-wide state shared by all connections.
///
/// Hosts create one at startup and hand it to every
/// [`CatalogSession`](crate::CatalogSession).
pub struct GlobalState {
    config: Config,
    shares: Mutex<HashMap<String, ShareEntry>>,
    users: Mutex<HashMap<u64, Arc<UserContext>>>,
    drivers: RwLock<HashMap<String, Arc<dyn DriverFactory>>>,
    modules: RwLock<HashMap<String, Arc<dyn OemModule>>>,
}

struct ShareEntry {
    share: Arc<TableShare>,
    refs: usize,
}

impl GlobalState {
    #[inline]
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(GlobalState {
            config,
            shares: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            drivers: RwLock::new(HashMap::new()),
            modules: RwLock::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Acquires shared metadata of the named table. Handles of the
    /// same table share one entry, removed when the last one drops.
    pub fn acquire_share(
        self: &Arc<Self>,
        schema: &str,
        name: &str,
        options: &OptionBag,
        version: u64,
    ) -> ShareHandle {
        let key = share_key(schema, name);
        let mut shares = self.shares.lock();
        let entry = shares.entry(key.clone()).or_insert_with(|| ShareEntry {
            share: Arc::new(TableShare {
                name: SemiStr::new(name),
                options: options.clone(),
                version,
            }),
            refs: 0,
        });
        if entry.share.version < version {
            // newer definition replaces metadata for later openers
            entry.share = Arc::new(TableShare {
                name: SemiStr::new(name),
                options: options.clone(),
                version,
            });
        }
        entry.refs += 1;
        ShareHandle {
            global: Arc::clone(self),
            key,
            share: Arc::clone(&entry.share),
        }
    }

    /// Number of handles open on the named table.
    #[inline]
    pub fn share_count(&self, schema: &str, name: &str) -> usize {
        self.shares
            .lock()
            .get(&share_key(schema, name))
            .map(|e| e.refs)
            .unwrap_or_default()
    }

    fn release_share(&self, key: &str) {
        let mut shares = self.shares.lock();
        if let Some(entry) = shares.get_mut(key) {
            entry.refs -= 1;
            if entry.refs == 0 {
                shares.remove(key);
            }
        }
    }

    /// Returns context of the connection, creating it on first use.
    pub fn register_user(&self, conn_id: u64) -> Arc<UserContext> {
        let mut users = self.users.lock();
        let user = users.entry(conn_id).or_insert_with(|| {
            log::debug!("register user of connection {}", conn_id);
            Arc::new(UserContext {
                conn_id,
                statements: AtomicU64::new(0),
            })
        });
        Arc::clone(user)
    }

    #[inline]
    pub fn unregister_user(&self, conn_id: u64) {
        if self.users.lock().remove(&conn_id).is_some() {
            log::debug!("unregister user of connection {}", conn_id);
        }
    }

    #[inline]
    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    /// Registers a remote driver by name. Names are case-insensitive.
    #[inline]
    pub fn register_driver(&self, name: &str, factory: Arc<dyn DriverFactory>) {
        self.drivers.write().insert(name.to_lowercase(), factory);
    }

    pub fn driver(&self, name: &str) -> Result<Arc<dyn DriverFactory>> {
        self.drivers
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::BackendConnectFailed(format!("driver '{}' not registered", name)))
    }

    /// Registers an external table module by name.
    #[inline]
    pub fn register_module(&self, name: &str, module: Arc<dyn OemModule>) {
        self.modules.write().insert(name.to_lowercase(), module);
    }

    pub fn module(&self, name: &str) -> Result<Arc<dyn OemModule>> {
        self.modules
            .read()
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::ModuleNotFound(name.to_string()))
    }
}

#[inline]
fn share_key(schema: &str, name: &str) -> String {
    format!("{}.{}", schema.to_lowercase(), name.to_lowercase())
}

/// Metadata shared by all open handles of one table.
#[derive(Debug)]
pub struct TableShare {
    pub name: SemiStr,
    pub options: OptionBag,
    pub version: u64,
}

/// Reference to a table share. Dropping it releases the reference.
pub struct ShareHandle {
    global: Arc<GlobalState>,
    key: String,
    share: Arc<TableShare>,
}

impl ShareHandle {
    #[inline]
    pub fn share(&self) -> &Arc<TableShare> {
        &self.share
    }
}

impl Drop for ShareHandle {
    fn drop(&mut self) {
        self.global.release_share(&self.key)
    }
}

/// Per-connection context reused across statements.
#[derive(Debug)]
pub struct UserContext {
    conn_id: u64,
    statements: AtomicU64,
}

impl UserContext {
    #[inline]
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Counts a new cursor created on this connection.
    #[inline]
    pub(crate) fn next_statement(&self) -> u64 {
        self.statements.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn statements(&self) -> u64 {
        self.statements.load(Ordering::Relaxed)
    }
}
