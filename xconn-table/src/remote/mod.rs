//! Remote SQL backends.
//!
//! Drivers are supplied by the host through [`DriverFactory`] and
//! registered by name in [`GlobalState`]. The table layer only
//! generates SQL text and reads rows of typed values back.
mod command;
mod mem_impl;
mod table;

pub use self::mem_impl::{MemDriver, MemRemote};
pub use self::table::RemoteTable;

use crate::error::{Error, Result};
use crate::session::GlobalState;
use bitflags::bitflags;
use xconn_catalog::{BackendType, ColumnAttr, ColumnDef, OptionBag};
use xconn_datatype::{Const, PreciseType};

bitflags! {
    /// Capabilities a driver declares for its connections.
    pub struct DriverCaps: u8 {
        /// Parameterized statements can be prepared and reused.
        const PREPARE = 0x01;
        /// Results can be repositioned with `scroll_to`.
        const SCROLL = 0x02;
        /// Results must be fetched one row at a time, which rules
        /// out prepared inserts.
        const SINGLE_ROW_FETCH = 0x04;
    }
}

/// Options used to open a remote connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// All table options, for driver-specific keys.
    pub extra: OptionBag,
}

/// Metadata of one column of a remote result or table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub pty: PreciseType,
    pub nullable: bool,
    pub table: Option<String>,
    pub type_name: String,
    pub precision: u32,
    pub scale: u8,
}

impl ColumnMeta {
    #[inline]
    pub fn new(name: &str, pty: PreciseType) -> Self {
        ColumnMeta {
            name: name.to_string(),
            pty,
            nullable: true,
            table: None,
            type_name: pty.sql_name().to_string(),
            precision: pty.display_len() as u32,
            scale: 0,
        }
    }

    fn to_column_def(&self, idx: u32) -> ColumnDef {
        let mut cd = ColumnDef::new(&self.name, idx, self.pty);
        if !self.nullable {
            cd.attr |= ColumnAttr::NOT_NULL;
        }
        cd
    }
}

/// Metadata of one remote table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMeta {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub name: String,
    pub kind: String,
    pub remarks: Option<String>,
}

pub trait DriverFactory: Send + Sync {
    fn connect(&self, opts: &ConnectOptions) -> Result<Box<dyn RemoteConnection>>;
}

/// RemoteConnection is one open session of a driver.
///
/// Failures of a driver are reported as `BackendQueryFailed`, except
/// calls not supported by it which report `NotImplemented`.
pub trait RemoteConnection: Send {
    fn capabilities(&self) -> DriverCaps;

    /// Identifier quote character of the remote dialect.
    fn quote_char(&self) -> Option<char>;

    fn server_name(&self) -> &str;

    /// Executes a query and returns metadata of its result columns.
    /// Rows are then returned by `fetch`.
    fn execute_query(&mut self, sql: &str) -> Result<Vec<ColumnMeta>>;

    /// Fetches next row of current result.
    fn fetch(&mut self) -> Result<Option<Vec<Const>>>;

    /// Returns the row count produced by a count query.
    fn result_size(&mut self, count_sql: &str) -> Result<u64> {
        self.execute_query(count_sql)?;
        let row = self
            .fetch()?
            .ok_or_else(|| Error::BackendQueryFailed(format!("no result of {}", count_sql)))?;
        row.first()
            .and_then(|v| v.as_i64())
            .map(|n| n.max(0) as u64)
            .ok_or_else(|| Error::BackendQueryFailed(format!("invalid result of {}", count_sql)))
    }

    /// Executes a data change and returns affected rows.
    fn execute_update(&mut self, sql: &str) -> Result<u64>;

    fn prepare(&mut self, _sql: &str) -> Result<u32> {
        Err(Error::NotImplemented("prepare"))
    }

    fn execute_prepared(&mut self, _stmt: u32, _params: &[Const]) -> Result<u64> {
        Err(Error::NotImplemented("execute_prepared"))
    }

    /// Repositions current result so that next fetch returns the row
    /// with given 1-based ordinal. Returns false if there is no such row.
    fn scroll_to(&mut self, _rowid: u64) -> Result<bool> {
        Err(Error::NotImplemented("scroll_to"))
    }

    /// Lists columns of tables matching the pattern.
    fn columns(&mut self, table_pattern: &str) -> Result<Vec<(String, ColumnMeta)>>;

    fn tables(&mut self, pattern: &str) -> Result<Vec<TableMeta>>;

    fn close(&mut self) -> Result<()>;
}

/// Typed options of remote tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDef {
    /// Name of the registered driver.
    pub driver: String,
    pub conn: ConnectOptions,
    /// Remote table name.
    pub table: String,
    /// Database qualifying the remote table.
    pub database: Option<String>,
    /// User query replacing the generated select.
    pub srcdef: Option<String>,
    pub quoted: bool,
    /// Buffer whole result in memory.
    pub memory: bool,
    /// Row estimate of streaming results.
    pub estimate: Option<u64>,
    pub scrollable: bool,
}

impl RemoteDef {
    pub fn parse(backend: BackendType, table: &str, options: &OptionBag) -> Result<Self> {
        let driver = match (options.get("driver"), backend) {
            (Some(d), _) => d.trim().to_ascii_lowercase(),
            (None, BackendType::Mysql) => "mysql".to_string(),
            (None, _) => return Err(Error::invalid_option("driver", "")),
        };
        let url = options.get_any(&["connect", "connection"]).unwrap_or_default();
        let database = options.get("database_name").map(str::to_string);
        let conn = ConnectOptions {
            url: url.to_string(),
            user: options.get("user").map(str::to_string),
            password: options.get("password").map(str::to_string),
            database: database.clone(),
            extra: options.clone(),
        };
        let remote = options
            .get("table_name")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(table);
        let srcdef = options
            .get("srcdef")
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().trim_end_matches(';').to_string());
        let quoted = backend == BackendType::Mysql || options.bool_or("quoted", false)?;
        let memory = match options.get_num::<u8>("memory")? {
            None | Some(0) => false,
            Some(1) => true,
            Some(n) => return Err(Error::invalid_option("memory", n.to_string())),
        };
        Ok(RemoteDef {
            driver,
            conn,
            table: remote.trim().to_string(),
            database,
            srcdef,
            quoted,
            memory,
            estimate: options.get_num("estimate")?,
            scrollable: options.bool_or("scrollable", false)?,
        })
    }

    pub(crate) fn connect(&self, global: &GlobalState) -> Result<Box<dyn RemoteConnection>> {
        let factory = global.driver(&self.driver)?;
        factory.connect(&self.conn).map_err(|e| match e {
            Error::BackendConnectFailed(_) => e,
            other => Error::BackendConnectFailed(other.to_string()),
        })
    }

    /// Discovers columns from remote metadata, or from the result of
    /// the user query.
    pub fn discover(&self, global: &GlobalState, table: &str) -> Result<Vec<ColumnDef>> {
        let failed = |e: Error| Error::SchemaDiscoveryFailed(table.to_string(), e.to_string());
        let mut conn = self.connect(global).map_err(failed)?;
        let res = match &self.srcdef {
            Some(sql) => conn.execute_query(sql),
            None => conn
                .columns(&self.table)
                .map(|cols| cols.into_iter().map(|(_, c)| c).collect()),
        };
        let _ = conn.close();
        let metas = res.map_err(failed)?;
        if metas.is_empty() {
            return Err(Error::SchemaDiscoveryFailed(
                table.to_string(),
                format!("remote table {} has no columns", self.table),
            ));
        }
        log::debug!(
            "discovered {} columns of {} from driver {}",
            metas.len(),
            table,
            self.driver
        );
        Ok(metas
            .iter()
            .enumerate()
            .map(|(i, m)| m.to_column_def(i as u32))
            .collect())
    }
}
