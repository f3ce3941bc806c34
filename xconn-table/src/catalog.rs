use crate::access::Backend;
use crate::cursor::{Mode, TableCursor};
use crate::def::TableDef;
use crate::dir::DirTable;
use crate::error::{Error, Result};
use crate::file::FileTable;
use crate::introspect::CatalogTable;
use crate::oem::OemTable;
use crate::os::OsTable;
use crate::remote::RemoteTable;
use crate::session::{GlobalState, UserContext};
use crate::vir::VirTable;
use semistr::SemiStr;
use std::collections::HashMap;
use std::sync::Arc;
use xconn_catalog::error::Error as CatalogError;
use xconn_catalog::{BackendType, Catalog};

/// CatalogSession resolves tables for one host connection.
///
/// Definitions are cached by lower-case schema, name and backend
/// type, and rebuilt when the metadata version of the table changes.
pub struct CatalogSession {
    global: Arc<GlobalState>,
    catalog: Arc<dyn Catalog>,
    user: Arc<UserContext>,
    cache: HashMap<(String, String, BackendType), Arc<TableDef>>,
}

impl CatalogSession {
    #[inline]
    pub fn new(global: Arc<GlobalState>, catalog: Arc<dyn Catalog>, conn_id: u64) -> Self {
        let user = global.register_user(conn_id);
        CatalogSession {
            global,
            catalog,
            user,
            cache: HashMap::new(),
        }
    }

    #[inline]
    pub fn global(&self) -> &Arc<GlobalState> {
        &self.global
    }

    #[inline]
    pub fn user(&self) -> &Arc<UserContext> {
        &self.user
    }

    /// Resolves table definition of given backend type tag.
    /// The tag is matched case-insensitively.
    pub fn resolve(&mut self, name: &str, schema: &str, tag: &str) -> Result<Arc<TableDef>> {
        let backend =
            BackendType::from_tag(tag).ok_or_else(|| Error::UnknownBackendType(tag.to_string()))?;
        let schema_obj = self
            .catalog
            .find_schema_by_name(schema)
            .ok_or_else(|| CatalogError::SchemaNotExists(SemiStr::new(schema)))?;
        let table = self
            .catalog
            .find_table_by_name(&schema_obj.id, name)
            .ok_or_else(|| CatalogError::TableNotExists(SemiStr::new(name)))?;
        let key = (schema.to_lowercase(), name.to_lowercase(), backend);
        if let Some(def) = self.cache.get(&key) {
            if def.version == table.version {
                return Ok(Arc::clone(def));
            }
            log::debug!("definition of table {} is stale, rebuilding", name);
        }
        let columns = self.catalog.all_columns_in_table(&table.id);
        let indexes = self.catalog.find_indexes(&table.id);
        let def = TableDef::define(&self.global, schema, &table, &columns, indexes, backend)?;
        let def = Arc::new(def);
        self.cache.insert(key, Arc::clone(&def));
        Ok(def)
    }

    /// Resolves table definition using the `type` option of the table.
    pub fn resolve_table(&mut self, name: &str, schema: &str) -> Result<Arc<TableDef>> {
        let schema_obj = self
            .catalog
            .find_schema_by_name(schema)
            .ok_or_else(|| CatalogError::SchemaNotExists(SemiStr::new(schema)))?;
        let table = self
            .catalog
            .find_table_by_name(&schema_obj.id, name)
            .ok_or_else(|| CatalogError::TableNotExists(SemiStr::new(name)))?;
        let tag = table.options.get("type").unwrap_or_default().to_string();
        self.resolve(name, schema, &tag)
    }

    /// Drops cached definitions of the named table.
    #[inline]
    pub fn invalidate(&mut self, schema: &str, name: &str) {
        let schema = schema.to_lowercase();
        let name = name.to_lowercase();
        self.cache.retain(|(s, n, _), _| *s != schema || *n != name);
    }

    #[inline]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Creates a cursor on the table. The backend is selected by the
    /// backend type of the definition.
    pub fn create_cursor(&self, def: &Arc<TableDef>, mode: Mode) -> Result<TableCursor> {
        let def_ref = Arc::clone(def);
        let backend = match def.backend {
            BackendType::Csv | BackendType::Fix | BackendType::Bin => {
                Backend::File(FileTable::new(def_ref)?)
            }
            BackendType::Mysql | BackendType::Jdbc => {
                Backend::Remote(RemoteTable::new(def_ref, &self.global)?)
            }
            BackendType::Vir => Backend::Vir(VirTable::new(def_ref)?),
            BackendType::Catalog => Backend::Catalog(CatalogTable::new(def_ref, &self.global)?),
            BackendType::Mac | BackendType::Wmi => Backend::Os(OsTable::new(def_ref)?),
            BackendType::Dir => Backend::Dir(DirTable::new(def_ref)?),
            BackendType::Oem => Backend::Oem(OemTable::new(def_ref, &self.global)?),
        };
        let stmt = self.user.next_statement();
        log::debug!(
            "create cursor on table {} for statement {} of connection {}",
            def.name.as_str(),
            stmt,
            self.user.conn_id()
        );
        let share = self
            .global
            .acquire_share(def.schema.as_str(), def.name.as_str(), &def.options, def.version);
        Ok(TableCursor::new(Arc::clone(def), backend, mode, share))
    }
}

impl Drop for CatalogSession {
    fn drop(&mut self) {
        self.global.unregister_user(self.user.conn_id())
    }
}
