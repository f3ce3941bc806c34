use crate::dir::DirDef;
use crate::error::{Error, Result};
use crate::file::FileDef;
use crate::introspect::CatalogDef;
use crate::oem::OemDef;
use crate::os::OsKind;
use crate::remote::RemoteDef;
use crate::session::GlobalState;
use crate::vir::VirDef;
use semistr::SemiStr;
use std::collections::HashSet;
use xconn_catalog::error::Error as CatalogError;
use xconn_catalog::{
    BackendType, Column, ColumnDef, IndexDef, OptionBag, RecordFormat, Table,
};

/// TableDef is the immutable definition of one table.
///
/// It is built once per (name, backend) in a catalog session and
/// shared by all cursors opened on the table until the metadata
/// version changes.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: SemiStr,
    pub schema: SemiStr,
    pub backend: BackendType,
    pub options: OptionBag,
    pub columns: Vec<ColumnDef>,
    pub indexes: Vec<IndexDef>,
    pub readonly: bool,
    pub format: RecordFormat,
    pub access: AccessDef,
    /// Metadata version the definition was built from.
    pub version: u64,
}

/// Typed backend options parsed from the option bag.
#[derive(Debug, Clone)]
pub enum AccessDef {
    File(FileDef),
    Remote(RemoteDef),
    Vir(VirDef),
    Catalog(CatalogDef),
    Os(OsKind),
    Dir(DirDef),
    Oem(OemDef),
}

impl TableDef {
    /// Builds table definition from catalog metadata.
    ///
    /// Backend options are parsed into typed records, and columns are
    /// discovered from the source if the table declares none and the
    /// backend supports it.
    pub fn define(
        global: &GlobalState,
        schema: &str,
        table: &Table,
        columns: &[Column],
        indexes: Vec<IndexDef>,
        backend: BackendType,
    ) -> Result<Self> {
        let name = table.name.as_str();
        let options = &table.options;
        let mut cols = columns
            .iter()
            .map(ColumnDef::from_column)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if cols.is_empty() && !backend.discoverable() {
            return Err(Error::SchemaDiscoveryFailed(
                name.to_string(),
                format!("{} tables require declared columns", backend),
            ));
        }
        let mut readonly = options.bool_or("readonly", false)?;
        let access = match backend {
            BackendType::Csv | BackendType::Fix | BackendType::Bin => {
                let fdef = FileDef::parse(global.config(), backend, options)?;
                if cols.is_empty() {
                    cols = fdef.discover(name, global.config())?;
                }
                readonly |= fdef.is_multiple();
                AccessDef::File(fdef)
            }
            BackendType::Mysql | BackendType::Jdbc => {
                let rdef = RemoteDef::parse(backend, name, options)?;
                if cols.is_empty() {
                    cols = rdef.discover(global, name)?;
                }
                readonly |= rdef.srcdef.is_some();
                AccessDef::Remote(rdef)
            }
            BackendType::Vir => {
                let vdef = VirDef::parse(global.config(), &mut cols, options)?;
                if cols.is_empty() {
                    cols = vdef.default_columns();
                }
                AccessDef::Vir(vdef)
            }
            BackendType::Catalog => {
                let cdef = CatalogDef::parse(name, options)?;
                // always synthesized
                cols = cdef.func.columns();
                AccessDef::Catalog(cdef)
            }
            BackendType::Mac | BackendType::Wmi => {
                let kind = OsKind::parse(backend, options)?;
                if cols.is_empty() {
                    cols = kind.columns();
                }
                AccessDef::Os(kind)
            }
            BackendType::Dir => {
                let ddef = DirDef::parse(global.config(), options)?;
                if cols.is_empty() {
                    cols = DirDef::default_columns();
                }
                AccessDef::Dir(ddef)
            }
            BackendType::Oem => {
                let odef = OemDef::parse(options)?;
                if cols.is_empty() {
                    let module = global.module(odef.module.as_str())?;
                    cols = module
                        .discover(odef.subtype.as_str(), options)
                        .map_err(|e| Error::SchemaDiscoveryFailed(name.to_string(), e.to_string()))?;
                }
                AccessDef::Oem(odef)
            }
        };
        if cols.is_empty() {
            return Err(Error::SchemaDiscoveryFailed(
                name.to_string(),
                "no columns declared or discovered".to_string(),
            ));
        }
        validate_columns(&cols)?;
        validate_indexes(&cols, &indexes)?;
        readonly |= !backend.supports_write();
        log::debug!(
            "define table {}.{} of type {} with {} columns",
            schema,
            name,
            backend,
            cols.len()
        );
        Ok(TableDef {
            name: table.name.clone(),
            schema: SemiStr::new(schema),
            backend,
            options: options.clone(),
            columns: cols,
            indexes,
            readonly,
            format: backend.record_format(),
            access,
            version: table.version,
        })
    }

    /// Whether the table supports keyed access. Backend must support
    /// keys and the table must declare at least one index.
    #[inline]
    pub fn indexable(&self) -> bool {
        self.backend.supports_keys() && !self.indexes.is_empty()
    }

    /// Finds position of column by name, case-insensitively.
    #[inline]
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name_eq(name))
    }

    /// Iterates physical columns with their positions.
    #[inline]
    pub fn data_columns(&self) -> impl Iterator<Item = (usize, &ColumnDef)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.special.is_none())
    }

    #[inline]
    pub(crate) fn access_mismatch(&self) -> Error {
        Error::InvalidState(format!(
            "definition of table {} does not match type {}",
            self.name.as_str(),
            self.backend
        ))
    }

    /// Positions of key parts of given index.
    pub fn key_columns(&self, key: usize) -> Result<Vec<usize>> {
        let index = self
            .indexes
            .get(key)
            .ok_or_else(|| Error::NotIndexable(self.name.to_string()))?;
        index
            .parts
            .iter()
            .map(|p| {
                self.find_column(p.as_str())
                    .ok_or_else(|| Error::ColumnNotFound(p.to_string()))
            })
            .collect()
    }
}

fn validate_columns(cols: &[ColumnDef]) -> Result<()> {
    let mut names = HashSet::with_capacity(cols.len());
    for c in cols {
        if !names.insert(c.name.as_str().to_lowercase()) {
            return Err(CatalogError::ColumnNameNotUnique(c.name.clone()).into());
        }
    }
    Ok(())
}

fn validate_indexes(cols: &[ColumnDef], indexes: &[IndexDef]) -> Result<()> {
    for idx in indexes {
        for p in &idx.parts {
            if !cols.iter().any(|c| c.name_eq(p.as_str())) {
                return Err(CatalogError::IndexColumnNotExists(idx.name.clone(), p.clone()).into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xconn_datatype::PreciseType;

    #[test]
    fn test_validate_columns() {
        let cols = vec![
            ColumnDef::new("id", 0, PreciseType::i64()),
            ColumnDef::new("ID", 1, PreciseType::i64()),
        ];
        assert!(validate_columns(&cols).is_err());
        let cols = vec![
            ColumnDef::new("id", 0, PreciseType::i64()),
            ColumnDef::new("name", 1, PreciseType::var_utf8(10)),
        ];
        assert!(validate_columns(&cols).is_ok());
        assert!(validate_indexes(&cols, &[IndexDef::new("pk", true, &["ID"])]).is_ok());
        assert!(validate_indexes(&cols, &[IndexDef::new("pk", true, &["age"])]).is_err());
    }
}
