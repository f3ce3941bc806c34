//! Tables listing metadata of a remote source.
use crate::access::{Access, OpenArgs, RowInfo};
use crate::cursor::{Cardinality, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use crate::remote::RemoteDef;
use crate::rowset::{synthesize, RowSet};
use crate::session::GlobalState;
use std::sync::Arc;
use xconn_catalog::{BackendType, ColumnDef, OptionBag};
use xconn_datatype::{Const, PreciseType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatFunc {
    Tables,
    Columns,
}

const TABLE_ATTRS: [&str; 5] = ["TABLE_CAT", "TABLE_SCHEM", "TABLE_NAME", "TABLE_TYPE", "REMARKS"];
const COLUMN_ATTRS: [&str; 6] = [
    "TABLE_NAME",
    "COLUMN_NAME",
    "TYPE_NAME",
    "PRECISION",
    "SCALE",
    "NULLABLE",
];

impl CatFunc {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tables" | "table" => Some(CatFunc::Tables),
            "columns" | "column" | "col" => Some(CatFunc::Columns),
            _ => None,
        }
    }

    /// Result columns of the function.
    pub fn columns(&self) -> Vec<ColumnDef> {
        let text = PreciseType::var_utf8(128);
        match self {
            CatFunc::Tables => synthesize(&[
                (TABLE_ATTRS[0], text),
                (TABLE_ATTRS[1], text),
                (TABLE_ATTRS[2], text),
                (TABLE_ATTRS[3], PreciseType::var_utf8(16)),
                (TABLE_ATTRS[4], PreciseType::var_utf8(255)),
            ]),
            CatFunc::Columns => synthesize(&[
                (COLUMN_ATTRS[0], text),
                (COLUMN_ATTRS[1], text),
                (COLUMN_ATTRS[2], PreciseType::var_utf8(32)),
                (COLUMN_ATTRS[3], PreciseType::i32()),
                (COLUMN_ATTRS[4], PreciseType::i32()),
                (COLUMN_ATTRS[5], PreciseType::i32()),
            ]),
        }
    }
}

/// Typed options of catalog tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogDef {
    pub func: CatFunc,
    /// Table name pattern, `%` matches any sequence.
    pub pattern: String,
    /// Connection to the remote source.
    pub remote: RemoteDef,
}

impl CatalogDef {
    pub fn parse(table: &str, options: &OptionBag) -> Result<Self> {
        let func = match options.get("catfunc") {
            Some(f) => CatFunc::parse(f).ok_or_else(|| Error::invalid_option("catfunc", f))?,
            None => CatFunc::Tables,
        };
        let pattern = options
            .get("table_name")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("%")
            .trim()
            .to_string();
        let remote = RemoteDef::parse(BackendType::Jdbc, table, options)?;
        Ok(CatalogDef {
            func,
            pattern,
            remote,
        })
    }
}

/// CatalogTable lists tables or columns of the remote source, taken
/// at open.
pub struct CatalogTable {
    def: Arc<TableDef>,
    cdef: CatalogDef,
    global: Arc<GlobalState>,
    rows: RowSet,
    positions: Vec<Option<usize>>,
}

impl CatalogTable {
    pub fn new(def: Arc<TableDef>, global: &Arc<GlobalState>) -> Result<Self> {
        let cdef = match &def.access {
            AccessDef::Catalog(c) => c.clone(),
            _ => return Err(def.access_mismatch()),
        };
        let attrs: &[&str] = match cdef.func {
            CatFunc::Tables => &TABLE_ATTRS,
            CatFunc::Columns => &COLUMN_ATTRS,
        };
        let positions = crate::rowset::map_columns(&def, attrs)?;
        Ok(CatalogTable {
            def,
            cdef,
            global: Arc::clone(global),
            rows: RowSet::default(),
            positions,
        })
    }

    fn load(&mut self) -> Result<()> {
        let mut conn = self.cdef.remote.connect(&self.global)?;
        let text = |s: Option<&str>| s.map(Const::new_str).unwrap_or(Const::Null);
        let res = match self.cdef.func {
            CatFunc::Tables => conn.tables(&self.cdef.pattern).map(|ts| {
                ts.into_iter()
                    .map(|t| {
                        vec![
                            text(t.catalog.as_deref()),
                            text(t.schema.as_deref()),
                            Const::new_str(&t.name),
                            Const::new_str(&t.kind),
                            text(t.remarks.as_deref()),
                        ]
                    })
                    .collect::<Vec<_>>()
            }),
            CatFunc::Columns => conn.columns(&self.cdef.pattern).map(|cs| {
                cs.into_iter()
                    .map(|(table, c)| {
                        vec![
                            Const::new_str(&table),
                            Const::new_str(&c.name),
                            Const::new_str(&c.type_name),
                            Const::I64(c.precision as i64),
                            Const::I64(c.scale as i64),
                            Const::I64(c.nullable as i64),
                        ]
                    })
                    .collect::<Vec<_>>()
            }),
        };
        if let Err(e) = conn.close() {
            log::warn!("close catalog connection of {}: {}", self.def.name.as_str(), e);
        }
        let rows = res?;
        log::debug!(
            "catalog table {} lists {} entries of {}",
            self.def.name.as_str(),
            rows.len(),
            self.cdef.pattern
        );
        self.rows = RowSet::with_capacity(rows.len());
        for r in rows {
            self.rows.push(r);
        }
        Ok(())
    }
}

impl Access for CatalogTable {
    fn open(&mut self, _args: OpenArgs<'_>) -> Result<()> {
        self.load()
    }

    #[inline]
    fn read_next(&mut self, _ctx: &mut QueryContext) -> Result<ReadStatus> {
        Ok(self.rows.advance())
    }

    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> Result<Const> {
        match self.positions.get(idx).copied().flatten() {
            Some(pos) => self.rows.value(pos, col),
            None => Err(Error::NotFoundInRow(col.name.to_string())),
        }
    }

    fn row_info(&self) -> RowInfo<'_> {
        RowInfo {
            rowid: self.rows.rowid(),
            rownum: self.rows.rowid(),
            ..Default::default()
        }
    }

    #[inline]
    fn cardinality(&mut self) -> Result<Cardinality> {
        Ok(Cardinality::Exact(self.rows.len() as u64))
    }

    #[inline]
    fn position(&self) -> Position {
        Position(self.rows.rowid())
    }

    #[inline]
    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        Ok(self.rows.seek(pos.0))
    }

    fn close(&mut self, _ctx: &mut QueryContext) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_def() {
        let opts = OptionBag::new()
            .with("driver", "mem")
            .with("catfunc", "Columns")
            .with("table_name", "ord%");
        let cdef = CatalogDef::parse("meta", &opts).unwrap();
        assert_eq!(CatFunc::Columns, cdef.func);
        assert_eq!("ord%", cdef.pattern);
        assert_eq!(6, cdef.func.columns().len());
        let bad = OptionBag::new().with("driver", "mem").with("catfunc", "views");
        assert!(CatalogDef::parse("meta", &bad).is_err());
        let tables = CatalogDef::parse("meta", &OptionBag::new().with("driver", "mem")).unwrap();
        assert_eq!(CatFunc::Tables, tables.func);
        assert_eq!("%", tables.pattern);
    }
}
