use crate::cursor::{
    BoundColumn, Cardinality, DeleteTarget, KeyOp, Mode, Position, QueryContext, ReadStatus,
};
use crate::dir::DirTable;
use crate::error::{Error, Result};
use crate::file::FileTable;
use crate::introspect::CatalogTable;
use crate::oem::OemTable;
use crate::os::OsTable;
use crate::remote::RemoteTable;
use crate::vir::VirTable;
use std::path::Path;
use xconn_catalog::ColumnDef;
use xconn_datatype::Const;
use xconn_expr::Expr;

/// Arguments passed to a backend when its cursor is opened.
pub struct OpenArgs<'a> {
    pub mode: Mode,
    /// Bound physical columns, pseudo-columns excluded.
    pub columns: &'a [BoundColumn],
    /// Statement text of update and delete, if the host supplied it.
    pub statement: Option<&'a str>,
    pub ctx: &'a mut QueryContext,
}

/// Context of the current row used to evaluate pseudo-columns.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowInfo<'a> {
    /// 1-based ordinal within the table.
    pub rowid: u64,
    /// 1-based ordinal within the current file or source.
    pub rownum: u64,
    /// Index of current file in the file set and its path.
    pub file: Option<(usize, &'a Path)>,
    pub tabid: Option<&'a str>,
    pub partid: Option<&'a str>,
    pub servid: Option<&'a str>,
}

/// Access is the capability interface every backend implements.
///
/// Only reading is mandatory. Writing, seeking and keyed access
/// fail with a read-only or not-indexable error unless overridden.
/// Column materialization must be overridden by every backend that
/// exposes physical columns.
pub trait Access {
    /// Prepares backend resources. Mode is already validated.
    fn open(&mut self, args: OpenArgs<'_>) -> Result<()>;

    /// Advances to next row.
    fn read_next(&mut self, ctx: &mut QueryContext) -> Result<ReadStatus>;

    /// Materializes one column of current row.
    fn read_column(&mut self, _idx: usize, _col: &ColumnDef) -> Result<Const> {
        Err(Error::NotImplemented("read_column"))
    }

    /// Returns context of current row.
    fn row_info(&self) -> RowInfo<'_>;

    fn cardinality(&mut self) -> Result<Cardinality> {
        Ok(Cardinality::Unknown)
    }

    fn position(&self) -> Position;

    /// Makes the row at given position current.
    fn seek(&mut self, _pos: Position) -> Result<ReadStatus> {
        Err(Error::NotImplemented("seek"))
    }

    /// Takes a filter before open and returns the part the host must
    /// still evaluate.
    fn push_filter(&mut self, filter: Expr) -> Result<Option<Expr>> {
        Ok(Some(filter))
    }

    /// Whether insert, update and delete can be accepted.
    fn writable(&self) -> bool {
        false
    }

    fn write(&mut self, _row: &[Const], _ctx: &mut QueryContext) -> Result<()> {
        Err(Error::ReadOnlyViolation(String::new()))
    }

    fn delete(&mut self, _target: DeleteTarget, _ctx: &mut QueryContext) -> Result<()> {
        Err(Error::ReadOnlyViolation(String::new()))
    }

    fn init_index(&mut self, _key: usize) -> Result<()> {
        Err(Error::NotIndexable(String::new()))
    }

    fn read_by_key(&mut self, _op: KeyOp, _key: &[Const]) -> Result<ReadStatus> {
        Err(Error::NotIndexable(String::new()))
    }

    fn estimate_range(&mut self, _lo: Option<&[Const]>, _hi: Option<&[Const]>) -> Result<u64> {
        Err(Error::NotIndexable(String::new()))
    }

    /// Drops changes not yet written to the data source. Called before
    /// close on a cursor invalidated by a backend failure, so close
    /// leaves stored data as it was at open.
    fn discard(&mut self) {}

    /// Releases backend resources. Must tolerate being called on a
    /// backend that was never opened or failed to open.
    fn close(&mut self, ctx: &mut QueryContext) -> Result<()>;
}

/// Backend is the closed set of cursor implementations.
pub enum Backend {
    File(FileTable),
    Remote(RemoteTable),
    Vir(VirTable),
    Catalog(CatalogTable),
    Os(OsTable),
    Dir(DirTable),
    Oem(OemTable),
}

impl Backend {
    #[inline]
    pub fn access(&mut self) -> &mut dyn Access {
        match self {
            Backend::File(t) => t,
            Backend::Remote(t) => t,
            Backend::Vir(t) => t,
            Backend::Catalog(t) => t,
            Backend::Os(t) => t,
            Backend::Dir(t) => t,
            Backend::Oem(t) => t,
        }
    }

    #[inline]
    pub fn access_ref(&self) -> &dyn Access {
        match self {
            Backend::File(t) => t,
            Backend::Remote(t) => t,
            Backend::Vir(t) => t,
            Backend::Catalog(t) => t,
            Backend::Os(t) => t,
            Backend::Dir(t) => t,
            Backend::Oem(t) => t,
        }
    }
}
