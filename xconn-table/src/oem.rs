//! Tables served by modules registered by the host.
use crate::access::{Access, OpenArgs, RowInfo};
use crate::cursor::{Cardinality, DeleteTarget, KeyOp, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use crate::session::GlobalState;
use semistr::SemiStr;
use std::sync::Arc;
use xconn_catalog::{ColumnDef, OptionBag};
use xconn_datatype::Const;
use xconn_expr::Expr;

/// OemModule provides table kinds beyond the built-in ones.
///
/// Tables it creates implement the same [`Access`] trait, so every
/// capability they leave out fails the way it does for built-in
/// tables.
pub trait OemModule: Send + Sync {
    fn name(&self) -> &str;

    /// Discovers columns of a table of given subtype.
    fn discover(&self, _subtype: &str, _options: &OptionBag) -> Result<Vec<ColumnDef>> {
        Err(Error::NotImplemented("discover"))
    }

    fn create(&self, subtype: &str, def: &Arc<TableDef>) -> Result<Box<dyn Access + Send>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OemDef {
    pub module: SemiStr,
    pub subtype: SemiStr,
}

impl OemDef {
    pub fn parse(options: &OptionBag) -> Result<Self> {
        let module = options
            .get("module")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::invalid_option("module", ""))?;
        let subtype = options.get("subtype").unwrap_or_default();
        Ok(OemDef {
            module: SemiStr::new(module.trim()),
            subtype: SemiStr::new(subtype.trim()),
        })
    }
}

/// OemTable delegates every call to the table created by the module.
pub struct OemTable {
    inner: Box<dyn Access + Send>,
}

impl OemTable {
    pub fn new(def: Arc<TableDef>, global: &GlobalState) -> Result<Self> {
        let odef = match &def.access {
            AccessDef::Oem(o) => o,
            _ => return Err(def.access_mismatch()),
        };
        let module = global.module(odef.module.as_str())?;
        let inner = module.create(odef.subtype.as_str(), &def)?;
        log::debug!(
            "module {} created table {} of subtype {}",
            module.name(),
            def.name.as_str(),
            odef.subtype.as_str()
        );
        Ok(OemTable { inner })
    }
}

impl Access for OemTable {
    #[inline]
    fn open(&mut self, args: OpenArgs<'_>) -> Result<()> {
        self.inner.open(args)
    }

    #[inline]
    fn read_next(&mut self, ctx: &mut QueryContext) -> Result<ReadStatus> {
        self.inner.read_next(ctx)
    }

    #[inline]
    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> Result<Const> {
        self.inner.read_column(idx, col)
    }

    #[inline]
    fn row_info(&self) -> RowInfo<'_> {
        self.inner.row_info()
    }

    #[inline]
    fn cardinality(&mut self) -> Result<Cardinality> {
        self.inner.cardinality()
    }

    #[inline]
    fn position(&self) -> Position {
        self.inner.position()
    }

    #[inline]
    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        self.inner.seek(pos)
    }

    #[inline]
    fn push_filter(&mut self, filter: Expr) -> Result<Option<Expr>> {
        self.inner.push_filter(filter)
    }

    #[inline]
    fn writable(&self) -> bool {
        self.inner.writable()
    }

    #[inline]
    fn write(&mut self, row: &[Const], ctx: &mut QueryContext) -> Result<()> {
        self.inner.write(row, ctx)
    }

    #[inline]
    fn delete(&mut self, target: DeleteTarget, ctx: &mut QueryContext) -> Result<()> {
        self.inner.delete(target, ctx)
    }

    #[inline]
    fn init_index(&mut self, key: usize) -> Result<()> {
        self.inner.init_index(key)
    }

    #[inline]
    fn read_by_key(&mut self, op: KeyOp, key: &[Const]) -> Result<ReadStatus> {
        self.inner.read_by_key(op, key)
    }

    #[inline]
    fn estimate_range(&mut self, lo: Option<&[Const]>, hi: Option<&[Const]>) -> Result<u64> {
        self.inner.estimate_range(lo, hi)
    }

    #[inline]
    fn discard(&mut self) {
        self.inner.discard()
    }

    #[inline]
    fn close(&mut self, ctx: &mut QueryContext) -> Result<()> {
        self.inner.close(ctx)
    }
}
