use crate::access::{Backend, OpenArgs};
use crate::column::{ColumnAccessor, Fallback};
use crate::def::TableDef;
use crate::error::{Error, Result};
use crate::session::{ShareHandle, TableShare};
use bitflags::bitflags;
use semistr::SemiStr;
use std::sync::Arc;
use xconn_catalog::PseudoColumn;
use xconn_datatype::Const;
use xconn_expr::Expr;

/// Lifecycle stage of a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unopened,
    Open,
    /// A backend failure happened. Only close is accepted.
    Invalid,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Insert,
    Update,
    Delete,
    /// Only metadata and size hints are requested.
    MetadataOnly,
}

impl Mode {
    #[inline]
    pub fn is_write(&self) -> bool {
        matches!(self, Mode::Insert | Mode::Update | Mode::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    Row,
    EndOfData,
    /// Deleted or skipped record, caller should read on.
    /// For keyed lookup it means no match.
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Exact(u64),
    Estimate(u64),
    Unknown,
}

impl Cardinality {
    #[inline]
    pub fn rows(&self) -> Option<u64> {
        match self {
            Cardinality::Exact(n) | Cardinality::Estimate(n) => Some(*n),
            Cardinality::Unknown => None,
        }
    }
}

/// Opaque row position, meaningful only to the cursor that returned it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOp {
    EQ,
    GT,
    GE,
    LT,
    LE,
    /// Next entry in key order after the last one returned.
    NEXT,
    /// Next entry with the same key as the last lookup.
    SAME,
    FIRST,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteTarget {
    Current,
    All,
}

bitflags! {
    /// How a bound column is used by the current statement.
    pub struct Usage: u8 {
        const PROJECT = 0x01;
        const FILTER = 0x02;
        const KEY = 0x04;
    }
}

/// Identifier of a bound column, stable for the cursor lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnId(usize);

impl ColumnId {
    #[inline]
    pub fn value(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BoundColumn {
    pub idx: usize,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Note,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub level: Level,
    pub message: String,
}

/// Messages and counters of the query a cursor serves.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    message: Option<String>,
    warnings: Vec<Warning>,
    affected_rows: u64,
}

impl QueryContext {
    /// Message of the last failure.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    #[inline]
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    #[inline]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }

    #[inline]
    pub(crate) fn fail(&mut self, err: &Error) {
        self.message = Some(err.to_string());
    }

    #[inline]
    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}", message);
        self.warnings.push(Warning {
            level: Level::Warning,
            message,
        })
    }

    #[inline]
    pub(crate) fn note(&mut self, message: impl Into<String>) {
        self.warnings.push(Warning {
            level: Level::Note,
            message: message.into(),
        })
    }

    #[inline]
    pub(crate) fn add_affected(&mut self, n: u64) {
        self.affected_rows += n;
    }
}

/// TableCursor runs one query against one table.
///
/// It owns the backend and the accessors of all bound columns.
/// Pseudo-columns are kept at the front of the column order.
pub struct TableCursor {
    def: Arc<TableDef>,
    backend: Backend,
    stage: Stage,
    mode: Mode,
    columns: Vec<ColumnAccessor>,
    order: Vec<usize>,
    on_row: bool,
    statement: Option<String>,
    index: Option<usize>,
    ctx: QueryContext,
    share: Option<ShareHandle>,
}

impl TableCursor {
    pub(crate) fn new(def: Arc<TableDef>, backend: Backend, mode: Mode, share: ShareHandle) -> Self {
        let mut cursor = TableCursor {
            def,
            backend,
            stage: Stage::Unopened,
            mode,
            columns: vec![],
            order: vec![],
            on_row: false,
            statement: None,
            index: None,
            ctx: QueryContext::default(),
            share: Some(share),
        };
        // declared pseudo-columns are always available
        let def = Arc::clone(&cursor.def);
        for (idx, cd) in def.columns.iter().enumerate() {
            if let Some(sp) = cd.special {
                cursor.push_column(cd.name.clone(), Some(idx), Some(sp), Usage::empty());
            }
        }
        cursor
    }

    #[inline]
    pub fn def(&self) -> &Arc<TableDef> {
        &self.def
    }

    #[inline]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[inline]
    pub fn context(&self) -> &QueryContext {
        &self.ctx
    }

    /// Metadata shared with other cursors on the same table, held
    /// until close.
    #[inline]
    pub fn share(&self) -> Option<&Arc<TableShare>> {
        self.share.as_ref().map(|h| h.share())
    }

    /// Bound column ids, pseudo-columns first.
    #[inline]
    pub fn columns(&self) -> impl Iterator<Item = ColumnId> + '_ {
        self.order.iter().map(|i| ColumnId(*i))
    }

    #[inline]
    pub fn accessor(&self, id: ColumnId) -> Option<&ColumnAccessor> {
        self.columns.get(id.0)
    }

    #[inline]
    pub fn is_materialized(&self, id: ColumnId) -> bool {
        self.columns.get(id.0).map(|c| c.read).unwrap_or_default()
    }

    /// Number of backend fetches of the column so far.
    #[inline]
    pub fn fetch_count(&self, id: ColumnId) -> u64 {
        self.columns.get(id.0).map(|c| c.fetches).unwrap_or_default()
    }

    /// Binds a column by name. Binding a name again returns the same
    /// id with merged usage.
    pub fn bind_column(&mut self, name: &str, usage: Usage) -> Result<ColumnId> {
        self.check_not_closed()?;
        if let Some(i) = self.columns.iter().position(|c| c.name.as_str().eq_ignore_ascii_case(name)) {
            self.columns[i].usage |= usage;
            return Ok(ColumnId(i));
        }
        match self.def.find_column(name) {
            Some(idx) => {
                let cd = &self.def.columns[idx];
                Ok(self.push_column(cd.name.clone(), Some(idx), cd.special, usage))
            }
            None => match PseudoColumn::from_name(name) {
                Some(sp) => Ok(self.push_column(SemiStr::new(sp.name()), None, Some(sp), usage)),
                None => {
                    let err = Error::ColumnNotFound(name.to_string());
                    self.ctx.fail(&err);
                    Err(err)
                }
            },
        }
    }

    fn push_column(
        &mut self,
        name: SemiStr,
        def_idx: Option<usize>,
        special: Option<PseudoColumn>,
        usage: Usage,
    ) -> ColumnId {
        let id = self.columns.len();
        self.columns
            .push(ColumnAccessor::new(name, def_idx, special, usage));
        if special.is_some() {
            let pos = self
                .order
                .iter()
                .take_while(|i| self.columns[**i].special.is_some())
                .count();
            self.order.insert(pos, id);
        } else {
            self.order.push(id);
        }
        ColumnId(id)
    }

    /// Supplies host statement text, used by backends that forward
    /// update and delete as a whole.
    #[inline]
    pub fn set_statement(&mut self, sql: &str) {
        self.statement = Some(sql.to_string());
    }

    /// Pushes a filter down before open. Returns the residual the
    /// host must still evaluate, or None if the backend enforces all
    /// of it. Columns of the residual are bound for filtering.
    pub fn push_filter(&mut self, filter: Expr) -> Result<Option<Expr>> {
        if self.stage != Stage::Unopened {
            return self.fail(Error::InvalidState(
                "filter must be pushed before open".to_string(),
            ));
        }
        let res = self.backend.access().push_filter(filter);
        let residual = self.track(res)?;
        if let Some(r) = &residual {
            for col in r.collect_cols() {
                if self.def.find_column(col.as_str()).is_some()
                    || PseudoColumn::from_name(col.as_str()).is_some()
                {
                    self.bind_column(col.as_str(), Usage::FILTER)?;
                }
            }
        }
        Ok(residual)
    }

    /// Opens the cursor. Write modes on read-only tables are rejected
    /// and leave the cursor unopened.
    pub fn open(&mut self, mode: Mode) -> Result<()> {
        match self.stage {
            Stage::Unopened => (),
            Stage::Invalid => {
                let mut ctx = QueryContext::default();
                let _ = self.backend.access().close(&mut ctx);
            }
            Stage::Open => return self.fail(Error::InvalidState("cursor already open".to_string())),
            Stage::Closed => return self.fail(Error::InvalidState("cursor closed".to_string())),
        }
        if mode.is_write() && (self.def.readonly || !self.backend.access_ref().writable()) {
            self.stage = Stage::Unopened;
            return self.fail(Error::ReadOnlyViolation(self.def.name.to_string()));
        }
        self.mode = mode;
        self.on_row = false;
        if mode == Mode::MetadataOnly {
            self.stage = Stage::Open;
            return Ok(());
        }
        let bound: Vec<BoundColumn> = self
            .columns
            .iter()
            .filter(|c| c.special.is_none())
            .filter_map(|c| c.def_idx.map(|idx| BoundColumn { idx, usage: c.usage }))
            .collect();
        let args = OpenArgs {
            mode,
            columns: &bound,
            statement: self.statement.as_deref(),
            ctx: &mut self.ctx,
        };
        match self.backend.access().open(args) {
            Ok(()) => {
                log::debug!("open table {} in mode {:?}", self.def.name.as_str(), mode);
                self.stage = Stage::Open;
                Ok(())
            }
            Err(e) => {
                self.stage = if e.invalidates_cursor() {
                    Stage::Invalid
                } else {
                    Stage::Unopened
                };
                self.fail(e)
            }
        }
    }

    /// Advances to next row and clears read bit of every accessor.
    pub fn read_next(&mut self) -> Result<ReadStatus> {
        self.check_open()?;
        for c in &mut self.columns {
            c.reset();
        }
        self.on_row = false;
        if self.mode == Mode::MetadataOnly {
            return Ok(ReadStatus::EndOfData);
        }
        let res = self.backend.access().read_next(&mut self.ctx);
        let status = self.track(res)?;
        self.on_row = status == ReadStatus::Row;
        Ok(status)
    }

    /// Returns value of the column in current row.
    pub fn eval(&mut self, id: ColumnId) -> Result<&Const> {
        if id.0 >= self.columns.len() {
            return self.fail(Error::InvalidState(format!("unbound column id {}", id.0)));
        }
        self.check_open()?;
        if !self.on_row {
            return self.fail(Error::InvalidState("no current row".to_string()));
        }
        if !self.columns[id.0].read {
            let res = self.materialize(id.0);
            self.track(res)?;
        }
        Ok(&self.columns[id.0].value)
    }

    fn materialize(&mut self, i: usize) -> Result<()> {
        let TableCursor {
            def,
            backend,
            columns,
            share,
            ..
        } = self;
        let acc = &mut columns[i];
        match (acc.special, acc.def_idx) {
            (Some(sp), _) => {
                let options = match share {
                    Some(h) => &h.share().options,
                    None => &def.options,
                };
                let fallback = Fallback {
                    table: def.name.as_str(),
                    partid: options.get("partname"),
                    servid: options.get("server"),
                };
                let info = backend.access_ref().row_info();
                acc.eval_special(sp, &info, &fallback);
            }
            (None, Some(idx)) => {
                let v = backend.access().read_column(idx, &def.columns[idx])?;
                acc.set(v);
            }
            (None, None) => return Err(Error::NotFoundInRow(acc.name.to_string())),
        }
        Ok(())
    }

    /// Writes a row given in definition order. Insert appends,
    /// update replaces current row.
    pub fn write(&mut self, row: &[Const]) -> Result<()> {
        self.check_open()?;
        if !matches!(self.mode, Mode::Insert | Mode::Update) {
            return self.fail(Error::InvalidState(format!("cannot write in {:?} mode", self.mode)));
        }
        if row.len() != self.def.columns.len() {
            return self.fail(Error::InvalidState(format!(
                "row has {} values but table has {} columns",
                row.len(),
                self.def.columns.len()
            )));
        }
        if self.mode == Mode::Update && !self.on_row {
            return self.fail(Error::InvalidState("no current row".to_string()));
        }
        let res = self.backend.access().write(row, &mut self.ctx);
        self.track(res)
    }

    pub fn delete(&mut self, target: DeleteTarget) -> Result<()> {
        self.check_open()?;
        if self.mode != Mode::Delete {
            return self.fail(Error::InvalidState(format!("cannot delete in {:?} mode", self.mode)));
        }
        if target == DeleteTarget::Current && !self.on_row {
            return self.fail(Error::InvalidState("no current row".to_string()));
        }
        let res = self.backend.access().delete(target, &mut self.ctx);
        self.track(res)?;
        if target == DeleteTarget::Current {
            self.on_row = false;
        }
        Ok(())
    }

    /// Closes the cursor and releases backend resources. Calling it
    /// again, or after a failed open, does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.stage == Stage::Closed {
            return Ok(());
        }
        if self.stage == Stage::Invalid {
            self.backend.access().discard();
        }
        let res = self.backend.access().close(&mut self.ctx);
        self.stage = Stage::Closed;
        self.on_row = false;
        self.share.take();
        log::debug!("close table {}", self.def.name.as_str());
        if let Err(e) = &res {
            self.ctx.fail(e);
        }
        res
    }

    #[inline]
    pub fn position(&mut self) -> Result<Position> {
        self.check_open()?;
        Ok(self.backend.access_ref().position())
    }

    /// Makes the row at given position current.
    pub fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        self.check_open()?;
        for c in &mut self.columns {
            c.reset();
        }
        let res = self.backend.access().seek(pos);
        let status = self.track(res)?;
        self.on_row = status == ReadStatus::Row;
        Ok(status)
    }

    /// Row count of the table. Only exact when the backend can
    /// guarantee it.
    pub fn cardinality(&mut self) -> Result<Cardinality> {
        if self.stage == Stage::Closed || self.stage == Stage::Invalid {
            return self.fail(Error::InvalidState(format!("cursor is {:?}", self.stage)));
        }
        let res = self.backend.access().cardinality();
        self.track(res)
    }

    /// Prepares keyed access on the index with given number.
    pub fn init_index(&mut self, key: usize) -> Result<()> {
        self.check_open()?;
        if !self.def.indexable() || key >= self.def.indexes.len() {
            return self.fail(Error::NotIndexable(self.def.name.to_string()));
        }
        let res = self.backend.access().init_index(key);
        self.track(res)?;
        self.index = Some(key);
        Ok(())
    }

    pub fn read_by_key(&mut self, op: KeyOp, key: &[Const]) -> Result<ReadStatus> {
        self.check_open()?;
        if self.index.is_none() {
            return self.fail(Error::InvalidState("index not initialized".to_string()));
        }
        for c in &mut self.columns {
            c.reset();
        }
        self.on_row = false;
        let res = self.backend.access().read_by_key(op, key);
        let status = self.track(res)?;
        self.on_row = status == ReadStatus::Row;
        Ok(status)
    }

    pub fn estimate_range(&mut self, lo: Option<&[Const]>, hi: Option<&[Const]>) -> Result<u64> {
        self.check_open()?;
        if self.index.is_none() {
            return self.fail(Error::InvalidState("index not initialized".to_string()));
        }
        let res = self.backend.access().estimate_range(lo, hi);
        self.track(res)
    }

    #[inline]
    fn check_open(&mut self) -> Result<()> {
        match self.stage {
            Stage::Open => Ok(()),
            stage => self.fail(Error::InvalidState(format!("cursor is {:?}", stage))),
        }
    }

    #[inline]
    fn check_not_closed(&mut self) -> Result<()> {
        match self.stage {
            Stage::Closed => self.fail(Error::InvalidState("cursor closed".to_string())),
            _ => Ok(()),
        }
    }

    /// Records failure on the query context and moves to invalid
    /// stage on backend failures.
    #[inline]
    fn track<T>(&mut self, res: Result<T>) -> Result<T> {
        match res {
            Ok(v) => Ok(v),
            Err(e) => {
                if e.invalidates_cursor() && self.stage == Stage::Open {
                    self.stage = Stage::Invalid;
                    self.on_row = false;
                }
                self.fail(e)
            }
        }
    }

    #[inline]
    fn fail<T>(&mut self, e: Error) -> Result<T> {
        let e = match e {
            Error::ReadOnlyViolation(name) if name.is_empty() => {
                Error::ReadOnlyViolation(self.def.name.to_string())
            }
            Error::NotIndexable(name) if name.is_empty() => {
                Error::NotIndexable(self.def.name.to_string())
            }
            other => other,
        };
        self.ctx.fail(&e);
        Err(e)
    }
}

impl Drop for TableCursor {
    fn drop(&mut self) {
        if self.stage != Stage::Closed {
            let _ = self.close();
        }
    }
}
