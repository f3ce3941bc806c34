use super::command::{self, Command};
use super::{DriverCaps, RemoteConnection, RemoteDef};
use crate::access::{Access, OpenArgs, RowInfo};
use crate::cursor::{Cardinality, DeleteTarget, KeyOp, Mode, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use crate::rowset::RowSet;
use crate::session::GlobalState;
use std::sync::Arc;
use xconn_catalog::ColumnDef;
use xconn_datatype::Const;
use xconn_expr::sql::SqlWriter;
use xconn_expr::Expr;

/// Fetch strategy of the current result.
enum Fetch {
    /// Rows are fetched from the connection one at a time.
    Stream {
        row: Option<Vec<Const>>,
        eod: bool,
    },
    /// Whole result is held in memory.
    Buffer(RowSet),
}

#[derive(Clone)]
enum Insert {
    Prepared(u32),
    Literal(String),
}

/// RemoteTable reads and writes a table of a remote SQL source.
pub struct RemoteTable {
    def: Arc<TableDef>,
    rdef: RemoteDef,
    global: Arc<GlobalState>,
    conn: Option<Box<dyn RemoteConnection>>,
    writer: SqlWriter,
    /// Conjuncts of pushed filter rendered into WHERE.
    pushed: Vec<Expr>,
    command: Option<Command>,
    /// Position in result row of each table column.
    positions: Vec<Option<usize>>,
    fetch: Fetch,
    rowid: u64,
    mode: Mode,
    statement: Option<String>,
    /// Data change deferred until first read or delete.
    pending: bool,
    insert: Option<Insert>,
    insert_columns: Vec<usize>,
    key_parts: Vec<String>,
    last_op: Option<KeyOp>,
    affected: u64,
}

impl RemoteTable {
    pub fn new(def: Arc<TableDef>, global: &Arc<GlobalState>) -> Result<Self> {
        let rdef = match &def.access {
            AccessDef::Remote(r) => r.clone(),
            _ => return Err(def.access_mismatch()),
        };
        Ok(RemoteTable {
            def,
            rdef,
            global: Arc::clone(global),
            conn: None,
            writer: SqlWriter::default(),
            pushed: vec![],
            command: None,
            positions: vec![],
            fetch: Fetch::Stream {
                row: None,
                eod: false,
            },
            rowid: 0,
            mode: Mode::Read,
            statement: None,
            pending: false,
            insert: None,
            insert_columns: vec![],
            key_parts: vec![],
            last_op: None,
            affected: 0,
        })
    }

    #[inline]
    fn conn(&mut self) -> Result<&mut Box<dyn RemoteConnection>> {
        self.conn
            .as_mut()
            .ok_or_else(|| Error::InvalidState("remote connection not open".to_string()))
    }

    /// Returns true if the result is held in memory.
    #[inline]
    pub fn is_buffered(&self) -> bool {
        matches!(self.fetch, Fetch::Buffer(_))
    }

    fn where_clause(&self) -> Option<String> {
        if self.pushed.is_empty() {
            return None;
        }
        let (w, _) = self.writer.split_pushable(Expr::pred_conj(self.pushed.clone()));
        w
    }

    /// Executes the query and maps result columns to table columns
    /// by name.
    fn execute(&mut self, sql: &str) -> Result<()> {
        log::debug!("remote query of table {}: {}", self.def.name.as_str(), sql);
        let metas = self.conn()?.execute_query(sql)?;
        self.positions = self
            .def
            .columns
            .iter()
            .map(|c| {
                if c.special.is_some() {
                    return None;
                }
                metas.iter().position(|m| c.name_eq(&m.name))
            })
            .collect();
        self.rowid = 0;
        Ok(())
    }

    fn open_read(&mut self, columns: &[usize], ctx: &mut QueryContext) -> Result<()> {
        let names: Vec<&str> = columns
            .iter()
            .map(|i| self.def.columns[*i].name.as_str())
            .collect();
        let cmd = Command::select(&self.rdef, &self.writer, &names, self.where_clause());
        let mut capacity = None;
        if self.rdef.memory {
            let count_sql = cmd.count_sql();
            log::debug!("size query of table {}: {}", self.def.name.as_str(), count_sql);
            let n = self.conn()?.result_size(&count_sql)?;
            let limit = self.global.config().max_buffered_rows;
            if n > limit {
                ctx.warn(format!(
                    "result of table {} has {} rows, more than {} to buffer, fetching one at a time",
                    self.def.name.as_str(),
                    n,
                    limit
                ));
            } else {
                capacity = Some(n as usize);
            }
        }
        let sql = cmd.sql();
        self.command = Some(cmd);
        self.execute(&sql)?;
        if let Some(n) = capacity {
            let mut rows = RowSet::with_capacity(n);
            while let Some(row) = self.conn()?.fetch()? {
                rows.push(row);
            }
            log::debug!("buffered {} rows of table {}", rows.len(), self.def.name.as_str());
            self.fetch = Fetch::Buffer(rows);
        } else {
            self.fetch = Fetch::Stream {
                row: None,
                eod: false,
            };
        }
        Ok(())
    }

    fn open_insert(&mut self) -> Result<()> {
        let table = command::qualified_table(&self.rdef, &self.writer);
        self.insert_columns = self.def.data_columns().map(|(i, _)| i).collect();
        let names: Vec<String> = self
            .insert_columns
            .iter()
            .map(|i| self.writer.quote_ident(self.def.columns[*i].name.as_str()))
            .collect();
        let conn = self.conn()?;
        let caps = conn.capabilities();
        let mut insert = Insert::Literal(table.clone());
        if caps.contains(DriverCaps::PREPARE) && !caps.contains(DriverCaps::SINGLE_ROW_FETCH) {
            let sql = command::insert_prepared(&table, &names);
            match conn.prepare(&sql) {
                Ok(id) => insert = Insert::Prepared(id),
                Err(e) => log::warn!("cannot prepare {}, inserting literal rows: {}", sql, e),
            }
        }
        self.insert = Some(insert);
        Ok(())
    }

    /// Sends deferred update or delete.
    fn send_change(&mut self) -> Result<()> {
        if !self.pending {
            return Ok(());
        }
        self.pending = false;
        let remote = command::qualified_table(&self.rdef, &self.writer);
        let sql = match (&self.statement, self.mode) {
            (Some(stmt), _) => command::retarget(stmt, self.def.name.as_str(), &remote)?,
            (None, Mode::Delete) => match self.where_clause() {
                Some(w) => format!("DELETE FROM {} WHERE {}", remote, w),
                None => format!("DELETE FROM {}", remote),
            },
            (None, _) => {
                return Err(Error::InvalidState(format!(
                    "update of remote table {} requires statement text",
                    self.def.name.as_str()
                )))
            }
        };
        log::debug!("remote change of table {}: {}", self.def.name.as_str(), sql);
        let n = self.conn()?.execute_update(&sql)?;
        self.affected += n;
        Ok(())
    }

    fn next_streamed(&mut self) -> Result<ReadStatus> {
        if let Fetch::Stream { eod: true, .. } = self.fetch {
            return Ok(ReadStatus::EndOfData);
        }
        let next = self.conn()?.fetch()?;
        let status = match next {
            Some(_) => {
                self.rowid += 1;
                ReadStatus::Row
            }
            None => ReadStatus::EndOfData,
        };
        self.fetch = Fetch::Stream {
            eod: next.is_none(),
            row: next,
        };
        Ok(status)
    }

    fn current_value(&self, pos: usize, col: &ColumnDef) -> Result<Const> {
        match &self.fetch {
            Fetch::Buffer(rows) => rows.value(pos, col),
            Fetch::Stream { row: Some(row), .. } => {
                let v = row
                    .get(pos)
                    .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
                v.cast_to(col.pty)
                    .map_err(|e| Error::RecordCorrupt(self.rowid, e.to_string()))
            }
            Fetch::Stream { row: None, .. } => Err(Error::InvalidState("no current row".to_string())),
        }
    }

    fn key_refs(&self) -> Vec<&str> {
        self.key_parts.iter().map(|s| s.as_str()).collect()
    }
}

impl Access for RemoteTable {
    fn open(&mut self, args: OpenArgs<'_>) -> Result<()> {
        self.mode = args.mode;
        self.statement = args.statement.map(str::to_string);
        self.command = None;
        self.insert = None;
        self.pending = false;
        self.rowid = 0;
        self.affected = 0;
        self.last_op = None;
        let conn = self.rdef.connect(&self.global)?;
        let quote = if self.rdef.quoted {
            conn.quote_char()
        } else {
            None
        };
        self.writer = SqlWriter::new(quote);
        self.conn = Some(conn);
        log::debug!(
            "connected table {} to server {}",
            self.def.name.as_str(),
            self.conn.as_ref().map(|c| c.server_name()).unwrap_or_default()
        );
        match args.mode {
            Mode::Read => {
                let mut used: Vec<usize> = args.columns.iter().map(|c| c.idx).collect();
                used.sort_unstable();
                used.dedup();
                self.open_read(&used, args.ctx)
            }
            Mode::Insert => self.open_insert(),
            Mode::Update | Mode::Delete => {
                self.pending = true;
                Ok(())
            }
            Mode::MetadataOnly => Ok(()),
        }
    }

    fn read_next(&mut self, _ctx: &mut QueryContext) -> Result<ReadStatus> {
        match self.mode {
            Mode::Update | Mode::Delete => {
                self.send_change()?;
                return Ok(ReadStatus::EndOfData);
            }
            Mode::Insert | Mode::MetadataOnly => return Ok(ReadStatus::EndOfData),
            Mode::Read => (),
        }
        if let Fetch::Buffer(rows) = &mut self.fetch {
            let status = rows.advance();
            self.rowid = rows.rowid();
            return Ok(status);
        }
        self.next_streamed()
    }

    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> Result<Const> {
        match self.positions.get(idx).copied().flatten() {
            Some(pos) => self.current_value(pos, col),
            None => Err(Error::NotFoundInRow(col.name.to_string())),
        }
    }

    fn row_info(&self) -> RowInfo<'_> {
        RowInfo {
            rowid: self.rowid,
            rownum: self.rowid,
            file: None,
            tabid: Some(self.rdef.table.as_str()),
            partid: None,
            servid: self.conn.as_ref().map(|c| c.server_name()),
        }
    }

    fn cardinality(&mut self) -> Result<Cardinality> {
        let res = match &self.fetch {
            Fetch::Buffer(rows) => Cardinality::Exact(rows.len() as u64),
            Fetch::Stream { eod: true, .. } if self.last_op.is_none() => {
                Cardinality::Exact(self.rowid)
            }
            _ => Cardinality::Estimate(
                self.rdef
                    .estimate
                    .unwrap_or(self.global.config().remote_estimate),
            ),
        };
        Ok(res)
    }

    #[inline]
    fn position(&self) -> Position {
        Position(self.rowid)
    }

    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        if let Fetch::Buffer(rows) = &mut self.fetch {
            let status = rows.seek(pos.0);
            self.rowid = rows.rowid();
            return Ok(status);
        }
        let scrollable = self.rdef.scrollable;
        let conn = self.conn()?;
        if !scrollable || !conn.capabilities().contains(DriverCaps::SCROLL) {
            return Err(Error::NotImplemented("seek on streamed remote result"));
        }
        if !conn.scroll_to(pos.0)? {
            return Ok(ReadStatus::NotFound);
        }
        let row = conn.fetch()?;
        let status = if row.is_some() {
            ReadStatus::Row
        } else {
            ReadStatus::NotFound
        };
        self.rowid = pos.0;
        self.fetch = Fetch::Stream { row, eod: false };
        Ok(status)
    }

    fn push_filter(&mut self, filter: Expr) -> Result<Option<Expr>> {
        let writer = SqlWriter::default();
        let mut residual = vec![];
        for e in filter.into_conj() {
            let columns_known = e.collect_cols().iter().all(|c| {
                self.def
                    .find_column(c.as_str())
                    .map(|i| self.def.columns[i].special.is_none())
                    .unwrap_or(false)
            });
            if columns_known && writer.render(&e).is_ok() {
                self.pushed.push(e);
            } else {
                residual.push(e);
            }
        }
        log::debug!(
            "pushed {} conditions to remote table {}, {} kept",
            self.pushed.len(),
            self.def.name.as_str(),
            residual.len()
        );
        if residual.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Expr::pred_conj(residual)))
        }
    }

    #[inline]
    fn writable(&self) -> bool {
        self.rdef.srcdef.is_none()
    }

    fn write(&mut self, row: &[Const], _ctx: &mut QueryContext) -> Result<()> {
        if self.mode != Mode::Insert {
            return Err(Error::NotImplemented("update of current remote row"));
        }
        let values: Vec<Const> = self.insert_columns.iter().map(|i| row[*i].clone()).collect();
        let insert = self
            .insert
            .clone()
            .ok_or_else(|| Error::InvalidState("insert not prepared".to_string()))?;
        let n = match insert {
            Insert::Prepared(id) => self.conn()?.execute_prepared(id, &values)?,
            Insert::Literal(table) => {
                let names: Vec<String> = self
                    .insert_columns
                    .iter()
                    .map(|i| self.writer.quote_ident(self.def.columns[*i].name.as_str()))
                    .collect();
                let sql = command::insert_literal(&table, &names, &values)?;
                log::debug!("remote insert into table {}: {}", self.def.name.as_str(), sql);
                self.conn()?.execute_update(&sql)?
            }
        };
        self.affected += n;
        Ok(())
    }

    fn delete(&mut self, target: DeleteTarget, _ctx: &mut QueryContext) -> Result<()> {
        if target == DeleteTarget::All && self.statement.is_none() {
            // table-wide delete ignores filter
            self.pushed.clear();
        }
        self.send_change()
    }

    fn init_index(&mut self, key: usize) -> Result<()> {
        self.key_parts = self
            .def
            .key_columns(key)?
            .into_iter()
            .map(|i| self.def.columns[i].name.to_string())
            .collect();
        self.last_op = None;
        Ok(())
    }

    fn read_by_key(&mut self, op: KeyOp, key: &[Const]) -> Result<ReadStatus> {
        let status = match op {
            KeyOp::NEXT => self.next_streamed()?,
            KeyOp::SAME if self.last_op == Some(KeyOp::EQ) => self.next_streamed()?,
            KeyOp::SAME => ReadStatus::NotFound,
            _ => {
                let parts = self.key_refs();
                let (cond, order) = command::key_condition(&self.writer, &parts, op, key)?;
                let sql = self
                    .command
                    .as_ref()
                    .ok_or_else(|| Error::InvalidState("remote table not opened for read".to_string()))?
                    .with_key(cond.as_deref(), &order);
                self.execute(&sql)?;
                self.fetch = Fetch::Stream {
                    row: None,
                    eod: false,
                };
                self.last_op = Some(op);
                self.next_streamed()?
            }
        };
        Ok(match status {
            ReadStatus::EndOfData => ReadStatus::NotFound,
            s => s,
        })
    }

    fn estimate_range(&mut self, lo: Option<&[Const]>, hi: Option<&[Const]>) -> Result<u64> {
        let parts = self.key_refs();
        let mut conds = vec![];
        if let Some(lo) = lo {
            if let (Some(c), _) = command::key_condition(&self.writer, &parts, KeyOp::GE, lo)? {
                conds.push(c);
            }
        }
        if let Some(hi) = hi {
            if let (Some(c), _) = command::key_condition(&self.writer, &parts, KeyOp::LE, hi)? {
                conds.push(c);
            }
        }
        let cmd = self
            .command
            .as_ref()
            .ok_or_else(|| Error::InvalidState("remote table not opened for read".to_string()))?;
        let cond = if conds.is_empty() {
            None
        } else {
            Some(conds.join(" AND "))
        };
        let sql = cmd.count_with_key(cond.as_deref());
        self.conn()?.result_size(&sql)
    }

    fn close(&mut self, ctx: &mut QueryContext) -> Result<()> {
        if self.affected > 0 {
            ctx.add_affected(self.affected);
            ctx.note(format!(
                "{} rows affected in remote table {}",
                self.affected,
                self.rdef.table
            ));
            self.affected = 0;
        }
        self.command = None;
        self.insert = None;
        self.pending = false;
        self.fetch = Fetch::Stream {
            row: None,
            eod: false,
        };
        if let Some(mut conn) = self.conn.take() {
            if let Err(e) = conn.close() {
                log::warn!("close connection of table {}: {}", self.def.name.as_str(), e);
            }
        }
        Ok(())
    }
}
