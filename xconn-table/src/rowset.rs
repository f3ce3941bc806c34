//! Materialized rows of snapshot backends and buffered remote results.
use crate::cursor::ReadStatus;
use crate::def::TableDef;
use crate::error::{Error, Result};
use xconn_catalog::ColumnDef;
use xconn_datatype::{Const, PreciseType};

#[derive(Debug, Default)]
pub(crate) struct RowSet {
    rows: Vec<Vec<Const>>,
    /// Index of current row.
    current: Option<usize>,
    next: usize,
}

impl RowSet {
    #[inline]
    pub fn with_capacity(n: usize) -> Self {
        RowSet {
            rows: Vec::with_capacity(n),
            current: None,
            next: 0,
        }
    }

    #[inline]
    pub fn push(&mut self, row: Vec<Const>) {
        self.rows.push(row)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn clear(&mut self) {
        self.rows.clear();
        self.current = None;
        self.next = 0;
    }

    pub fn advance(&mut self) -> ReadStatus {
        if self.next < self.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            ReadStatus::Row
        } else {
            self.current = None;
            ReadStatus::EndOfData
        }
    }

    /// Makes the row with given 1-based ordinal current.
    pub fn seek(&mut self, rowid: u64) -> ReadStatus {
        if rowid == 0 || rowid as usize > self.rows.len() {
            self.current = None;
            return ReadStatus::NotFound;
        }
        let i = rowid as usize - 1;
        self.current = Some(i);
        self.next = i + 1;
        ReadStatus::Row
    }

    /// 1-based ordinal of current row, 0 before first row.
    #[inline]
    pub fn rowid(&self) -> u64 {
        self.current.map(|i| i as u64 + 1).unwrap_or_default()
    }

    #[inline]
    pub fn current(&self) -> Option<&[Const]> {
        self.current.map(|i| &self.rows[i][..])
    }

    /// Value at position of current row.
    pub fn value(&self, pos: usize, col: &ColumnDef) -> Result<Const> {
        let row = self
            .current()
            .ok_or_else(|| Error::InvalidState("no current row".to_string()))?;
        let v = row
            .get(pos)
            .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
        v.cast_to(col.pty)
            .map_err(|e| Error::RecordCorrupt(self.rowid(), e.to_string()))
    }
}

/// Maps every column of the table to a position in fixed attribute
/// rows. A `flag` option selects the attribute explicitly, otherwise
/// the column is matched by name.
pub(crate) fn map_columns(def: &TableDef, attrs: &[&str]) -> Result<Vec<Option<usize>>> {
    def.columns
        .iter()
        .map(|c| {
            if c.special.is_some() {
                return Ok(None);
            }
            if let Some(flag) = c.opts.offset {
                if flag >= attrs.len() {
                    return Err(Error::invalid_option("flag", flag.to_string()));
                }
                return Ok(Some(flag));
            }
            attrs
                .iter()
                .position(|a| c.name_eq(a))
                .map(Some)
                .ok_or_else(|| Error::ColumnNotFound(c.name.to_string()))
        })
        .collect()
}

/// Synthesizes column definitions of fixed attributes.
pub(crate) fn synthesize(attrs: &[(&str, PreciseType)]) -> Vec<ColumnDef> {
    attrs
        .iter()
        .enumerate()
        .map(|(i, (name, pty))| ColumnDef::new(name, i as u32, *pty))
        .collect()
}
