//! Tables listing files of a directory.
use crate::access::{Access, OpenArgs, RowInfo};
use crate::config::Config;
use crate::cursor::{Cardinality, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use crate::file::set;
use crate::rowset::{map_columns, synthesize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use xconn_catalog::{ColumnDef, OptionBag};
use xconn_datatype::{Const, Datetime, PreciseType};

const ATTRS: [&str; 6] = ["PATH", "NAME", "EXT", "SIZE", "MODIFIED", "KIND"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirDef {
    /// Wildcard pattern resolved against the data path.
    pub pattern: PathBuf,
    /// Search sub-directories too.
    pub subdir: bool,
}

impl DirDef {
    pub fn parse(config: &Config, options: &OptionBag) -> Result<Self> {
        let name = options
            .get("file_name")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::invalid_option("file_name", ""))?;
        let path = Path::new(name.trim());
        let pattern = if path.is_absolute() {
            path.to_path_buf()
        } else {
            config.data_path.join(path)
        };
        Ok(DirDef {
            pattern,
            subdir: options.bool_or("subdir", false)?,
        })
    }

    pub fn default_columns() -> Vec<ColumnDef> {
        synthesize(&[
            (ATTRS[0], PreciseType::var_utf8(255)),
            (ATTRS[1], PreciseType::var_utf8(128)),
            (ATTRS[2], PreciseType::var_utf8(16)),
            (ATTRS[3], PreciseType::u64()),
            (ATTRS[4], PreciseType::Datetime(0)),
            (ATTRS[5], PreciseType::var_utf8(8)),
        ])
    }

    /// Lists matching files in sorted order.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let (dir, pattern) = set::split_pattern(&self.pattern)?;
        let re = set::wildcard_regex(&pattern)?;
        let mut files = vec![];
        set::collect(&dir, &re, self.subdir, &mut files)?;
        files.sort();
        Ok(files)
    }
}

/// DirTable lists one row per matching file, taken at open.
pub struct DirTable {
    def: Arc<TableDef>,
    ddef: DirDef,
    positions: Vec<Option<usize>>,
    files: Vec<PathBuf>,
    /// Index of current file.
    current: Option<usize>,
    next: usize,
}

impl DirTable {
    pub fn new(def: Arc<TableDef>) -> Result<Self> {
        let ddef = match &def.access {
            AccessDef::Dir(d) => d.clone(),
            _ => return Err(def.access_mismatch()),
        };
        let positions = map_columns(&def, &ATTRS)?;
        Ok(DirTable {
            def,
            ddef,
            positions,
            files: vec![],
            current: None,
            next: 0,
        })
    }

    fn attr(&self, path: &Path, attr: usize) -> Result<Const> {
        let text = |s: Option<&std::ffi::OsStr>| {
            Const::new_str(&s.map(|s| s.to_string_lossy()).unwrap_or_default())
        };
        let v = match attr {
            0 => Const::new_str(&path.to_string_lossy()),
            1 => text(path.file_stem()),
            2 => text(path.extension()),
            _ => {
                let meta = fs::symlink_metadata(path)?;
                match attr {
                    3 => Const::U64(meta.len()),
                    4 => match meta.modified() {
                        Ok(t) => {
                            let t = OffsetDateTime::from(t);
                            Const::Datetime(Datetime::new(t.date(), t.time()))
                        }
                        Err(_) => Const::Null,
                    },
                    _ if meta.file_type().is_symlink() => Const::new_str("link"),
                    _ => Const::new_str("file"),
                }
            }
        };
        Ok(v)
    }
}

impl Access for DirTable {
    fn open(&mut self, _args: OpenArgs<'_>) -> Result<()> {
        self.files = self.ddef.list()?;
        self.current = None;
        self.next = 0;
        log::debug!(
            "directory table {} lists {} files",
            self.def.name.as_str(),
            self.files.len()
        );
        Ok(())
    }

    fn read_next(&mut self, _ctx: &mut QueryContext) -> Result<ReadStatus> {
        if self.next >= self.files.len() {
            self.current = None;
            return Ok(ReadStatus::EndOfData);
        }
        self.current = Some(self.next);
        self.next += 1;
        Ok(ReadStatus::Row)
    }

    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> Result<Const> {
        let attr = self
            .positions
            .get(idx)
            .copied()
            .flatten()
            .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
        let path = self
            .current
            .map(|i| &self.files[i])
            .ok_or_else(|| Error::InvalidState("no current row".to_string()))?;
        let v = self.attr(path, attr)?;
        v.cast_to(col.pty)
            .map_err(|e| Error::RecordCorrupt(self.next as u64, e.to_string()))
    }

    fn row_info(&self) -> RowInfo<'_> {
        let rowid = self.current.map(|i| i as u64 + 1).unwrap_or_default();
        RowInfo {
            rowid,
            rownum: rowid,
            file: self.current.map(|i| (i, self.files[i].as_path())),
            ..Default::default()
        }
    }

    #[inline]
    fn cardinality(&mut self) -> Result<Cardinality> {
        Ok(Cardinality::Exact(self.files.len() as u64))
    }

    #[inline]
    fn position(&self) -> Position {
        Position(self.current.map(|i| i as u64 + 1).unwrap_or_default())
    }

    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        if pos.0 == 0 || pos.0 as usize > self.files.len() {
            self.current = None;
            return Ok(ReadStatus::NotFound);
        }
        let i = pos.0 as usize - 1;
        self.current = Some(i);
        self.next = i + 1;
        Ok(ReadStatus::Row)
    }

    fn close(&mut self, _ctx: &mut QueryContext) -> Result<()> {
        self.files.clear();
        self.current = None;
        Ok(())
    }
}
