use crate::access::RowInfo;
use crate::cursor::Usage;
use semistr::SemiStr;
use std::path::{Component, Path, MAIN_SEPARATOR};
use std::sync::Arc;
use xconn_catalog::PseudoColumn;
use xconn_datatype::Const;

/// ColumnAccessor lazily materializes one column of the current row.
///
/// The value holder survives row advances. Only the read bit is
/// cleared, so a column read twice in one row hits the backend once.
#[derive(Debug, Clone)]
pub struct ColumnAccessor {
    pub(crate) name: SemiStr,
    /// Index into the columns of table definition. Absent for
    /// pseudo-columns the table does not declare.
    pub(crate) def_idx: Option<usize>,
    pub(crate) special: Option<PseudoColumn>,
    pub(crate) usage: Usage,
    pub(crate) value: Const,
    pub(crate) read: bool,
    /// File index the cached file-part value belongs to.
    pub(crate) file_cache: Option<usize>,
    pub(crate) fetches: u64,
}

impl ColumnAccessor {
    #[inline]
    pub(crate) fn new(
        name: SemiStr,
        def_idx: Option<usize>,
        special: Option<PseudoColumn>,
        usage: Usage,
    ) -> Self {
        ColumnAccessor {
            name,
            def_idx,
            special,
            usage,
            value: Const::Null,
            read: false,
            file_cache: None,
            fetches: 0,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    #[inline]
    pub fn usage(&self) -> Usage {
        self.usage
    }

    #[inline]
    pub fn special(&self) -> Option<PseudoColumn> {
        self.special
    }

    #[inline]
    pub fn is_materialized(&self) -> bool {
        self.read
    }

    /// Number of times the value was fetched from the backend.
    #[inline]
    pub fn fetches(&self) -> u64 {
        self.fetches
    }

    /// Clears read bit at row advance.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.read = false;
    }

    #[inline]
    pub(crate) fn set(&mut self, value: Const) {
        self.value = value;
        self.read = true;
        self.fetches += 1;
    }

    /// Evaluates pseudo-column from row context. File parts are
    /// recomputed only when the current file changes.
    pub(crate) fn eval_special(&mut self, sp: PseudoColumn, info: &RowInfo<'_>, fallback: &Fallback<'_>) {
        if sp.is_file_part() {
            if let Some((file_idx, path)) = info.file {
                if self.file_cache == Some(file_idx) {
                    self.read = true;
                    return;
                }
                self.set(file_part(sp, path));
                self.file_cache = Some(file_idx);
                return;
            }
            self.file_cache = None;
            self.set(Const::Null);
            return;
        }
        let v = match sp {
            PseudoColumn::RowId => Const::U64(info.rowid),
            PseudoColumn::RowNum => Const::U64(info.rownum),
            PseudoColumn::TabId => opt_str(info.tabid.or(Some(fallback.table))),
            PseudoColumn::PartId => opt_str(info.partid.or(fallback.partid)),
            PseudoColumn::ServId => opt_str(info.servid.or(fallback.servid)),
            _ => Const::Null,
        };
        self.set(v)
    }
}

/// Values of pseudo-columns taken from table definition when the
/// backend has none.
pub(crate) struct Fallback<'a> {
    pub table: &'a str,
    pub partid: Option<&'a str>,
    pub servid: Option<&'a str>,
}

#[inline]
fn opt_str(s: Option<&str>) -> Const {
    match s {
        Some(s) => Const::String(Arc::from(s)),
        None => Const::Null,
    }
}

/// Decomposes a file path into the part named by the pseudo-column.
pub(crate) fn file_part(sp: PseudoColumn, path: &Path) -> Const {
    let s = match sp {
        PseudoColumn::FileId => path.to_string_lossy().into_owned(),
        PseudoColumn::FDisk => match path.components().next() {
            Some(Component::Prefix(p)) => p.as_os_str().to_string_lossy().into_owned(),
            _ => String::new(),
        },
        PseudoColumn::FPath => match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => {
                let mut s = p.to_string_lossy().into_owned();
                if !s.ends_with(MAIN_SEPARATOR) {
                    s.push(MAIN_SEPARATOR);
                }
                s
            }
            _ => String::new(),
        },
        PseudoColumn::FName => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        PseudoColumn::FType => path
            .extension()
            .map(|s| format!(".{}", s.to_string_lossy()))
            .unwrap_or_default(),
        _ => return Const::Null,
    };
    Const::String(Arc::from(s))
}
