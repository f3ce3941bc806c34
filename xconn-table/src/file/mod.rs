//! File backends: delimited text, fixed-length text and fixed-length
//! binary records, optionally spread over several files.
mod bin;
mod csv;
mod fix;
pub(crate) mod set;

pub use self::bin::Endian;
pub use self::csv::CsvFormat;
pub use self::set::Multiple;

use self::bin::BinLayout;
use self::fix::FixLayout;
use crate::access::{Access, OpenArgs, RowInfo};
use crate::config::Config;
use crate::cursor::{Cardinality, DeleteTarget, KeyOp, Mode, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use crate::index::KeyIndex;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xconn_catalog::{BackendType, ColumnDef, OptionBag, PseudoColumn};
use xconn_datatype::{Const, PreciseType};

/// Typed options of file tables.
#[derive(Debug, Clone)]
pub struct FileDef {
    /// File name resolved against the data path.
    pub path: PathBuf,
    pub multiple: Multiple,
    pub format: FileFormat,
    pub lrecl: Option<usize>,
    /// Bad records tolerated per scan.
    pub maxerr: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileFormat {
    Csv(CsvFormat),
    Fix,
    Bin(Endian),
}

impl FileDef {
    pub fn parse(config: &Config, backend: BackendType, options: &OptionBag) -> Result<Self> {
        let file_name = options
            .get("file_name")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| Error::invalid_option("file_name", ""))?;
        let path = Path::new(file_name.trim());
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            config.data_path.join(path)
        };
        if options.bool_or("compressed", false)? {
            return Err(Error::invalid_option(
                "compressed",
                options.get("compressed").unwrap_or_default(),
            ));
        }
        let level: u8 = options.num_or("multiple", 0)?;
        let multiple = Multiple::from_level(level)
            .ok_or_else(|| Error::invalid_option("multiple", level.to_string()))?;
        let format = match backend {
            BackendType::Csv => FileFormat::Csv(CsvFormat::parse(options)?),
            BackendType::Fix => FileFormat::Fix,
            BackendType::Bin => {
                let endian = match options.get("endian") {
                    Some(e) => Endian::parse(e).ok_or_else(|| Error::invalid_option("endian", e))?,
                    None => Endian::Little,
                };
                FileFormat::Bin(endian)
            }
            other => {
                return Err(Error::InvalidState(format!("{} is not a file type", other)));
            }
        };
        let lrecl = options.get_num("lrecl")?;
        if lrecl == Some(0) {
            return Err(Error::invalid_option("lrecl", "0"));
        }
        let maxerr = options.num_or("maxerr", config.max_bad_records)?;
        Ok(FileDef {
            path,
            multiple,
            format,
            lrecl,
            maxerr,
        })
    }

    #[inline]
    pub fn is_multiple(&self) -> bool {
        self.multiple != Multiple::Single
    }

    /// Discovers columns of delimited files from the first file.
    /// Names come from the header, types from sampled rows.
    pub fn discover(&self, table: &str, config: &Config) -> Result<Vec<ColumnDef>> {
        let failed = |msg: String| Error::SchemaDiscoveryFailed(table.to_string(), msg);
        let format = match &self.format {
            FileFormat::Csv(f) => f,
            _ => return Err(failed("fixed layouts require declared columns".to_string())),
        };
        let files = set::expand(&self.path, self.multiple).map_err(|e| failed(e.to_string()))?;
        let first = files
            .first()
            .ok_or_else(|| failed(format!("no file matches {}", self.path.display())))?;
        let reader = BufReader::new(File::open(first).map_err(|e| failed(e.to_string()))?);
        let mut lines = reader.lines();
        let mut names: Option<Vec<String>> = None;
        let mut rows = vec![];
        while rows.len() < config.discovery_scan_rows {
            let line = match lines.next() {
                Some(l) => l.map_err(|e| failed(e.to_string()))?,
                None => break,
            };
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            match format.split(line) {
                Some(fields) if format.header && names.is_none() => names = Some(fields),
                Some(fields) => rows.push(fields),
                None => log::warn!("skip unterminated record while discovering {}", table),
            }
        }
        let names = match names {
            Some(n) => n,
            None => {
                let n = rows.iter().map(|r| r.len()).max().unwrap_or_default();
                (1..=n).map(|i| format!("COL{}", i)).collect()
            }
        };
        if names.is_empty() {
            return Err(failed(format!("file {} is empty", first.display())));
        }
        let cols = csv::infer_columns(&names, &rows);
        log::debug!("discovered {} columns of table {}", cols.len(), table);
        Ok(cols)
    }
}

/// How values are located in a record.
#[derive(Debug, Clone)]
enum Codec {
    Csv {
        format: CsvFormat,
        /// Field number of every column, None for pseudo-columns.
        fields: Vec<Option<usize>>,
        width: usize,
    },
    Fix(FixLayout),
    Bin(BinLayout),
}

impl Codec {
    fn build(def: &TableDef, fdef: &FileDef) -> Result<Self> {
        let codec = match &fdef.format {
            FileFormat::Csv(format) => {
                let mut next = 0;
                let fields = def
                    .columns
                    .iter()
                    .map(|c| {
                        if c.special.is_some() {
                            return Ok(None);
                        }
                        let f = match c.opts.offset {
                            Some(0) => return Err(Error::invalid_option("flag", "0")),
                            Some(f) => f - 1,
                            None => next,
                        };
                        next = f + 1;
                        Ok(Some(f))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let width = fields.iter().flatten().map(|f| f + 1).max().unwrap_or_default();
                Codec::Csv {
                    format: format.clone(),
                    fields,
                    width,
                }
            }
            FileFormat::Fix => Codec::Fix(FixLayout::build(&def.columns, fdef.lrecl)?),
            FileFormat::Bin(endian) => {
                Codec::Bin(BinLayout::build(&def.columns, fdef.lrecl, *endian)?)
            }
        };
        Ok(codec)
    }

    /// Record length of binary files, which have no terminator.
    #[inline]
    fn binary_lrecl(&self) -> Option<usize> {
        match self {
            Codec::Bin(layout) => Some(layout.lrecl),
            _ => None,
        }
    }

    #[inline]
    fn header(&self) -> bool {
        matches!(self, Codec::Csv { format, .. } if format.header)
    }

    /// Header line listing column names in field order.
    fn header_line(&self, def: &TableDef) -> Result<Option<Vec<u8>>> {
        match self {
            Codec::Csv {
                format,
                fields,
                width,
            } if format.header => {
                let mut names = vec![(String::new(), true); *width];
                for (col, f) in def.columns.iter().zip(fields) {
                    if let Some(f) = f {
                        names[*f] = (col.name.to_string(), true);
                    }
                }
                Ok(Some(format.join(&names)?.into_bytes()))
            }
            _ => Ok(None),
        }
    }

    fn encode(&self, def: &TableDef, row: &[Const], rowid: u64) -> Result<Vec<u8>> {
        match self {
            Codec::Csv {
                format,
                fields,
                width,
            } => {
                let mut texts = vec![(String::new(), false); *width];
                for ((col, f), v) in def.columns.iter().zip(fields).zip(row) {
                    if let Some(f) = f {
                        texts[*f] = (
                            v.to_text(col.opts.date_format.as_ref())?,
                            col.pty.is_textual(),
                        );
                    }
                }
                Ok(format.join(&texts)?.into_bytes())
            }
            Codec::Fix(layout) => layout.encode(&def.columns, row, rowid),
            Codec::Bin(layout) => layout.encode(&def.columns, row, rowid),
        }
    }
}

/// Sequential reader of raw records of one file.
struct RecordReader {
    inner: BufReader<File>,
    /// Offset of next record.
    offset: u64,
    lrecl: Option<usize>,
}

impl RecordReader {
    fn open(path: &Path, lrecl: Option<usize>) -> std::io::Result<Self> {
        Ok(RecordReader {
            inner: BufReader::new(File::open(path)?),
            offset: 0,
            lrecl,
        })
    }

    /// Reads next record into buffer and returns its offset and
    /// whether it is complete. Blank lines are skipped.
    fn read(&mut self, buf: &mut Vec<u8>) -> std::io::Result<Option<(u64, bool)>> {
        loop {
            buf.clear();
            let start = self.offset;
            match self.lrecl {
                Some(n) => {
                    let read = (&mut self.inner).take(n as u64).read_to_end(buf)?;
                    if read == 0 {
                        return Ok(None);
                    }
                    self.offset += read as u64;
                    return Ok(Some((start, read == n)));
                }
                None => {
                    let read = self.inner.read_until(b'\n', buf)?;
                    if read == 0 {
                        return Ok(None);
                    }
                    self.offset += read as u64;
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    if buf.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    return Ok(Some((start, true)));
                }
            }
        }
    }

    fn seek(&mut self, offset: u64) -> std::io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }
}

/// Location of a record already visited, indexed by rowid.
#[derive(Debug, Clone, Copy)]
struct Mark {
    file: usize,
    offset: u64,
    rownum: u64,
}

/// Records of a file loaded for update and delete. Deleted records
/// are None until the file is rewritten at close.
#[derive(Debug, Default)]
struct EditBuffer {
    header: Option<Vec<u8>>,
    records: Vec<Option<Vec<u8>>>,
    current: Option<usize>,
    next: usize,
    dirty: bool,
}

/// FileTable reads and writes records of one or more files.
pub struct FileTable {
    def: Arc<TableDef>,
    fdef: FileDef,
    codec: Codec,
    files: Option<Vec<PathBuf>>,
    mode: Mode,
    reader: Option<RecordReader>,
    /// Index of the file being read.
    file_idx: usize,
    next_file: usize,
    rowid: u64,
    rownum: u64,
    record: Vec<u8>,
    /// Split fields of current delimited record.
    fields: Vec<String>,
    on_record: bool,
    marks: Vec<Mark>,
    bad: u32,
    edit: Option<EditBuffer>,
    writer: Option<BufWriter<File>>,
    index: Option<(KeyIndex, Vec<usize>)>,
    rows: Option<u64>,
}

impl FileTable {
    pub fn new(def: Arc<TableDef>) -> Result<Self> {
        let fdef = match &def.access {
            AccessDef::File(f) => f.clone(),
            _ => return Err(def.access_mismatch()),
        };
        let codec = Codec::build(&def, &fdef)?;
        Ok(FileTable {
            def,
            fdef,
            codec,
            files: None,
            mode: Mode::Read,
            reader: None,
            file_idx: 0,
            next_file: 0,
            rowid: 0,
            rownum: 0,
            record: vec![],
            fields: vec![],
            on_record: false,
            marks: vec![],
            bad: 0,
            edit: None,
            writer: None,
            index: None,
            rows: None,
        })
    }

    fn ensure_files(&mut self) -> Result<()> {
        if self.files.is_none() {
            self.files = Some(set::expand(&self.fdef.path, self.fdef.multiple)?);
        }
        Ok(())
    }

    #[inline]
    fn files(&self) -> &[PathBuf] {
        self.files.as_deref().unwrap_or_default()
    }

    fn rewind(&mut self) {
        self.reader = None;
        self.file_idx = 0;
        self.next_file = 0;
        self.rowid = 0;
        self.rownum = 0;
        self.on_record = false;
        self.bad = 0;
        if let Some(edit) = self.edit.as_mut() {
            edit.current = None;
            edit.next = 0;
        }
    }

    /// Opens file of given index, skipping its header line.
    /// A missing file reads as empty.
    fn open_file(&mut self, idx: usize, ctx: &mut QueryContext) -> Result<bool> {
        let path = &self.files()[idx];
        match RecordReader::open(path, self.codec.binary_lrecl()) {
            Ok(mut reader) => {
                if self.codec.header() {
                    let mut buf = vec![];
                    reader.read(&mut buf)?;
                }
                log::debug!("table {} switches to file {}", self.def.name.as_str(), path.display());
                self.reader = Some(reader);
                self.file_idx = idx;
                self.next_file = idx + 1;
                self.rownum = 0;
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ctx.note(format!("file {} does not exist", path.display()));
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads next raw record of the file set. Returns whether it is
    /// complete, or None at end of data.
    fn next_raw(&mut self, ctx: &mut QueryContext) -> Result<Option<bool>> {
        loop {
            if self.reader.is_none() {
                loop {
                    let idx = self.next_file;
                    if idx >= self.files().len() {
                        return Ok(None);
                    }
                    self.next_file += 1;
                    if self.open_file(idx, ctx)? {
                        break;
                    }
                }
            }
            let res = match self.reader.as_mut() {
                Some(r) => r.read(&mut self.record)?,
                None => None,
            };
            match res {
                Some((offset, complete)) => {
                    self.rowid += 1;
                    self.rownum += 1;
                    if self.rowid as usize == self.marks.len() + 1 {
                        self.marks.push(Mark {
                            file: self.file_idx,
                            offset,
                            rownum: self.rownum,
                        });
                    }
                    return Ok(Some(complete));
                }
                None => self.reader = None,
            }
        }
    }

    /// Validates current record. Bad records within the error budget
    /// are skipped.
    fn check_record(&mut self, complete: bool, ctx: &mut QueryContext) -> Result<ReadStatus> {
        let problem = if !complete {
            Some("incomplete record".to_string())
        } else if let Codec::Csv { format, width, .. } = &self.codec {
            let line = String::from_utf8_lossy(&self.record);
            match format.split(&line) {
                Some(fields) if fields.len() >= *width => {
                    self.fields = fields;
                    None
                }
                Some(fields) => Some(format!("{} fields, {} expected", fields.len(), width)),
                None => Some("unterminated quoted field".to_string()),
            }
        } else {
            None
        };
        match problem {
            None => {
                self.on_record = true;
                Ok(ReadStatus::Row)
            }
            Some(msg) => {
                self.on_record = false;
                self.bad += 1;
                if self.bad > self.fdef.maxerr {
                    return Err(Error::RecordCorrupt(self.rowid, msg));
                }
                ctx.warn(format!(
                    "skip bad record {} of table {}: {}",
                    self.rowid,
                    self.def.name.as_str(),
                    msg
                ));
                Ok(ReadStatus::NotFound)
            }
        }
    }

    fn next_edit(&mut self) -> Option<bool> {
        let edit = self.edit.as_mut()?;
        while edit.next < edit.records.len() {
            let i = edit.next;
            edit.next += 1;
            if let Some(rec) = &edit.records[i] {
                self.record.clear();
                self.record.extend_from_slice(rec);
                edit.current = Some(i);
                self.rowid = i as u64 + 1;
                self.rownum = self.rowid;
                return Some(true);
            }
        }
        edit.current = None;
        None
    }

    /// Loads the single file of the table for update and delete.
    fn load(&mut self) -> Result<()> {
        let path = self.fdef.path.clone();
        let data = match fs::read(&path) {
            Ok(d) => d,
            Err(e) if e.kind() == ErrorKind::NotFound => vec![],
            Err(e) => return Err(e.into()),
        };
        let mut edit = EditBuffer::default();
        match self.codec.binary_lrecl() {
            Some(n) => {
                edit.records = data.chunks(n).map(|c| Some(c.to_vec())).collect();
            }
            None => {
                let mut lines = data
                    .split(|b| *b == b'\n')
                    .map(|l| l.strip_suffix(b"\r").unwrap_or(l))
                    .filter(|l| !l.iter().all(|b| b.is_ascii_whitespace()));
                if self.codec.header() {
                    edit.header = lines.next().map(|l| l.to_vec());
                }
                edit.records = lines.map(|l| Some(l.to_vec())).collect();
            }
        }
        log::debug!(
            "load {} records of table {} for {:?}",
            edit.records.len(),
            self.def.name.as_str(),
            self.mode
        );
        self.edit = Some(edit);
        Ok(())
    }

    /// Writes loaded records back through a temporary file replacing
    /// the original.
    fn rewrite(&mut self) -> Result<()> {
        let edit = match self.edit.as_mut() {
            Some(e) if e.dirty => e,
            _ => return Ok(()),
        };
        let dir = match self.fdef.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let line = self.codec.binary_lrecl().is_none();
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut w = BufWriter::new(tmp.as_file_mut());
            if let Some(h) = &edit.header {
                w.write_all(h)?;
                w.write_all(b"\n")?;
            }
            for rec in edit.records.iter().flatten() {
                w.write_all(rec)?;
                if line {
                    w.write_all(b"\n")?;
                }
            }
            w.flush()?;
        }
        tmp.persist(&self.fdef.path).map_err(|e| Error::from(e.error))?;
        edit.dirty = false;
        log::debug!("rewrite file {}", self.fdef.path.display());
        Ok(())
    }

    fn open_writer(&mut self) -> Result<()> {
        let path = &self.fdef.path;
        let len = match fs::metadata(path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let line = self.codec.binary_lrecl().is_none();
        let missing_eol = line && len > 0 && {
            let mut f = File::open(path)?;
            f.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            f.read_exact(&mut last)?;
            last[0] != b'\n'
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut w = BufWriter::new(file);
        if missing_eol {
            w.write_all(b"\n")?;
        }
        if len == 0 {
            if let Some(h) = self.codec.header_line(&self.def)? {
                w.write_all(&h)?;
                w.write_all(b"\n")?;
            }
        }
        self.writer = Some(w);
        Ok(())
    }

    fn count_records(&mut self) -> Result<u64> {
        if let Some(edit) = &self.edit {
            return Ok(edit.records.iter().flatten().count() as u64);
        }
        self.ensure_files()?;
        let mut total = 0;
        for path in self.files() {
            total += match self.codec.binary_lrecl() {
                Some(n) => match fs::metadata(path) {
                    Ok(m) => m.len() / n as u64,
                    Err(e) if e.kind() == ErrorKind::NotFound => 0,
                    Err(e) => return Err(e.into()),
                },
                None => {
                    let mut reader = match RecordReader::open(path, None) {
                        Ok(r) => r,
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(e.into()),
                    };
                    let mut buf = vec![];
                    let mut n = 0u64;
                    while reader.read(&mut buf)?.is_some() {
                        n += 1;
                    }
                    if self.codec.header() {
                        n.saturating_sub(1)
                    } else {
                        n
                    }
                }
            };
        }
        Ok(total)
    }

    /// Value of a key column of current record.
    fn key_value(&mut self, idx: usize) -> Result<Const> {
        let def = Arc::clone(&self.def);
        let col = &def.columns[idx];
        match col.special {
            None => self.read_column(idx, col),
            Some(PseudoColumn::RowId) => Ok(Const::U64(self.rowid)),
            Some(_) => Err(Error::NotIndexable(def.name.to_string())),
        }
    }
}

impl Access for FileTable {
    fn open(&mut self, args: OpenArgs<'_>) -> Result<()> {
        self.mode = args.mode;
        self.rewind();
        self.marks.clear();
        self.index = None;
        self.rows = None;
        match args.mode {
            Mode::Read | Mode::MetadataOnly => self.ensure_files(),
            Mode::Insert => self.open_writer(),
            Mode::Update | Mode::Delete => self.load(),
        }
    }

    fn read_next(&mut self, ctx: &mut QueryContext) -> Result<ReadStatus> {
        self.on_record = false;
        if self.edit.is_some() {
            return match self.next_edit() {
                Some(complete) => self.check_record(complete, ctx),
                None => Ok(ReadStatus::EndOfData),
            };
        }
        match self.next_raw(ctx)? {
            Some(complete) => self.check_record(complete, ctx),
            None => Ok(ReadStatus::EndOfData),
        }
    }

    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> Result<Const> {
        if !self.on_record {
            return Err(Error::InvalidState("no current record".to_string()));
        }
        let rowid = self.rowid;
        let corrupt = |e: xconn_datatype::error::Error| Error::RecordCorrupt(rowid, e.to_string());
        let fmt = col.opts.date_format.as_ref();
        match &self.codec {
            Codec::Csv { fields, .. } => {
                let f = fields
                    .get(idx)
                    .copied()
                    .flatten()
                    .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
                let text = self
                    .fields
                    .get(f)
                    .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
                Const::parse_as(text, col.pty, fmt).map_err(corrupt)
            }
            Codec::Fix(layout) => {
                let span = layout
                    .spans
                    .get(idx)
                    .copied()
                    .flatten()
                    .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
                let text = String::from_utf8_lossy(layout.field(&self.record, span));
                Const::parse_as(text.trim_end(), col.pty, fmt).map_err(corrupt)
            }
            Codec::Bin(layout) => {
                let field = layout
                    .fields
                    .get(idx)
                    .copied()
                    .flatten()
                    .ok_or_else(|| Error::NotFoundInRow(col.name.to_string()))?;
                layout.decode(&self.record, field, col, rowid)
            }
        }
    }

    fn row_info(&self) -> RowInfo<'_> {
        let file = if self.edit.is_some() {
            Some((0, self.fdef.path.as_path()))
        } else {
            self.files()
                .get(self.file_idx)
                .map(|p| (self.file_idx, p.as_path()))
        };
        RowInfo {
            rowid: self.rowid,
            rownum: self.rownum,
            file,
            ..Default::default()
        }
    }

    fn cardinality(&mut self) -> Result<Cardinality> {
        if let Some(n) = self.rows {
            return Ok(Cardinality::Exact(n));
        }
        let n = self.count_records()?;
        if self.mode == Mode::Read || self.mode == Mode::MetadataOnly {
            self.rows = Some(n);
        }
        Ok(Cardinality::Exact(n))
    }

    #[inline]
    fn position(&self) -> Position {
        Position(self.rowid)
    }

    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        self.on_record = false;
        if pos.0 == 0 {
            return Ok(ReadStatus::NotFound);
        }
        if let Some(edit) = self.edit.as_mut() {
            let i = pos.0 as usize - 1;
            return match edit.records.get(i) {
                Some(Some(rec)) => {
                    self.record.clear();
                    self.record.extend_from_slice(rec);
                    edit.current = Some(i);
                    edit.next = i + 1;
                    self.rowid = pos.0;
                    self.rownum = pos.0;
                    let mut ctx = QueryContext::default();
                    self.check_record(true, &mut ctx)
                }
                _ => Ok(ReadStatus::NotFound),
            };
        }
        let mut ctx = QueryContext::default();
        while (self.marks.len() as u64) < pos.0 {
            if self.next_raw(&mut ctx)?.is_none() {
                return Ok(ReadStatus::NotFound);
            }
        }
        let mark = self.marks[pos.0 as usize - 1];
        if self.reader.is_none() || self.file_idx != mark.file {
            if !self.open_file(mark.file, &mut ctx)? {
                return Ok(ReadStatus::NotFound);
            }
        }
        let res = match self.reader.as_mut() {
            Some(r) => {
                r.seek(mark.offset)?;
                r.read(&mut self.record)?
            }
            None => None,
        };
        match res {
            Some((_, complete)) => {
                self.rowid = pos.0;
                self.rownum = mark.rownum;
                self.check_record(complete, &mut ctx)
            }
            None => Ok(ReadStatus::NotFound),
        }
    }

    #[inline]
    fn writable(&self) -> bool {
        !self.fdef.is_multiple()
    }

    fn write(&mut self, row: &[Const], ctx: &mut QueryContext) -> Result<()> {
        let def = Arc::clone(&self.def);
        match self.mode {
            Mode::Insert => {
                let rec = self.codec.encode(&def, row, self.rowid + 1)?;
                let line = self.codec.binary_lrecl().is_none();
                let w = self
                    .writer
                    .as_mut()
                    .ok_or_else(|| Error::InvalidState("file not open for insert".to_string()))?;
                w.write_all(&rec)?;
                if line {
                    w.write_all(b"\n")?;
                }
                self.rowid += 1;
                self.rows = None;
                ctx.add_affected(1);
                Ok(())
            }
            Mode::Update => {
                let rec = self.codec.encode(&def, row, self.rowid)?;
                let edit = self
                    .edit
                    .as_mut()
                    .ok_or_else(|| Error::InvalidState("file not open for update".to_string()))?;
                let i = edit
                    .current
                    .ok_or_else(|| Error::InvalidState("no current record".to_string()))?;
                edit.records[i] = Some(rec);
                edit.dirty = true;
                ctx.add_affected(1);
                Ok(())
            }
            mode => Err(Error::InvalidState(format!("cannot write in {:?} mode", mode))),
        }
    }

    fn delete(&mut self, target: DeleteTarget, ctx: &mut QueryContext) -> Result<()> {
        let edit = self
            .edit
            .as_mut()
            .ok_or_else(|| Error::InvalidState("file not open for delete".to_string()))?;
        match target {
            DeleteTarget::Current => {
                let i = edit
                    .current
                    .take()
                    .ok_or_else(|| Error::InvalidState("no current record".to_string()))?;
                if edit.records[i].take().is_some() {
                    ctx.add_affected(1);
                }
            }
            DeleteTarget::All => {
                let n = edit.records.iter().flatten().count();
                edit.records.clear();
                edit.current = None;
                edit.next = 0;
                ctx.add_affected(n as u64);
            }
        }
        edit.dirty = true;
        self.on_record = false;
        Ok(())
    }

    fn init_index(&mut self, key: usize) -> Result<()> {
        let cols = self.def.key_columns(key)?;
        let types: Vec<PreciseType> = cols.iter().map(|i| self.def.columns[*i].pty).collect();
        self.rewind();
        let mut ctx = QueryContext::default();
        let mut entries = vec![];
        loop {
            match self.read_next(&mut ctx)? {
                ReadStatus::Row => {
                    let key = cols
                        .iter()
                        .map(|i| self.key_value(*i))
                        .collect::<Result<Vec<_>>>()?;
                    entries.push((key, self.rowid));
                }
                ReadStatus::NotFound => continue,
                ReadStatus::EndOfData => break,
            }
        }
        self.rewind();
        log::debug!(
            "index {} of table {} holds {} keys",
            key,
            self.def.name.as_str(),
            entries.len()
        );
        self.index = Some((KeyIndex::build(types, entries), cols));
        Ok(())
    }

    fn read_by_key(&mut self, op: KeyOp, key: &[Const]) -> Result<ReadStatus> {
        let (index, _) = self
            .index
            .as_mut()
            .ok_or_else(|| Error::InvalidState("index not initialized".to_string()))?;
        match index.lookup(op, key)? {
            Some(rowid) => self.seek(Position(rowid)),
            None => {
                self.on_record = false;
                Ok(ReadStatus::NotFound)
            }
        }
    }

    fn estimate_range(&mut self, lo: Option<&[Const]>, hi: Option<&[Const]>) -> Result<u64> {
        match &self.index {
            Some((index, _)) => index.count_range(lo, hi),
            None => Err(Error::InvalidState("index not initialized".to_string())),
        }
    }

    fn discard(&mut self) {
        if let Some(edit) = self.edit.take() {
            if edit.dirty {
                log::warn!(
                    "discard pending changes of table {}",
                    self.def.name.as_str()
                );
            }
        }
    }

    fn close(&mut self, ctx: &mut QueryContext) -> Result<()> {
        self.reader = None;
        self.on_record = false;
        let mut res = Ok(());
        if let Some(mut w) = self.writer.take() {
            res = w.flush().map_err(Error::from);
        }
        if res.is_ok() {
            res = self.rewrite();
        }
        self.edit = None;
        self.index = None;
        if ctx.affected_rows() > 0 {
            ctx.note(format!(
                "{} rows affected in table {}",
                ctx.affected_rows(),
                self.def.name.as_str()
            ));
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semistr::SemiStr;
    use xconn_catalog::RecordFormat;

    fn file_def(dir: &Path, backend: BackendType, opts: OptionBag) -> FileDef {
        let cfg = Config::default().with_data_path(dir);
        FileDef::parse(&cfg, backend, &opts).unwrap()
    }

    fn table(fdef: FileDef, backend: BackendType, columns: Vec<ColumnDef>) -> Arc<TableDef> {
        Arc::new(TableDef {
            name: SemiStr::new("t"),
            schema: SemiStr::new("s"),
            backend,
            options: OptionBag::new(),
            columns,
            indexes: vec![xconn_catalog::IndexDef::new("k", false, &["id"])],
            readonly: false,
            format: RecordFormat::Variable,
            access: AccessDef::File(fdef),
            version: 1,
        })
    }

    fn open(t: &mut FileTable, mode: Mode, ctx: &mut QueryContext) {
        t.open(OpenArgs {
            mode,
            columns: &[],
            statement: None,
            ctx,
        })
        .unwrap();
    }

    fn scan(t: &mut FileTable) -> Vec<Vec<Const>> {
        let mut ctx = QueryContext::default();
        open(t, Mode::Read, &mut ctx);
        let def = Arc::clone(&t.def);
        let mut rows = vec![];
        while t.read_next(&mut ctx).unwrap() != ReadStatus::EndOfData {
            if !t.on_record {
                continue;
            }
            rows.push(
                def.data_columns()
                    .map(|(i, c)| t.read_column(i, c).unwrap())
                    .collect(),
            );
        }
        t.close(&mut ctx).unwrap();
        rows
    }

    fn csv_columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", 0, PreciseType::i64()),
            ColumnDef::new("name", 1, PreciseType::var_utf8(20)),
        ]
    }

    #[test]
    fn test_file_def_options() {
        let dir = tempfile::tempdir().unwrap();
        let fdef = file_def(
            dir.path(),
            BackendType::Csv,
            OptionBag::new()
                .with("file_name", "emp.csv")
                .with("separator", ";")
                .with("header", "yes"),
        );
        assert_eq!(dir.path().join("emp.csv"), fdef.path);
        match &fdef.format {
            FileFormat::Csv(f) => {
                assert_eq!(';', f.sep);
                assert!(f.header);
            }
            _ => panic!("unexpected format"),
        }
        let cfg = Config::default();
        assert!(FileDef::parse(&cfg, BackendType::Csv, &OptionBag::new()).is_err());
        let bad = OptionBag::new().with("file_name", "x").with("multiple", "7");
        assert!(FileDef::parse(&cfg, BackendType::Csv, &bad).is_err());
    }

    #[test]
    fn test_csv_insert_update_delete() {
        let dir = tempfile::tempdir().unwrap();
        let fdef = file_def(
            dir.path(),
            BackendType::Csv,
            OptionBag::new().with("file_name", "emp.csv").with("header", "1"),
        );
        let def = table(fdef, BackendType::Csv, csv_columns());
        let mut t = FileTable::new(Arc::clone(&def)).unwrap();
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Insert, &mut ctx);
        for (id, name) in [(1, "ann"), (2, "bob, jr"), (3, "cy")] {
            t.write(&[Const::I64(id), Const::new_str(name)], &mut ctx).unwrap();
        }
        t.close(&mut ctx).unwrap();
        assert_eq!(3, ctx.affected_rows());
        let text = fs::read_to_string(dir.path().join("emp.csv")).unwrap();
        assert_eq!("id,name\n1,ann\n2,\"bob, jr\"\n3,cy\n", text);
        assert_eq!(Cardinality::Exact(3), t.cardinality().unwrap());

        // update second row
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Update, &mut ctx);
        assert_eq!(ReadStatus::Row, t.read_next(&mut ctx).unwrap());
        assert_eq!(ReadStatus::Row, t.read_next(&mut ctx).unwrap());
        t.write(&[Const::I64(2), Const::new_str("bo")], &mut ctx).unwrap();
        t.close(&mut ctx).unwrap();

        // delete first row
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Delete, &mut ctx);
        assert_eq!(ReadStatus::Row, t.read_next(&mut ctx).unwrap());
        t.delete(DeleteTarget::Current, &mut ctx).unwrap();
        t.close(&mut ctx).unwrap();
        let text = fs::read_to_string(dir.path().join("emp.csv")).unwrap();
        assert_eq!("id,name\n2,bo\n3,cy\n", text);

        let rows = scan(&mut t);
        assert_eq!(vec![Const::I64(3), Const::new_str("cy")], rows[1]);

        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Delete, &mut ctx);
        t.delete(DeleteTarget::All, &mut ctx).unwrap();
        t.close(&mut ctx).unwrap();
        let text = fs::read_to_string(dir.path().join("emp.csv")).unwrap();
        assert_eq!("id,name\n", text);
    }

    #[test]
    fn test_discard_pending_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("emp.csv");
        fs::write(&path, "1,ann\n2,bob\n").unwrap();
        let fdef = file_def(
            dir.path(),
            BackendType::Csv,
            OptionBag::new().with("file_name", "emp.csv"),
        );
        let def = table(fdef, BackendType::Csv, csv_columns());
        let mut t = FileTable::new(def).unwrap();
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Update, &mut ctx);
        assert_eq!(ReadStatus::Row, t.read_next(&mut ctx).unwrap());
        t.write(&[Const::I64(1), Const::new_str("amy")], &mut ctx).unwrap();
        t.discard();
        t.close(&mut ctx).unwrap();
        assert_eq!("1,ann\n2,bob\n", fs::read_to_string(&path).unwrap());

        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Delete, &mut ctx);
        t.delete(DeleteTarget::All, &mut ctx).unwrap();
        t.discard();
        t.close(&mut ctx).unwrap();
        assert_eq!("1,ann\n2,bob\n", fs::read_to_string(&path).unwrap());
        // no temporary file is left behind
        assert_eq!(1, fs::read_dir(dir.path()).unwrap().count());
    }

    #[test]
    fn test_csv_bad_records() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "1,a\n2\n3,c\n\"4,d\n5,e\n").unwrap();
        let opts = OptionBag::new().with("file_name", "b.csv").with("maxerr", "2");
        let def = table(file_def(dir.path(), BackendType::Csv, opts), BackendType::Csv, csv_columns());
        let mut t = FileTable::new(def).unwrap();
        let rows = scan(&mut t);
        assert_eq!(3, rows.len());
        assert_eq!(Const::I64(5), rows[2][0]);

        let opts = OptionBag::new().with("file_name", "b.csv");
        let def = table(file_def(dir.path(), BackendType::Csv, opts), BackendType::Csv, csv_columns());
        let mut t = FileTable::new(def).unwrap();
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Read, &mut ctx);
        assert_eq!(ReadStatus::Row, t.read_next(&mut ctx).unwrap());
        assert!(matches!(t.read_next(&mut ctx), Err(Error::RecordCorrupt(2, _))));
    }

    #[test]
    fn test_fix_and_seek() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("f.txt"), "   1ann  \n   2bob  \n\n   3cy   \n").unwrap();
        let mut id = ColumnDef::new("id", 0, PreciseType::i32());
        id.opts.field_length = Some(4);
        let mut name = ColumnDef::new("name", 1, PreciseType::var_utf8(5));
        name.opts.field_length = Some(5);
        let opts = OptionBag::new().with("file_name", "f.txt");
        let def = table(file_def(dir.path(), BackendType::Fix, opts), BackendType::Fix, vec![id, name]);
        let mut t = FileTable::new(Arc::clone(&def)).unwrap();
        let rows = scan(&mut t);
        assert_eq!(3, rows.len());
        assert_eq!(vec![Const::I64(3), Const::new_str("cy")], rows[2]);

        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Read, &mut ctx);
        assert_eq!(ReadStatus::Row, t.seek(Position(2)).unwrap());
        assert_eq!(Const::new_str("bob"), t.read_column(1, &def.columns[1]).unwrap());
        assert_eq!(ReadStatus::Row, t.read_next(&mut ctx).unwrap());
        assert_eq!(Position(3), t.position());
        assert_eq!(ReadStatus::Row, t.seek(Position(1)).unwrap());
        assert_eq!(Const::I64(1), t.read_column(0, &def.columns[0]).unwrap());
        assert_eq!(ReadStatus::NotFound, t.seek(Position(9)).unwrap());
        assert_eq!(Cardinality::Exact(3), t.cardinality().unwrap());
    }

    #[test]
    fn test_bin_roundtrip_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let mut name = ColumnDef::new("name", 1, PreciseType::var_utf8(4));
        name.opts.field_length = Some(4);
        let cols = vec![ColumnDef::new("id", 0, PreciseType::i32()), name];
        let opts = OptionBag::new().with("file_name", "d.bin").with("endian", "big");
        let def = table(file_def(dir.path(), BackendType::Bin, opts), BackendType::Bin, cols);
        let mut t = FileTable::new(Arc::clone(&def)).unwrap();
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Insert, &mut ctx);
        for (id, name) in [(30, "c"), (10, "a"), (20, "b")] {
            t.write(&[Const::I64(id), Const::new_str(name)], &mut ctx).unwrap();
        }
        t.close(&mut ctx).unwrap();
        assert_eq!(24, fs::metadata(dir.path().join("d.bin")).unwrap().len());
        assert_eq!(Cardinality::Exact(3), t.cardinality().unwrap());

        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Read, &mut ctx);
        t.init_index(0).unwrap();
        assert_eq!(ReadStatus::Row, t.read_by_key(KeyOp::EQ, &[Const::I64(20)]).unwrap());
        assert_eq!(Const::new_str("b"), t.read_column(1, &def.columns[1]).unwrap());
        assert_eq!(Position(3), t.position());
        assert_eq!(ReadStatus::Row, t.read_by_key(KeyOp::NEXT, &[]).unwrap());
        assert_eq!(Const::I64(30), t.read_column(0, &def.columns[0]).unwrap());
        assert_eq!(ReadStatus::NotFound, t.read_by_key(KeyOp::EQ, &[Const::I64(15)]).unwrap());
        assert_eq!(2, t.estimate_range(Some(&[Const::I64(10)]), Some(&[Const::I64(20)])).unwrap());
        t.close(&mut ctx).unwrap();
    }

    #[test]
    fn test_multiple_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("p1.csv"), "1,a\n2,b\n").unwrap();
        fs::write(dir.path().join("p2.csv"), "3,c\n").unwrap();
        let opts = OptionBag::new().with("file_name", "p*.csv").with("multiple", "1");
        let fdef = file_def(dir.path(), BackendType::Csv, opts);
        assert!(fdef.is_multiple());
        let def = table(fdef, BackendType::Csv, csv_columns());
        let mut t = FileTable::new(def).unwrap();
        assert!(!t.writable());
        let mut ctx = QueryContext::default();
        open(&mut t, Mode::Read, &mut ctx);
        let mut seen = vec![];
        while t.read_next(&mut ctx).unwrap() == ReadStatus::Row {
            let info = t.row_info();
            seen.push((info.rowid, info.rownum, info.file.map(|f| f.0)));
        }
        assert_eq!(vec![(1, 1, Some(0)), (2, 2, Some(0)), (3, 1, Some(1))], seen);
        assert_eq!(Cardinality::Exact(3), t.cardinality().unwrap());
    }

    #[test]
    fn test_csv_discovery() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("h.csv"), "id,score,name\n1,2.5,ann\n2,3,bob\n").unwrap();
        let opts = OptionBag::new().with("file_name", "h.csv").with("header", "1");
        let fdef = file_def(dir.path(), BackendType::Csv, opts);
        let cols = fdef.discover("h", &Config::default()).unwrap();
        let names: Vec<_> = cols.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(vec!["id", "score", "name"], names);
        assert_eq!(PreciseType::f64(), cols[1].pty);
        let fix = file_def(dir.path(), BackendType::Fix, OptionBag::new().with("file_name", "h.csv"));
        assert!(matches!(
            fix.discover("h", &Config::default()),
            Err(Error::SchemaDiscoveryFailed(..))
        ));
    }
}
