use std::fs;
use std::path::Path;
use std::sync::Arc;
use xconn_catalog::mem_impl::MemCatalog;
use xconn_catalog::{Catalog, ColumnAttr, ColumnDef, ColumnSpec, OptionBag, TableSpec};
use xconn_datatype::{Const, PreciseType};
use xconn_expr::{Expr, PredFuncKind};
use xconn_table::file::FileTable;
use xconn_table::oem::OemModule;
use xconn_table::{
    Access, Cardinality, CatalogSession, Config, DeleteTarget, Error, GlobalState, Mode,
    OpenArgs, Position, QueryContext, ReadStatus, RowInfo, Stage, TableDef, Usage,
};

fn session(data_path: &Path) -> (Arc<MemCatalog>, CatalogSession) {
    let catalog = Arc::new(MemCatalog::default());
    catalog.create_schema("s").unwrap();
    let global = GlobalState::new(Config::default().with_data_path(data_path));
    let sess = CatalogSession::new(global, Arc::clone(&catalog) as Arc<dyn Catalog>, 1);
    (catalog, sess)
}

fn csv_spec(name: &str, opts: OptionBag) -> TableSpec {
    TableSpec::new(
        "s",
        name,
        vec![
            ColumnSpec::new("id", PreciseType::i64(), ColumnAttr::NOT_NULL),
            ColumnSpec::new("name", PreciseType::var_utf8(20), ColumnAttr::empty()),
        ],
    )
    .with_options(opts)
}

fn rowid_lt(kind: PredFuncKind, n: i64) -> Expr {
    Expr::cmp(kind, Expr::col("ROWID"), Expr::const_i64(n))
}

#[test]
fn test_resolve_tags() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.csv"), "1,x\n").unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(csv_spec(
            "t",
            OptionBag::new().with("type", "csv").with("file_name", "a.csv"),
        ))
        .unwrap();
    let d1 = sess.resolve("t", "s", "csv").unwrap();
    let d2 = sess.resolve("T", "s", "CsV").unwrap();
    assert!(Arc::ptr_eq(&d1, &d2));
    assert_eq!(1, sess.cached());
    let d3 = sess.resolve_table("t", "s").unwrap();
    assert!(Arc::ptr_eq(&d1, &d3));
    match sess.resolve("t", "s", "parquet") {
        Err(Error::UnknownBackendType(tag)) => assert_eq!("parquet", tag),
        other => panic!("unexpected {:?}", other.map(|d| d.backend)),
    }
    // new metadata version rebuilds definition
    catalog
        .alter_table_options(
            "s",
            "t",
            OptionBag::new()
                .with("type", "csv")
                .with("file_name", "a.csv")
                .with("readonly", "yes"),
        )
        .unwrap();
    let d4 = sess.resolve("t", "s", "csv").unwrap();
    assert!(!Arc::ptr_eq(&d1, &d4));
    assert!(d4.readonly);
    sess.invalidate("S", "T");
    assert_eq!(0, sess.cached());
}

#[test]
fn test_lazy_eval() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.csv"), "1,ann\n2,bob\n").unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(csv_spec("t", OptionBag::new().with("file_name", "a.csv")))
        .unwrap();
    let def = sess.resolve("t", "s", "CSV").unwrap();
    let mut cursor = sess.create_cursor(&def, Mode::Read).unwrap();
    let name = cursor.bind_column("name", Usage::PROJECT).unwrap();
    let rowid = cursor.bind_column("rowid", Usage::PROJECT).unwrap();
    assert_eq!(name, cursor.bind_column("NAME", Usage::FILTER).unwrap());
    assert!(cursor.bind_column("missing", Usage::PROJECT).is_err());
    // pseudo-columns come first
    assert_eq!(vec![rowid, name], cursor.columns().collect::<Vec<_>>());
    cursor.open(Mode::Read).unwrap();
    assert_eq!(ReadStatus::Row, cursor.read_next().unwrap());
    assert!(!cursor.is_materialized(name));
    assert_eq!(&Const::new_str("ann"), cursor.eval(name).unwrap());
    assert_eq!(&Const::new_str("ann"), cursor.eval(name).unwrap());
    assert_eq!(1, cursor.fetch_count(name));
    assert_eq!(&Const::U64(1), cursor.eval(rowid).unwrap());
    assert_eq!(ReadStatus::Row, cursor.read_next().unwrap());
    assert!(!cursor.is_materialized(name));
    assert_eq!(&Const::new_str("bob"), cursor.eval(name).unwrap());
    assert_eq!(2, cursor.fetch_count(name));
    let pos = cursor.position().unwrap();
    assert_eq!(ReadStatus::EndOfData, cursor.read_next().unwrap());
    assert!(cursor.eval(name).is_err());
    assert_eq!(ReadStatus::Row, cursor.seek(pos).unwrap());
    assert_eq!(&Const::new_str("bob"), cursor.eval(name).unwrap());
    assert_eq!(Cardinality::Exact(2), cursor.cardinality().unwrap());
    cursor.close().unwrap();
    assert_eq!(Stage::Closed, cursor.stage());
    cursor.close().unwrap();
    assert!(cursor.read_next().is_err());
}

#[test]
fn test_file_set_pseudo_columns() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("p1.csv"), "1,a\n2,b\n").unwrap();
    fs::write(dir.path().join("p2.csv"), "3,c\n").unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(csv_spec(
            "parts",
            OptionBag::new()
                .with("file_name", "p*.csv")
                .with("multiple", "1"),
        ))
        .unwrap();
    let def = sess.resolve("parts", "s", "csv").unwrap();
    assert!(def.readonly);
    let mut cursor = sess.create_cursor(&def, Mode::Read).unwrap();
    let fileid = cursor.bind_column("FILEID", Usage::PROJECT).unwrap();
    let fname = cursor.bind_column("FNAME", Usage::PROJECT).unwrap();
    let rownum = cursor.bind_column("ROWNUM", Usage::PROJECT).unwrap();
    let rowid = cursor.bind_column("ROWID", Usage::PROJECT).unwrap();
    cursor.open(Mode::Read).unwrap();
    let mut seen = vec![];
    while cursor.read_next().unwrap() == ReadStatus::Row {
        seen.push((
            cursor.eval(fileid).unwrap().clone(),
            cursor.eval(fname).unwrap().clone(),
            cursor.eval(rownum).unwrap().clone(),
            cursor.eval(rowid).unwrap().clone(),
        ));
    }
    assert_eq!(3, seen.len());
    let p1 = Const::new_str(&dir.path().join("p1.csv").to_string_lossy());
    let p2 = Const::new_str(&dir.path().join("p2.csv").to_string_lossy());
    assert_eq!(p1, seen[0].0);
    assert_eq!(p1, seen[1].0);
    assert_eq!(p2, seen[2].0);
    assert_eq!(Const::new_str("p2"), seen[2].1);
    assert_eq!(
        vec![Const::U64(1), Const::U64(2), Const::U64(1)],
        seen.iter().map(|r| r.2.clone()).collect::<Vec<_>>()
    );
    assert_eq!(Const::U64(3), seen[2].3);
    // file parts are recomputed only on file change
    assert_eq!(2, cursor.fetch_count(fileid));
    cursor.close().unwrap();
}

#[test]
fn test_read_only_open() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(
            TableSpec::new("s", "v", vec![]).with_options(OptionBag::new().with("size", "3")),
        )
        .unwrap();
    let def = sess.resolve("v", "s", "vir").unwrap();
    assert!(def.readonly);
    let mut cursor = sess.create_cursor(&def, Mode::Insert).unwrap();
    match cursor.open(Mode::Insert) {
        Err(Error::ReadOnlyViolation(name)) => assert_eq!("v", name),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(Stage::Unopened, cursor.stage());
    assert!(cursor.context().message().is_some());
    cursor.open(Mode::Read).unwrap();
    assert!(cursor.delete(DeleteTarget::All).is_err());
    let mut n = 0;
    while cursor.read_next().unwrap() == ReadStatus::Row {
        n += 1;
    }
    assert_eq!(3, n);
    assert!(cursor.init_index(0).is_err());
}

#[test]
fn test_virtual_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(
            TableSpec::new("s", "seq", vec![])
                .with_options(OptionBag::new().with("size", "100")),
        )
        .unwrap();
    let def = sess.resolve("seq", "s", "VIR").unwrap();

    let mut cursor = sess.create_cursor(&def, Mode::Read).unwrap();
    let rowid = cursor.bind_column("ROWID", Usage::PROJECT).unwrap();
    let residual = cursor
        .push_filter(rowid_lt(PredFuncKind::Less, 5))
        .unwrap();
    assert!(residual.is_none());
    cursor.open(Mode::Read).unwrap();
    let mut ids = vec![];
    while cursor.read_next().unwrap() == ReadStatus::Row {
        ids.push(cursor.eval(rowid).unwrap().clone());
    }
    assert_eq!(
        (1..=4u64).map(Const::U64).collect::<Vec<_>>(),
        ids
    );
    assert_eq!(Cardinality::Exact(4), cursor.cardinality().unwrap());
    cursor.close().unwrap();

    // lower bound stays with the host
    let mut cursor = sess.create_cursor(&def, Mode::Read).unwrap();
    let filter = Expr::pred_conj(vec![
        Expr::cmp(PredFuncKind::Greater, Expr::col("ROWID"), Expr::const_i64(2)),
        rowid_lt(PredFuncKind::LessEqual, 6),
    ]);
    assert!(cursor.push_filter(filter).unwrap().is_some());
    cursor.open(Mode::Read).unwrap();
    assert_eq!(Cardinality::Exact(6), cursor.cardinality().unwrap());
    assert!(cursor.push_filter(rowid_lt(PredFuncKind::Less, 2)).is_err());
    assert_eq!(ReadStatus::Row, cursor.seek(Position(6)).unwrap());
    assert_eq!(ReadStatus::NotFound, cursor.seek(Position(7)).unwrap());
    cursor.close().unwrap();
}

#[test]
fn test_dir_listing() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("b.txt"), b"hello").unwrap();
    fs::write(dir.path().join("a.txt"), b"").unwrap();
    fs::write(dir.path().join("c.log"), b"").unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(
            TableSpec::new("s", "files", vec![])
                .with_options(OptionBag::new().with("file_name", "*.txt")),
        )
        .unwrap();
    let def = sess.resolve("files", "s", "dir").unwrap();
    let mut cursor = sess.create_cursor(&def, Mode::Read).unwrap();
    let name = cursor.bind_column("name", Usage::PROJECT).unwrap();
    let size = cursor.bind_column("size", Usage::PROJECT).unwrap();
    let ext = cursor.bind_column("ext", Usage::PROJECT).unwrap();
    cursor.open(Mode::Read).unwrap();
    let mut rows = vec![];
    while cursor.read_next().unwrap() == ReadStatus::Row {
        rows.push((
            cursor.eval(name).unwrap().clone(),
            cursor.eval(size).unwrap().clone(),
            cursor.eval(ext).unwrap().clone(),
        ));
    }
    assert_eq!(
        vec![
            (Const::new_str("a"), Const::U64(0), Const::new_str("txt")),
            (Const::new_str("b"), Const::U64(5), Const::new_str("txt")),
        ],
        rows
    );
    assert_eq!(Cardinality::Exact(2), cursor.cardinality().unwrap());
    cursor.close().unwrap();
}

struct Counter {
    limit: i64,
    current: i64,
}

impl Access for Counter {
    fn open(&mut self, _args: OpenArgs<'_>) -> xconn_table::Result<()> {
        self.current = 0;
        Ok(())
    }

    fn read_next(&mut self, _ctx: &mut QueryContext) -> xconn_table::Result<ReadStatus> {
        if self.current >= self.limit {
            return Ok(ReadStatus::EndOfData);
        }
        self.current += 1;
        Ok(ReadStatus::Row)
    }

    fn read_column(&mut self, _idx: usize, _col: &ColumnDef) -> xconn_table::Result<Const> {
        Ok(Const::I64(self.current * 10))
    }

    fn row_info(&self) -> RowInfo<'_> {
        RowInfo {
            rowid: self.current as u64,
            rownum: self.current as u64,
            ..Default::default()
        }
    }

    fn position(&self) -> Position {
        Position(self.current as u64)
    }

    fn close(&mut self, _ctx: &mut QueryContext) -> xconn_table::Result<()> {
        Ok(())
    }
}

struct CounterModule;

impl OemModule for CounterModule {
    fn name(&self) -> &str {
        "counter"
    }

    fn discover(&self, _subtype: &str, _options: &OptionBag) -> xconn_table::Result<Vec<ColumnDef>> {
        Ok(vec![ColumnDef::new("n", 0, PreciseType::i64())])
    }

    fn create(
        &self,
        subtype: &str,
        _def: &Arc<TableDef>,
    ) -> xconn_table::Result<Box<dyn Access + Send>> {
        let limit = subtype.parse().unwrap_or(2);
        Ok(Box::new(Counter { limit, current: 0 }))
    }
}

#[test]
fn test_oem_module() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(TableSpec::new("s", "c", vec![]).with_options(
            OptionBag::new().with("module", "Counter").with("subtype", "3"),
        ))
        .unwrap();
    catalog
        .create_table(
            TableSpec::new("s", "lost", vec![])
                .with_options(OptionBag::new().with("module", "missing")),
        )
        .unwrap();
    sess.global()
        .register_module("counter", Arc::new(CounterModule));
    let def = sess.resolve("c", "s", "oem").unwrap();
    assert_eq!(1, def.columns.len());
    let mut cursor = sess.create_cursor(&def, Mode::Read).unwrap();
    let n = cursor.bind_column("n", Usage::PROJECT).unwrap();
    let rowid = cursor.bind_column("rowid", Usage::PROJECT).unwrap();
    cursor.open(Mode::Read).unwrap();
    let mut vals = vec![];
    while cursor.read_next().unwrap() == ReadStatus::Row {
        vals.push((cursor.eval(n).unwrap().clone(), cursor.eval(rowid).unwrap().clone()));
    }
    assert_eq!(
        vec![
            (Const::I64(10), Const::U64(1)),
            (Const::I64(20), Const::U64(2)),
            (Const::I64(30), Const::U64(3)),
        ],
        vals
    );
    assert_eq!(Cardinality::Unknown, cursor.cardinality().unwrap());
    assert!(cursor.seek(Position(1)).is_err());
    cursor.close().unwrap();
    assert!(matches!(
        sess.resolve("lost", "s", "oem"),
        Err(Error::ModuleNotFound(_))
    ));
}

#[test]
fn test_cursors_share_table_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(TableSpec::new("s", "v", vec![]).with_options(
            OptionBag::new().with("size", "2").with("partname", "p0"),
        ))
        .unwrap();
    let def = sess.resolve("v", "s", "vir").unwrap();
    let mut c1 = sess.create_cursor(&def, Mode::Read).unwrap();
    let mut c2 = sess.create_cursor(&def, Mode::Read).unwrap();
    assert!(Arc::ptr_eq(c1.share().unwrap(), c2.share().unwrap()));
    assert_eq!(2, sess.global().share_count("S", "V"));
    let partid = c1.bind_column("partid", Usage::PROJECT).unwrap();
    c1.open(Mode::Read).unwrap();
    assert_eq!(ReadStatus::Row, c1.read_next().unwrap());
    assert_eq!(&Const::new_str("p0"), c1.eval(partid).unwrap());
    c1.close().unwrap();
    assert!(c1.share().is_none());
    assert_eq!(1, sess.global().share_count("s", "v"));
    c2.close().unwrap();
    assert_eq!(0, sess.global().share_count("s", "v"));
}

#[test]
fn test_same_name_in_two_schemas() {
    let dir = tempfile::tempdir().unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog.create_schema("s2").unwrap();
    let pseudo = |name: &str| ColumnSpec::new(name, PreciseType::u64(), ColumnAttr::empty());
    catalog
        .create_table(TableSpec::new("s", "t", vec![pseudo("ROWID")]))
        .unwrap();
    catalog
        .create_table(TableSpec::new("s2", "t", vec![pseudo("ROWID"), pseudo("ROWNUM")]))
        .unwrap();
    let d1 = sess.resolve("t", "s", "vir").unwrap();
    let d2 = sess.resolve("t", "s2", "vir").unwrap();
    assert_eq!(1, d1.columns.len());
    assert_eq!(2, d2.columns.len());
    assert_eq!(2, sess.cached());
    assert!(Arc::ptr_eq(&d1, &sess.resolve("T", "s", "vir").unwrap()));
    assert!(Arc::ptr_eq(&d2, &sess.resolve("t", "s2", "VIR").unwrap()));
    sess.invalidate("s2", "t");
    assert_eq!(1, sess.cached());
    assert!(Arc::ptr_eq(&d1, &sess.resolve("t", "s", "vir").unwrap()));
}

/// File table whose writes fail after a number of successful ones.
struct FailingWrites {
    inner: FileTable,
    ok_writes: usize,
}

impl Access for FailingWrites {
    fn open(&mut self, args: OpenArgs<'_>) -> xconn_table::Result<()> {
        self.inner.open(args)
    }

    fn read_next(&mut self, ctx: &mut QueryContext) -> xconn_table::Result<ReadStatus> {
        self.inner.read_next(ctx)
    }

    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> xconn_table::Result<Const> {
        self.inner.read_column(idx, col)
    }

    fn row_info(&self) -> RowInfo<'_> {
        self.inner.row_info()
    }

    fn position(&self) -> Position {
        self.inner.position()
    }

    fn writable(&self) -> bool {
        self.inner.writable()
    }

    fn write(&mut self, row: &[Const], ctx: &mut QueryContext) -> xconn_table::Result<()> {
        if self.ok_writes == 0 {
            return Err(Error::IOError("disk full".to_string()));
        }
        self.ok_writes -= 1;
        self.inner.write(row, ctx)
    }

    fn discard(&mut self) {
        self.inner.discard()
    }

    fn close(&mut self, ctx: &mut QueryContext) -> xconn_table::Result<()> {
        self.inner.close(ctx)
    }
}

struct FailingModule {
    file: Arc<TableDef>,
}

impl OemModule for FailingModule {
    fn name(&self) -> &str {
        "failing"
    }

    fn create(
        &self,
        _subtype: &str,
        _def: &Arc<TableDef>,
    ) -> xconn_table::Result<Box<dyn Access + Send>> {
        Ok(Box::new(FailingWrites {
            inner: FileTable::new(Arc::clone(&self.file))?,
            ok_writes: 1,
        }))
    }
}

#[test]
fn test_failed_update_keeps_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("emp.csv");
    fs::write(&path, "1,ann\n2,bob\n3,cy\n").unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(csv_spec("emp", OptionBag::new().with("file_name", "emp.csv")))
        .unwrap();
    catalog
        .create_table(csv_spec("emp_failing", OptionBag::new().with("module", "failing")))
        .unwrap();
    let file = sess.resolve("emp", "s", "csv").unwrap();
    sess.global()
        .register_module("failing", Arc::new(FailingModule { file }));
    let def = sess.resolve("emp_failing", "s", "oem").unwrap();
    let mut cursor = sess.create_cursor(&def, Mode::Update).unwrap();
    cursor.open(Mode::Update).unwrap();
    assert_eq!(ReadStatus::Row, cursor.read_next().unwrap());
    cursor
        .write(&[Const::I64(1), Const::new_str("amy")])
        .unwrap();
    assert_eq!(ReadStatus::Row, cursor.read_next().unwrap());
    assert!(matches!(
        cursor.write(&[Const::I64(2), Const::new_str("bo")]),
        Err(Error::IOError(_))
    ));
    assert_eq!(Stage::Invalid, cursor.stage());
    cursor.close().unwrap();
    assert_eq!("1,ann\n2,bob\n3,cy\n", fs::read_to_string(&path).unwrap());
    assert_eq!(1, fs::read_dir(dir.path()).unwrap().count());

    // same changes are written when the cursor stays valid
    let file = sess.resolve("emp", "s", "csv").unwrap();
    let mut cursor = sess.create_cursor(&file, Mode::Update).unwrap();
    cursor.open(Mode::Update).unwrap();
    assert_eq!(ReadStatus::Row, cursor.read_next().unwrap());
    cursor
        .write(&[Const::I64(1), Const::new_str("amy")])
        .unwrap();
    cursor.close().unwrap();
    assert_eq!("1,amy\n2,bob\n3,cy\n", fs::read_to_string(&path).unwrap());
}

#[test]
fn test_fixed_layout_needs_columns() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("f.txt"), "   1ann  \n").unwrap();
    let (catalog, mut sess) = session(dir.path());
    catalog
        .create_table(
            TableSpec::new("s", "f", vec![])
                .with_options(OptionBag::new().with("file_name", "f.txt")),
        )
        .unwrap();
    for tag in ["fix", "bin"] {
        match sess.resolve("f", "s", tag) {
            Err(Error::SchemaDiscoveryFailed(name, msg)) => {
                assert_eq!("f", name);
                assert!(msg.contains(&tag.to_ascii_uppercase()));
            }
            other => panic!("unexpected {:?}", other.map(|d| d.backend)),
        }
    }
    assert_eq!(0, sess.cached());
}
