use super::{ColumnMeta, ConnectOptions, DriverCaps, DriverFactory, RemoteConnection, TableMeta};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use xconn_datatype::Const;

/// MemRemote is an in-memory remote server shared by all connections
/// of a [`MemDriver`].
///
/// It understands the subset of SQL generated by remote tables:
/// projections, `COUNT(*)` and derived tables in FROM. WHERE and
/// ORDER BY clauses are recorded but not evaluated. Every statement
/// received is kept in a command log.
#[derive(Clone)]
pub struct MemRemote {
    inner: Arc<Mutex<RemoteState>>,
}

struct RemoteState {
    name: String,
    caps: DriverCaps,
    tables: BTreeMap<String, MemTable>,
    commands: Vec<String>,
    fail_connect: bool,
    fail_query: Option<String>,
    connects: usize,
    closes: usize,
}

struct MemTable {
    name: String,
    columns: Vec<ColumnMeta>,
    rows: Vec<Vec<Const>>,
}

impl MemRemote {
    #[inline]
    pub fn new(name: &str) -> Self {
        MemRemote {
            inner: Arc::new(Mutex::new(RemoteState {
                name: name.to_string(),
                caps: DriverCaps::PREPARE,
                tables: BTreeMap::new(),
                commands: vec![],
                fail_connect: false,
                fail_query: None,
                connects: 0,
                closes: 0,
            })),
        }
    }

    #[inline]
    pub fn set_caps(&self, caps: DriverCaps) {
        self.inner.lock().caps = caps;
    }

    pub fn create_table(&self, name: &str, columns: Vec<ColumnMeta>) {
        let table = MemTable {
            name: name.to_string(),
            columns,
            rows: vec![],
        };
        self.inner.lock().tables.insert(name.to_lowercase(), table);
    }

    pub fn insert_rows(&self, name: &str, rows: Vec<Vec<Const>>) {
        if let Some(t) = self.inner.lock().tables.get_mut(&name.to_lowercase()) {
            t.rows.extend(rows);
        }
    }

    #[inline]
    pub fn rows(&self, name: &str) -> Vec<Vec<Const>> {
        self.inner
            .lock()
            .tables
            .get(&name.to_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Returns all statements received so far.
    #[inline]
    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().commands.clone()
    }

    #[inline]
    pub fn clear_commands(&self) {
        self.inner.lock().commands.clear()
    }

    #[inline]
    pub fn fail_connect(&self, fail: bool) {
        self.inner.lock().fail_connect = fail;
    }

    /// Makes every statement containing the pattern fail.
    #[inline]
    pub fn fail_query(&self, pattern: Option<&str>) {
        self.inner.lock().fail_query = pattern.map(|p| p.to_lowercase());
    }

    /// Returns numbers of opened and closed connections.
    #[inline]
    pub fn connections(&self) -> (usize, usize) {
        let g = self.inner.lock();
        (g.connects, g.closes)
    }
}

impl RemoteState {
    fn record(&mut self, sql: &str) -> Result<()> {
        self.commands.push(sql.to_string());
        match &self.fail_query {
            Some(p) if sql.to_lowercase().contains(p.as_str()) => {
                Err(Error::BackendQueryFailed(format!("injected failure of {}", sql)))
            }
            _ => Ok(()),
        }
    }

    fn table(&self, name: &str) -> Result<&MemTable> {
        self.tables
            .get(&name.to_lowercase())
            .ok_or_else(|| Error::BackendQueryFailed(format!("Table '{}' doesn't exist", name)))
    }

    fn query(&self, sql: &str) -> Result<(Vec<ColumnMeta>, Vec<Vec<Const>>)> {
        let (list, source) = split_select(sql)
            .ok_or_else(|| Error::BackendQueryFailed(format!("cannot parse {}", sql)))?;
        let (columns, rows) = match source {
            Source::Table(name) => {
                let t = self.table(&name)?;
                (t.columns.clone(), t.rows.clone())
            }
            Source::Derived(inner) => self.query(&inner)?,
        };
        if list.eq_ignore_ascii_case("count(*)") {
            let meta = ColumnMeta::new("COUNT(*)", xconn_datatype::PreciseType::i64());
            return Ok((vec![meta], vec![vec![Const::I64(rows.len() as i64)]]));
        }
        if list == "*" {
            return Ok((columns, rows));
        }
        let picks = split_top(&list, ',')
            .iter()
            .map(|item| {
                let name = unquote(item);
                columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
                    .ok_or_else(|| Error::BackendQueryFailed(format!("Unknown column '{}'", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        let metas = picks.iter().map(|i| columns[*i].clone()).collect();
        let rows = rows
            .into_iter()
            .map(|r| picks.iter().map(|i| r.get(*i).cloned().unwrap_or(Const::Null)).collect())
            .collect();
        Ok((metas, rows))
    }
}

enum Source {
    Table(String),
    Derived(String),
}

/// Splits `SELECT list FROM source ...` into list and source.
fn split_select(sql: &str) -> Option<(String, Source)> {
    let sql = sql.trim();
    match sql.get(..6) {
        Some(kw) if kw.eq_ignore_ascii_case("select") => (),
        _ => return None,
    }
    let body = &sql[6..];
    let at = find_top(body, " from ")?;
    let list = body[..at].trim().to_string();
    let rest = body[at + 6..].trim_start();
    if let Some(inner) = rest.strip_prefix('(') {
        let end = find_top(inner, ")")?;
        return Some((list, Source::Derived(inner[..end].to_string())));
    }
    let name = rest.split_whitespace().next()?;
    let name = name.rsplit('.').next().unwrap_or(name);
    Some((list, Source::Table(unquote(name).to_string())))
}

/// Finds the pattern outside parentheses and quotes, ignoring case.
fn find_top(s: &str, pat: &str) -> Option<usize> {
    let lower = s.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let pat = pat.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    for i in 0..bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => continue,
            None => match b {
                b'\'' | b'`' | b'"' => quote = Some(b),
                b'(' => depth += 1,
                b')' if depth > 0 => depth -= 1,
                _ if depth == 0 && bytes[i..].starts_with(pat) => return Some(i),
                _ => (),
            },
        }
    }
    None
}

fn split_top(s: &str, sep: char) -> Vec<&str> {
    let mut parts = vec![];
    let mut rest = s;
    while let Some(at) = find_top(rest, &sep.to_string()) {
        parts.push(rest[..at].trim());
        rest = &rest[at + 1..];
    }
    parts.push(rest.trim());
    parts
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    s.trim_matches(|c| c == '`' || c == '"')
}

/// MemDriver opens connections to a [`MemRemote`].
pub struct MemDriver {
    remote: MemRemote,
}

impl MemDriver {
    #[inline]
    pub fn new(remote: MemRemote) -> Self {
        MemDriver { remote }
    }
}

impl DriverFactory for MemDriver {
    fn connect(&self, opts: &ConnectOptions) -> Result<Box<dyn RemoteConnection>> {
        let mut g = self.remote.inner.lock();
        if g.fail_connect {
            return Err(Error::BackendConnectFailed(format!(
                "cannot reach server at '{}'",
                opts.url
            )));
        }
        g.connects += 1;
        Ok(Box::new(MemConnection {
            remote: self.remote.clone(),
            server: g.name.clone(),
            result: None,
            prepared: vec![],
        }))
    }
}

struct MemConnection {
    remote: MemRemote,
    server: String,
    result: Option<(Vec<Vec<Const>>, usize)>,
    prepared: Vec<String>,
}

impl RemoteConnection for MemConnection {
    #[inline]
    fn capabilities(&self) -> DriverCaps {
        self.remote.inner.lock().caps
    }

    #[inline]
    fn quote_char(&self) -> Option<char> {
        Some('`')
    }

    #[inline]
    fn server_name(&self) -> &str {
        &self.server
    }

    fn execute_query(&mut self, sql: &str) -> Result<Vec<ColumnMeta>> {
        let mut g = self.remote.inner.lock();
        g.record(sql)?;
        let (metas, rows) = g.query(sql)?;
        self.result = Some((rows, 0));
        Ok(metas)
    }

    fn fetch(&mut self) -> Result<Option<Vec<Const>>> {
        match &mut self.result {
            Some((rows, pos)) if *pos < rows.len() => {
                *pos += 1;
                Ok(Some(rows[*pos - 1].clone()))
            }
            Some(_) => Ok(None),
            None => Err(Error::BackendQueryFailed("no active result".to_string())),
        }
    }

    fn execute_update(&mut self, sql: &str) -> Result<u64> {
        let mut g = self.remote.inner.lock();
        g.record(sql)?;
        let lower = sql.trim().to_ascii_lowercase();
        if let Some(rest) = lower.strip_prefix("delete from ") {
            if find_top(rest, " where ").is_none() {
                let name = rest.split_whitespace().next().unwrap_or_default();
                let name = unquote(name.rsplit('.').next().unwrap_or(name)).to_string();
                if let Some(t) = g.tables.get_mut(&name) {
                    let n = t.rows.len() as u64;
                    t.rows.clear();
                    return Ok(n);
                }
            }
        }
        Ok(1)
    }

    fn prepare(&mut self, sql: &str) -> Result<u32> {
        let mut g = self.remote.inner.lock();
        if !g.caps.contains(DriverCaps::PREPARE) {
            return Err(Error::NotImplemented("prepare"));
        }
        g.record(sql)?;
        self.prepared.push(sql.to_string());
        Ok(self.prepared.len() as u32 - 1)
    }

    fn execute_prepared(&mut self, stmt: u32, params: &[Const]) -> Result<u64> {
        let sql = self
            .prepared
            .get(stmt as usize)
            .ok_or_else(|| Error::BackendQueryFailed(format!("unknown statement {}", stmt)))?;
        let lower = sql.to_ascii_lowercase();
        let name = lower
            .strip_prefix("insert into ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(|n| unquote(n.rsplit('.').next().unwrap_or(n)).to_string())
            .ok_or_else(|| Error::BackendQueryFailed(format!("cannot execute {}", sql)))?;
        let mut g = self.remote.inner.lock();
        let t = g
            .tables
            .get_mut(&name)
            .ok_or_else(|| Error::BackendQueryFailed(format!("Table '{}' doesn't exist", name)))?;
        t.rows.push(params.to_vec());
        Ok(1)
    }

    fn scroll_to(&mut self, rowid: u64) -> Result<bool> {
        if !self.capabilities().contains(DriverCaps::SCROLL) {
            return Err(Error::NotImplemented("scroll_to"));
        }
        match &mut self.result {
            Some((rows, pos)) if rowid >= 1 && rowid as usize <= rows.len() => {
                *pos = rowid as usize - 1;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(Error::BackendQueryFailed("no active result".to_string())),
        }
    }

    fn columns(&mut self, table_pattern: &str) -> Result<Vec<(String, ColumnMeta)>> {
        let g = self.remote.inner.lock();
        let res: Vec<_> = g
            .tables
            .values()
            .filter(|t| like(&t.name, table_pattern))
            .flat_map(|t| t.columns.iter().map(move |c| (t.name.clone(), c.clone())))
            .collect();
        Ok(res)
    }

    fn tables(&mut self, pattern: &str) -> Result<Vec<TableMeta>> {
        let g = self.remote.inner.lock();
        Ok(g.tables
            .values()
            .filter(|t| like(&t.name, pattern))
            .map(|t| TableMeta {
                catalog: None,
                schema: None,
                name: t.name.clone(),
                kind: "TABLE".to_string(),
                remarks: None,
            })
            .collect())
    }

    fn close(&mut self) -> Result<()> {
        self.result = None;
        self.remote.inner.lock().closes += 1;
        Ok(())
    }
}

/// Matches name against a pattern where `%` matches any sequence and
/// `_` any single character, ignoring case.
pub(crate) fn like(name: &str, pattern: &str) -> bool {
    fn go(n: &[char], p: &[char]) -> bool {
        match p.split_first() {
            None => n.is_empty(),
            Some(('%', rest)) => (0..=n.len()).any(|i| go(&n[i..], rest)),
            Some((c, rest)) => match n.split_first() {
                Some((h, tail)) if *c == '_' || h.eq_ignore_ascii_case(c) => go(tail, rest),
                _ => false,
            },
        }
    }
    let n: Vec<char> = name.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    go(&n, &p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use xconn_datatype::PreciseType;

    fn remote() -> MemRemote {
        let r = MemRemote::new("mem1");
        r.create_table(
            "t1",
            vec![
                ColumnMeta::new("a", PreciseType::i64()),
                ColumnMeta::new("b", PreciseType::var_utf8(8)),
            ],
        );
        r.insert_rows(
            "t1",
            vec![
                vec![Const::I64(1), Const::new_str("x")],
                vec![Const::I64(2), Const::new_str("y")],
            ],
        );
        r
    }

    #[test]
    fn test_mem_query() {
        let r = remote();
        let mut conn = MemDriver::new(r.clone())
            .connect(&ConnectOptions::default())
            .unwrap();
        let metas = conn.execute_query("SELECT `b` FROM `db`.`t1` WHERE `a` > 1").unwrap();
        assert_eq!("b", metas[0].name);
        assert_eq!(Some(vec![Const::new_str("x")]), conn.fetch().unwrap());
        assert_eq!(2, conn.result_size("SELECT COUNT(*) FROM (SELECT a FROM t1 WHERE (a)) AS x").unwrap());
        assert!(conn.execute_query("SELECT c FROM t1").is_err());
        assert!(conn.execute_query("SELECT a FROM t9").is_err());
        assert_eq!(4, r.commands().len());
        assert!(conn.scroll_to(1).is_err());
        conn.close().unwrap();
        assert_eq!((1, 1), r.connections());
    }

    #[test]
    fn test_mem_updates() {
        let r = remote();
        let mut conn = MemDriver::new(r.clone())
            .connect(&ConnectOptions::default())
            .unwrap();
        let id = conn.prepare("INSERT INTO `t1` (`a`, `b`) VALUES (?, ?)").unwrap();
        conn.execute_prepared(id, &[Const::I64(3), Const::Null]).unwrap();
        assert_eq!(3, r.rows("t1").len());
        assert_eq!(1, conn.execute_update("DELETE FROM `t1` WHERE `a` = 1").unwrap());
        assert_eq!(3, conn.execute_update("DELETE FROM `t1`").unwrap());
        assert!(r.rows("t1").is_empty());
        r.fail_query(Some("delete"));
        assert!(conn.execute_update("DELETE FROM t1").is_err());
        r.fail_connect(true);
        assert!(MemDriver::new(r).connect(&ConnectOptions::default()).is_err());
    }

    #[test]
    fn test_like() {
        assert!(like("Orders", "ord%"));
        assert!(like("t1", "t_"));
        assert!(!like("t12", "t_"));
        assert!(like("x", "%"));
    }
}
