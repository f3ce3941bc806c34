use super::RemoteDef;
use crate::cursor::KeyOp;
use crate::error::{Error, Result};
use regex::RegexBuilder;
use xconn_datatype::Const;
use xconn_expr::sql::{quote_literal, SqlWriter};

/// Base select of a remote table. Key lookups derive their text from
/// it without changing it.
#[derive(Debug, Clone)]
pub(crate) struct Command {
    select_list: String,
    from: String,
    where_clause: Option<String>,
}

impl Command {
    /// Builds the select of given remote columns. An empty list
    /// selects every column.
    pub fn select(
        rdef: &RemoteDef,
        writer: &SqlWriter,
        columns: &[&str],
        where_clause: Option<String>,
    ) -> Self {
        let select_list = if columns.is_empty() {
            "*".to_string()
        } else {
            columns
                .iter()
                .map(|c| writer.quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        Command {
            select_list,
            from: source(rdef, writer),
            where_clause,
        }
    }

    #[inline]
    pub fn sql(&self) -> String {
        self.with_key(None, &[])
    }

    /// Select text with an extra key condition and ordering.
    pub fn with_key(&self, key_cond: Option<&str>, order_by: &[String]) -> String {
        let select = format!("SELECT {} FROM {}", self.select_list, self.from);
        let mut sql = self.append_where(select, key_cond);
        if !order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_by.join(", "));
        }
        sql
    }

    /// Row count query using the same source and filter.
    #[inline]
    pub fn count_sql(&self) -> String {
        self.count_with_key(None)
    }

    pub fn count_with_key(&self, key_cond: Option<&str>) -> String {
        let select = format!("SELECT COUNT(*) FROM {}", self.from);
        self.append_where(select, key_cond)
    }

    fn append_where(&self, mut sql: String, key_cond: Option<&str>) -> String {
        match (self.where_clause.as_deref(), key_cond) {
            (Some(w), Some(k)) => {
                sql.push_str(" WHERE (");
                sql.push_str(w);
                sql.push_str(") AND ");
                sql.push_str(k);
            }
            (Some(c), None) | (None, Some(c)) => {
                sql.push_str(" WHERE ");
                sql.push_str(c);
            }
            (None, None) => (),
        }
        sql
    }
}

/// FROM source: the qualified remote table or the user query as a
/// derived table.
fn source(rdef: &RemoteDef, writer: &SqlWriter) -> String {
    if let Some(src) = &rdef.srcdef {
        return format!("({}) AS xsrc", src);
    }
    qualified_table(rdef, writer)
}

pub(crate) fn qualified_table(rdef: &RemoteDef, writer: &SqlWriter) -> String {
    match &rdef.database {
        Some(db) => format!("{}.{}", writer.quote_ident(db), writer.quote_ident(&rdef.table)),
        None => writer.quote_ident(&rdef.table),
    }
}

/// Condition and ordering of a key lookup.
pub(crate) fn key_condition(
    writer: &SqlWriter,
    parts: &[&str],
    op: KeyOp,
    key: &[Const],
) -> Result<(Option<String>, Vec<String>)> {
    if key.len() > parts.len() {
        return Err(Error::InvalidState(format!(
            "key has {} values but index has {} columns",
            key.len(),
            parts.len()
        )));
    }
    let n = key.len();
    let cols: Vec<String> = parts[..n].iter().map(|p| writer.quote_ident(p)).collect();
    let vals = key[..n]
        .iter()
        .map(quote_literal)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let desc = matches!(op, KeyOp::LT | KeyOp::LE);
    let order = parts
        .iter()
        .map(|p| {
            let c = writer.quote_ident(p);
            if desc {
                format!("{} DESC", c)
            } else {
                c
            }
        })
        .collect();
    let cmp = match op {
        KeyOp::EQ => "=",
        KeyOp::GT => ">",
        KeyOp::GE => ">=",
        KeyOp::LT => "<",
        KeyOp::LE => "<=",
        KeyOp::FIRST => return Ok((None, order)),
        KeyOp::NEXT | KeyOp::SAME => {
            return Err(Error::InvalidState(format!("{:?} is not a key lookup", op)))
        }
    };
    if n == 0 {
        return Ok((None, order));
    }
    let cond = if op == KeyOp::EQ {
        cols.iter()
            .zip(&vals)
            .map(|(c, v)| format!("{} = {}", c, v))
            .collect::<Vec<_>>()
            .join(" AND ")
    } else if n == 1 {
        format!("{} {} {}", cols[0], cmp, vals[0])
    } else {
        format!("({}) {} ({})", cols.join(", "), cmp, vals.join(", "))
    };
    Ok((Some(cond), order))
}

/// Retargets a host statement to the remote table. The local table
/// name is replaced where it appears as a whole word.
pub(crate) fn retarget(statement: &str, local: &str, remote: &str) -> Result<String> {
    let name = regex::escape(local);
    let re = RegexBuilder::new(&format!(r"`{0}`|\b{0}\b", name))
        .case_insensitive(true)
        .build()?;
    let mut out = String::with_capacity(statement.len());
    let mut last = 0;
    let mut in_literal = false;
    // names inside string literals are kept
    for (i, c) in statement.char_indices() {
        if c == '\'' {
            if !in_literal {
                out.push_str(&re.replace_all(&statement[last..i], regex::NoExpand(remote)));
                last = i;
            } else {
                out.push_str(&statement[last..=i]);
                last = i + 1;
            }
            in_literal = !in_literal;
        }
    }
    if in_literal {
        out.push_str(&statement[last..]);
    } else {
        out.push_str(&re.replace_all(&statement[last..], regex::NoExpand(remote)));
    }
    Ok(out.trim().trim_end_matches(';').to_string())
}

/// Literal insert of one row.
pub(crate) fn insert_literal(table: &str, columns: &[String], row: &[Const]) -> Result<String> {
    let vals = row
        .iter()
        .map(quote_literal)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        vals.join(", ")
    ))
}

/// Parameterized insert of one row.
pub(crate) fn insert_prepared(table: &str, columns: &[String]) -> String {
    let params = vec!["?"; columns.len()];
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        params.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use xconn_catalog::{BackendType, OptionBag};

    fn rdef(opts: OptionBag) -> RemoteDef {
        RemoteDef::parse(BackendType::Mysql, "orders", &opts).unwrap()
    }

    #[test]
    fn test_select_command() {
        let w = SqlWriter::new(Some('`'));
        let def = rdef(OptionBag::new().with("database_name", "db"));
        let cmd = Command::select(&def, &w, &["id", "item"], Some("`id` > 3".to_string()));
        assert_eq!("SELECT `id`, `item` FROM `db`.`orders` WHERE `id` > 3", cmd.sql());
        assert_eq!("SELECT COUNT(*) FROM `db`.`orders` WHERE `id` > 3", cmd.count_sql());
        let (cond, order) = key_condition(&w, &["id"], KeyOp::GE, &[Const::I64(7)]).unwrap();
        assert_eq!(
            "SELECT `id`, `item` FROM `db`.`orders` WHERE (`id` > 3) AND `id` >= 7 ORDER BY `id`",
            cmd.with_key(cond.as_deref(), &order)
        );
        // base text is kept
        assert_eq!("SELECT `id`, `item` FROM `db`.`orders` WHERE `id` > 3", cmd.sql());
        let src = rdef(OptionBag::new().with("srcdef", "select a from b"));
        let cmd = Command::select(&src, &w, &[], None);
        assert_eq!("SELECT * FROM (select a from b) AS xsrc", cmd.sql());
    }

    #[test]
    fn test_key_condition() {
        let w = SqlWriter::new(None);
        let (cond, order) = key_condition(
            &w,
            &["a", "b"],
            KeyOp::EQ,
            &[Const::I64(1), Const::new_str("x'y")],
        )
        .unwrap();
        assert_eq!(Some("a = 1 AND b = 'x''y'".to_string()), cond);
        assert_eq!(vec!["a".to_string(), "b".to_string()], order);
        let (cond, order) =
            key_condition(&w, &["a", "b"], KeyOp::LT, &[Const::I64(1), Const::I64(2)]).unwrap();
        assert_eq!(Some("(a, b) < (1, 2)".to_string()), cond);
        assert_eq!("a DESC", order[0]);
        assert!(key_condition(&w, &["a"], KeyOp::NEXT, &[]).is_err());
        assert!(matches!(
            key_condition(&w, &["a"], KeyOp::EQ, &[Const::I64(1), Const::I64(2)]),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_retarget() {
        let s = retarget(
            "UPDATE Orders SET note = 'orders' WHERE orders.id = 1;",
            "orders",
            "`db`.`orders_v2`",
        )
        .unwrap();
        assert_eq!(
            "UPDATE `db`.`orders_v2` SET note = 'orders' WHERE `db`.`orders_v2`.id = 1",
            s
        );
        let s = retarget("delete from `orders`", "orders", "`remote`").unwrap();
        assert_eq!("delete from `remote`", s);
        let s = retarget("delete from orders_log", "orders", "x").unwrap();
        assert_eq!("delete from orders_log", s);
    }

    #[test]
    fn test_inserts() {
        let cols = vec!["`a`".to_string(), "`b`".to_string()];
        assert_eq!(
            "INSERT INTO `t` (`a`, `b`) VALUES (?, ?)",
            insert_prepared("`t`", &cols)
        );
        assert_eq!(
            "INSERT INTO `t` (`a`, `b`) VALUES (1, 'it''s')",
            insert_literal("`t`", &cols, &[Const::I64(1), Const::new_str("it's")]).unwrap()
        );
    }
}
