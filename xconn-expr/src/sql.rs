//! Rendering of filters as SQL text for remote sources.
use crate::error::{Error, Result};
use crate::{Const, Expr, ExprKind, Pred, PredFunc, PredFuncKind};
use std::fmt::Write;

/// SqlWriter renders expressions into a WHERE fragment.
///
/// Identifiers are quoted with the quote character of the remote
/// connection if one is set. Literals are always escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlWriter {
    quote: Option<char>,
}

impl SqlWriter {
    #[inline]
    pub fn new(quote: Option<char>) -> Self {
        SqlWriter { quote }
    }

    /// Quotes an identifier, doubling embedded quote characters.
    #[inline]
    pub fn quote_ident(&self, name: &str) -> String {
        match self.quote {
            None => name.to_string(),
            Some(q) => {
                let mut s = String::with_capacity(name.len() + 2);
                s.push(q);
                for c in name.chars() {
                    if c == q {
                        s.push(q);
                    }
                    s.push(c);
                }
                s.push(q);
                s
            }
        }
    }

    /// Renders the expression. Fails if any part cannot be
    /// expressed in SQL.
    #[inline]
    pub fn render(&self, e: &Expr) -> Result<String> {
        let mut out = String::new();
        self.write_expr(e, &mut out)?;
        Ok(out)
    }

    /// Splits the filter into the pushable conjuncts rendered as one
    /// WHERE fragment, and the residual part the host must still
    /// evaluate.
    pub fn split_pushable(&self, filter: Expr) -> (Option<String>, Option<Expr>) {
        let mut pushed = vec![];
        let mut residual = vec![];
        for e in filter.into_conj() {
            match self.render(&e) {
                Ok(s) => pushed.push(if is_junction(&e) { format!("({})", s) } else { s }),
                Err(_) => residual.push(e),
            }
        }
        let where_clause = if pushed.is_empty() {
            None
        } else {
            Some(pushed.join(" AND "))
        };
        let residual = if residual.is_empty() {
            None
        } else {
            Some(Expr::pred_conj(residual))
        };
        (where_clause, residual)
    }

    pub fn write_expr(&self, e: &Expr, out: &mut String) -> Result<()> {
        match &e.kind {
            ExprKind::Const(c) => out.push_str(&quote_literal(c)?),
            ExprKind::Col(col) => out.push_str(&self.quote_ident(col.name.as_str())),
            ExprKind::Func { name, .. } => {
                return Err(Error::NotPushable(format!("function {}", name.as_str())))
            }
            ExprKind::Pred(p) => match p {
                Pred::True => out.push_str("1=1"),
                Pred::False => out.push_str("1=0"),
                Pred::Conj(es) => self.write_junction(es, " AND ", out)?,
                Pred::Disj(es) => self.write_junction(es, " OR ", out)?,
                Pred::Not(e) => {
                    out.push_str("NOT (");
                    self.write_expr(e, out)?;
                    out.push(')');
                }
                Pred::Func(f) => self.write_pred_func(f, out)?,
            },
        }
        Ok(())
    }

    fn write_junction(&self, es: &[Expr], sep: &str, out: &mut String) -> Result<()> {
        for (i, e) in es.iter().enumerate() {
            if i > 0 {
                out.push_str(sep);
            }
            if is_junction(e) {
                out.push('(');
                self.write_expr(e, out)?;
                out.push(')');
            } else {
                self.write_expr(e, out)?;
            }
        }
        Ok(())
    }

    fn write_pred_func(&self, f: &PredFunc, out: &mut String) -> Result<()> {
        let args = &f.args;
        match f.kind {
            PredFuncKind::IsNull | PredFuncKind::IsNotNull => {
                check_args(args.len() == 1, f.kind)?;
                self.write_expr(&args[0], out)?;
                let _ = write!(out, " {}", f.kind.op_str());
            }
            PredFuncKind::InValues | PredFuncKind::NotInValues => {
                check_args(args.len() >= 2, f.kind)?;
                self.write_expr(&args[0], out)?;
                let _ = write!(out, " {} (", f.kind.op_str());
                for (i, a) in args[1..].iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_expr(a, out)?;
                }
                out.push(')');
            }
            PredFuncKind::Between | PredFuncKind::NotBetween => {
                check_args(args.len() == 3, f.kind)?;
                self.write_expr(&args[0], out)?;
                let _ = write!(out, " {} ", f.kind.op_str());
                self.write_expr(&args[1], out)?;
                out.push_str(" AND ");
                self.write_expr(&args[2], out)?;
            }
            _ => {
                check_args(args.len() == 2, f.kind)?;
                self.write_expr(&args[0], out)?;
                let _ = write!(out, " {} ", f.kind.op_str());
                self.write_expr(&args[1], out)?;
            }
        }
        Ok(())
    }
}

#[inline]
fn is_junction(e: &Expr) -> bool {
    matches!(e.kind, ExprKind::Pred(Pred::Conj(_) | Pred::Disj(_)))
}

#[inline]
fn check_args(ok: bool, kind: PredFuncKind) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgumentCount(kind.op_str()))
    }
}

/// Renders a constant as SQL literal. Text and temporal values are
/// single-quoted with quotes and backslashes escaped.
pub fn quote_literal(c: &Const) -> Result<String> {
    let res = match c {
        Const::Null => "NULL".to_string(),
        Const::I64(_) | Const::U64(_) | Const::F64(_) | Const::Bool(_) => c.to_text(None)?,
        Const::Bytes(bs) => {
            let mut s = String::with_capacity(bs.len() * 2 + 3);
            s.push_str("X'");
            for b in bs.iter() {
                let _ = write!(s, "{:02X}", b);
            }
            s.push('\'');
            s
        }
        Const::String(_) | Const::Date(_) | Const::Time(_) | Const::Datetime(_) => {
            let text = c.to_text(None)?;
            let mut s = String::with_capacity(text.len() + 2);
            s.push('\'');
            for ch in text.chars() {
                match ch {
                    '\'' => s.push_str("''"),
                    '\\' => s.push_str("\\\\"),
                    _ => s.push(ch),
                }
            }
            s.push('\'');
            s
        }
    };
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_literal() {
        assert_eq!("NULL", quote_literal(&Const::Null).unwrap());
        assert_eq!("-3", quote_literal(&Const::I64(-3)).unwrap());
        assert_eq!("'O''Brien'", quote_literal(&Const::new_str("O'Brien")).unwrap());
        assert_eq!("'a\\\\b'", quote_literal(&Const::new_str("a\\b")).unwrap());
        let bs = Const::Bytes(std::sync::Arc::from(&[0x0au8, 0xff][..]));
        assert_eq!("X'0AFF'", quote_literal(&bs).unwrap());
    }

    #[test]
    fn test_render_where() {
        let w = SqlWriter::new(Some('`'));
        let e = Expr::pred_conj(vec![
            Expr::cmp(PredFuncKind::GreaterEqual, Expr::col("id"), Expr::const_i64(10)),
            Expr::pred_disj(vec![
                Expr::pred_func(PredFuncKind::IsNull, vec![Expr::col("name")]),
                Expr::pred_func(
                    PredFuncKind::InValues,
                    vec![Expr::col("name"), Expr::const_str("a"), Expr::const_str("b")],
                ),
            ]),
        ]);
        assert_eq!(
            "`id` >= 10 AND (`name` IS NULL OR `name` IN ('a', 'b'))",
            w.render(&e).unwrap()
        );
        let e = Expr::pred_not(Expr::pred_func(
            PredFuncKind::Between,
            vec![Expr::col("x"), Expr::const_i64(1), Expr::const_i64(5)],
        ));
        assert_eq!("NOT (x BETWEEN 1 AND 5)", SqlWriter::new(None).render(&e).unwrap());
        assert_eq!("`a``b`", w.quote_ident("a`b"));
    }

    #[test]
    fn test_split_pushable() {
        let w = SqlWriter::new(None);
        let f = Expr::pred_conj(vec![
            Expr::cmp(PredFuncKind::Equal, Expr::col("a"), Expr::const_i64(1)),
            Expr::cmp(
                PredFuncKind::Equal,
                Expr::col("b"),
                Expr::func("upper", vec![Expr::col("c")]),
            ),
            Expr::pred_disj(vec![
                Expr::cmp(PredFuncKind::Less, Expr::col("d"), Expr::const_i64(2)),
                Expr::cmp(PredFuncKind::Greater, Expr::col("d"), Expr::const_i64(8)),
            ]),
        ]);
        let (pushed, residual) = w.split_pushable(f);
        assert_eq!(Some("a = 1 AND (d < 2 OR d > 8)".to_string()), pushed);
        let residual = residual.unwrap();
        assert!(residual.contains_func());
        assert_eq!(1, residual.into_conj().len());
        let (pushed, residual) = w.split_pushable(Expr::func("f", vec![]));
        assert!(pushed.is_none());
        assert!(residual.is_some());
    }
}
