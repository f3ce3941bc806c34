//! Computed tables whose rows carry only pseudo-column values.
//!
//! The row count is the `size` option unless a pushed filter bounds
//! ROWID from above. The bound is computed once when the filter is
//! pushed, so rows are never evaluated against the filter.
use crate::access::{Access, OpenArgs, RowInfo};
use crate::config::Config;
use crate::cursor::{Cardinality, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use std::sync::Arc;
use xconn_catalog::{ColumnDef, OptionBag, PseudoColumn};
use xconn_expr::{Const, Expr, ExprKind, Pred, PredFuncKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirDef {
    pub size: u64,
}

impl VirDef {
    /// Parses options and checks that only pseudo-columns are
    /// declared. Columns named after a pseudo-column become one.
    pub fn parse(config: &Config, cols: &mut [ColumnDef], options: &OptionBag) -> Result<Self> {
        for c in cols.iter_mut() {
            if c.special.is_none() {
                match PseudoColumn::from_name(c.name.as_str()) {
                    Some(sp) => c.special = Some(sp),
                    None => return Err(Error::invalid_option("special", c.name.as_str())),
                }
            }
        }
        let size = options.num_or("size", config.default_virtual_size)?;
        Ok(VirDef { size })
    }

    #[inline]
    pub fn default_columns(&self) -> Vec<ColumnDef> {
        vec![ColumnDef::pseudo(PseudoColumn::RowId, 0)]
    }
}

/// Upper bound of ROWID implied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bound {
    pub limit: u64,
    /// Whether the bound alone enforces the filter.
    pub exact: bool,
}

/// Computes the ROWID bound of the filter, starting from `size`.
///
/// Conjunctions take the smaller bound of their children and
/// disjunctions the larger one, with the roles swapped under
/// negation. Only a filter that is one upper-bound comparison on
/// ROWID can be dropped.
pub fn test_filter(filter: &Expr, size: u64, is_rowid: &dyn Fn(&str) -> bool) -> Bound {
    let limit = bound_of(filter, false, size, is_rowid);
    let mut top = filter;
    let mut negated = false;
    while let ExprKind::Pred(Pred::Not(inner)) = &top.kind {
        top = inner;
        negated = !negated;
    }
    let exact = matches!(
        rowid_cmp(top, negated, is_rowid),
        Some((PredFuncKind::Less | PredFuncKind::LessEqual, _))
    );
    Bound { limit, exact }
}

fn bound_of(e: &Expr, negated: bool, bound: u64, is_rowid: &dyn Fn(&str) -> bool) -> u64 {
    match &e.kind {
        ExprKind::Pred(Pred::Conj(es)) | ExprKind::Pred(Pred::Disj(es)) => {
            let conj = matches!(e.kind, ExprKind::Pred(Pred::Conj(_)));
            let bounds = es.iter().map(|c| bound_of(c, negated, bound, is_rowid));
            // AND narrows, OR widens; negation swaps them
            if conj != negated {
                bounds.min().unwrap_or(bound)
            } else {
                bounds.max().unwrap_or(bound)
            }
        }
        ExprKind::Pred(Pred::Not(inner)) => bound_of(inner, !negated, bound, is_rowid),
        _ => match rowid_cmp(e, negated, is_rowid) {
            Some((PredFuncKind::Less, n)) => bound.min(n.saturating_sub(1)),
            Some((PredFuncKind::LessEqual, n)) => bound.min(n),
            _ => bound,
        },
    }
}

/// Extracts `ROWID op n` in column-op-value orientation, with the
/// operator negated if required.
fn rowid_cmp(e: &Expr, negated: bool, is_rowid: &dyn Fn(&str) -> bool) -> Option<(PredFuncKind, u64)> {
    let f = match &e.kind {
        ExprKind::Pred(Pred::Func(f)) => f,
        _ => return None,
    };
    if !matches!(
        f.kind,
        PredFuncKind::Less | PredFuncKind::LessEqual | PredFuncKind::Greater | PredFuncKind::GreaterEqual
    ) || f.args.len() != 2
    {
        return None;
    }
    let (kind, col, val) = match (&f.args[0].kind, &f.args[1].kind) {
        (ExprKind::Col(c), ExprKind::Const(v)) => (f.kind, c, v),
        (ExprKind::Const(v), ExprKind::Col(c)) => (f.kind.flip(), c, v),
        _ => return None,
    };
    if !is_rowid(col.name.as_str()) {
        return None;
    }
    let n = match val {
        Const::I64(i) if *i >= 0 => *i as u64,
        Const::U64(u) => *u,
        _ => return None,
    };
    let kind = if negated { kind.negate() } else { kind };
    Some((kind, n))
}

/// VirTable produces rows 1 to the bound.
pub struct VirTable {
    def: Arc<TableDef>,
    size: u64,
    bound: u64,
    rowid: u64,
}

impl VirTable {
    pub fn new(def: Arc<TableDef>) -> Result<Self> {
        let size = match &def.access {
            AccessDef::Vir(v) => v.size,
            _ => return Err(def.access_mismatch()),
        };
        Ok(VirTable {
            def,
            size,
            bound: size,
            rowid: 0,
        })
    }

    #[inline]
    pub fn bound(&self) -> u64 {
        self.bound
    }
}

impl Access for VirTable {
    fn open(&mut self, _args: OpenArgs<'_>) -> Result<()> {
        self.rowid = 0;
        Ok(())
    }

    fn read_next(&mut self, _ctx: &mut QueryContext) -> Result<ReadStatus> {
        if self.rowid >= self.bound {
            return Ok(ReadStatus::EndOfData);
        }
        self.rowid += 1;
        Ok(ReadStatus::Row)
    }

    fn row_info(&self) -> RowInfo<'_> {
        RowInfo {
            rowid: self.rowid,
            rownum: self.rowid,
            ..Default::default()
        }
    }

    #[inline]
    fn cardinality(&mut self) -> Result<Cardinality> {
        Ok(Cardinality::Exact(self.bound))
    }

    #[inline]
    fn position(&self) -> Position {
        Position(self.rowid)
    }

    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        if pos.0 == 0 || pos.0 > self.bound {
            return Ok(ReadStatus::NotFound);
        }
        self.rowid = pos.0;
        Ok(ReadStatus::Row)
    }

    fn push_filter(&mut self, filter: Expr) -> Result<Option<Expr>> {
        let def = &self.def;
        let is_rowid = |name: &str| {
            PseudoColumn::from_name(name) == Some(PseudoColumn::RowId)
                || def
                    .columns
                    .iter()
                    .any(|c| c.special == Some(PseudoColumn::RowId) && c.name_eq(name))
        };
        let b = test_filter(&filter, self.size, &is_rowid);
        self.bound = b.limit;
        log::debug!(
            "filter bounds table {} to {} rows, exact {}",
            def.name.as_str(),
            b.limit,
            b.exact
        );
        if b.exact {
            Ok(None)
        } else {
            Ok(Some(filter))
        }
    }

    #[inline]
    fn close(&mut self, _ctx: &mut QueryContext) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rowid() -> Expr {
        Expr::col("ROWID")
    }

    fn bound(e: &Expr, size: u64) -> Bound {
        test_filter(e, size, &|n: &str| n.eq_ignore_ascii_case("rowid"))
    }

    #[test]
    fn test_filter_bounds() {
        let lt5 = Expr::cmp(PredFuncKind::Less, rowid(), Expr::const_i64(5));
        assert_eq!(Bound { limit: 4, exact: true }, bound(&lt5, 100));
        let le5 = Expr::cmp(PredFuncKind::LessEqual, rowid(), Expr::const_i64(5));
        assert_eq!(Bound { limit: 5, exact: true }, bound(&le5, 100));
        // size still caps the bound
        assert_eq!(Bound { limit: 3, exact: true }, bound(&le5, 3));
        let range = Expr::pred_conj(vec![
            Expr::cmp(PredFuncKind::Greater, rowid(), Expr::const_i64(5)),
            Expr::cmp(PredFuncKind::Less, rowid(), Expr::const_i64(80)),
        ]);
        assert_eq!(Bound { limit: 79, exact: false }, bound(&range, 100));
        let not_ge = Expr::pred_not(Expr::cmp(
            PredFuncKind::GreaterEqual,
            rowid(),
            Expr::const_i64(10),
        ));
        let lt10 = Expr::cmp(PredFuncKind::Less, rowid(), Expr::const_i64(10));
        assert_eq!(bound(&lt10, 100), bound(&not_ge, 100));
    }

    #[test]
    fn test_filter_shapes() {
        // constant on the left is flipped
        let gt = Expr::cmp(PredFuncKind::Greater, Expr::const_i64(7), rowid());
        assert_eq!(Bound { limit: 6, exact: true }, bound(&gt, 100));
        let or = Expr::pred_disj(vec![
            Expr::cmp(PredFuncKind::Less, rowid(), Expr::const_i64(5)),
            Expr::cmp(PredFuncKind::LessEqual, rowid(), Expr::const_i64(20)),
        ]);
        assert_eq!(Bound { limit: 20, exact: false }, bound(&or, 100));
        // NOT(a OR b) is NOT a AND NOT b
        let nor = Expr::pred_not(Expr::pred_disj(vec![
            Expr::cmp(PredFuncKind::GreaterEqual, rowid(), Expr::const_i64(30)),
            Expr::cmp(PredFuncKind::Equal, Expr::col("x"), Expr::const_i64(1)),
        ]));
        assert_eq!(Bound { limit: 29, exact: false }, bound(&nor, 100));
        let other = Expr::cmp(PredFuncKind::Less, Expr::col("x"), Expr::const_i64(5));
        assert_eq!(Bound { limit: 100, exact: false }, bound(&other, 100));
        let neg = Expr::cmp(PredFuncKind::Less, rowid(), Expr::const_i64(-5));
        assert_eq!(Bound { limit: 100, exact: false }, bound(&neg, 100));
    }
}
