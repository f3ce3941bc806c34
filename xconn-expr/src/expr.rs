use crate::pred::{Pred, PredFuncKind};
use semistr::SemiStr;
use smallvec::{smallvec, SmallVec};
use std::ops::ControlFlow;
use std::sync::Arc;

pub use xconn_datatype::{Const, ValidF64};

/// Expr is a node of the filter tree pushed down by the host engine.
///
/// Only constants, column references and predicates are understood
/// by the table layer. Anything else arrives as an opaque function
/// call and is never pushed to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Expr {
    pub kind: ExprKind,
}

impl Expr {
    #[inline]
    pub fn new(e: ExprKind) -> Self {
        Expr { kind: e }
    }

    #[inline]
    pub fn const_i64(i: i64) -> Self {
        Expr::new(ExprKind::Const(Const::I64(i)))
    }

    #[inline]
    pub fn const_str(s: &str) -> Self {
        Expr::new(ExprKind::Const(Const::String(Arc::from(s))))
    }

    #[inline]
    pub fn col(name: &str) -> Self {
        Expr::new(ExprKind::Col(Col::new(name)))
    }

    /// Opaque function call the table layer does not interpret.
    #[inline]
    pub fn func(name: &str, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Func {
            name: SemiStr::new(name),
            args,
        })
    }

    #[inline]
    pub fn pred(pred: Pred) -> Self {
        Expr::new(ExprKind::Pred(pred))
    }

    #[inline]
    pub fn pred_not(e: Expr) -> Self {
        Expr::new(ExprKind::Pred(Pred::Not(Box::new(e))))
    }

    #[inline]
    pub fn pred_func(kind: PredFuncKind, args: Vec<Expr>) -> Self {
        Expr::new(ExprKind::Pred(Pred::func(kind, args)))
    }

    /// Comparison between two expressions.
    #[inline]
    pub fn cmp(kind: PredFuncKind, lhs: Expr, rhs: Expr) -> Self {
        Expr::pred_func(kind, vec![lhs, rhs])
    }

    /// Conjunction of given expressions. Empty input is always true.
    #[inline]
    pub fn pred_conj(mut exprs: Vec<Expr>) -> Self {
        match exprs.len() {
            0 => Expr::pred(Pred::True),
            1 => exprs.pop().unwrap_or_default(),
            _ => Expr::new(ExprKind::Pred(Pred::Conj(exprs))),
        }
    }

    #[inline]
    pub fn pred_disj(mut exprs: Vec<Expr>) -> Self {
        match exprs.len() {
            0 => Expr::pred(Pred::False),
            1 => exprs.pop().unwrap_or_default(),
            _ => Expr::new(ExprKind::Pred(Pred::Disj(exprs))),
        }
    }

    /// Splits top-level conjunction into its parts.
    /// Nested conjunctions are flattened.
    #[inline]
    pub fn into_conj(self) -> Vec<Expr> {
        match self.kind {
            ExprKind::Pred(Pred::Conj(es)) => es.into_iter().flat_map(Expr::into_conj).collect(),
            ExprKind::Pred(Pred::True) => vec![],
            _ => vec![self],
        }
    }

    /// Return arguments of current expression.
    /// Many expressions has two arguments so we use SmallVec<[&Expr; 2]>.
    #[inline]
    pub fn args(&self) -> SmallVec<[&Expr; 2]> {
        match &self.kind {
            ExprKind::Const(_) | ExprKind::Col(_) => smallvec![],
            ExprKind::Func { args, .. } => args.iter().collect(),
            ExprKind::Pred(p) => match p {
                Pred::True | Pred::False => smallvec![],
                Pred::Conj(es) | Pred::Disj(es) => SmallVec::from_iter(es.iter()),
                Pred::Not(e) => smallvec![e.as_ref()],
                Pred::Func(f) => f.args.iter().collect(),
            },
        }
    }

    /// Returns mutable arguments of current expression.
    #[inline]
    pub fn args_mut(&mut self) -> SmallVec<[&mut Expr; 2]> {
        match &mut self.kind {
            ExprKind::Const(_) | ExprKind::Col(_) => smallvec![],
            ExprKind::Func { args, .. } => args.iter_mut().collect(),
            ExprKind::Pred(p) => match p {
                Pred::True | Pred::False => smallvec![],
                Pred::Conj(es) | Pred::Disj(es) => SmallVec::from_iter(es.iter_mut()),
                Pred::Not(e) => smallvec![e.as_mut()],
                Pred::Func(f) => f.args.iter_mut().collect(),
            },
        }
    }

    pub fn walk<'a, V: ExprVisitor<'a>>(
        &'a self,
        visitor: &mut V,
    ) -> ControlFlow<V::Break, V::Cont> {
        let mut eff = visitor.enter(self)?;
        for c in self.args() {
            eff.merge(c.walk(visitor)?)
        }
        eff.merge(visitor.leave(self)?);
        ControlFlow::Continue(eff)
    }

    pub fn walk_mut<V: ExprMutVisitor>(
        &mut self,
        visitor: &mut V,
    ) -> ControlFlow<V::Break, V::Cont> {
        let mut eff = visitor.enter(self)?;
        for c in self.args_mut() {
            eff.merge(c.walk_mut(visitor)?)
        }
        eff.merge(visitor.leave(self)?);
        ControlFlow::Continue(eff)
    }

    /// Collects distinct column names referenced by this expression,
    /// in order of first appearance. Names are compared
    /// case-insensitively.
    #[inline]
    pub fn collect_cols(&self) -> Vec<SemiStr> {
        let mut cols = vec![];
        self.collect_cols_into(&mut cols);
        cols
    }

    #[inline]
    pub fn collect_cols_into(&self, cols: &mut Vec<SemiStr>) {
        struct Collect<'a>(&'a mut Vec<SemiStr>);
        impl<'a> ExprVisitor<'a> for Collect<'_> {
            type Cont = ();
            type Break = ();
            #[inline]
            fn enter(&mut self, e: &Expr) -> ControlFlow<()> {
                if let ExprKind::Col(col) = &e.kind {
                    if !self
                        .0
                        .iter()
                        .any(|c| c.as_str().eq_ignore_ascii_case(col.name.as_str()))
                    {
                        self.0.push(col.name.clone())
                    }
                }
                ControlFlow::Continue(())
            }
        }
        let _ = self.walk(&mut Collect(cols));
    }

    /// Returns true if any opaque function exists in the tree.
    #[inline]
    pub fn contains_func(&self) -> bool {
        struct Contains;
        impl<'a> ExprVisitor<'a> for Contains {
            type Cont = ();
            type Break = ();
            #[inline]
            fn enter(&mut self, e: &Expr) -> ControlFlow<()> {
                if let ExprKind::Func { .. } = &e.kind {
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
        }
        self.walk(&mut Contains).is_break()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Const(Const),
    Col(Col),
    Pred(Pred),
    Func { name: SemiStr, args: Vec<Expr> },
}

impl Default for ExprKind {
    fn default() -> Self {
        ExprKind::Const(Const::Null)
    }
}

/// Column reference by name, resolved against the table definition
/// when the filter is pushed to a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Col {
    pub name: SemiStr,
}

impl Col {
    #[inline]
    pub fn new(name: &str) -> Self {
        Col {
            name: SemiStr::new(name),
        }
    }

    #[inline]
    pub fn name_eq(&self, name: &str) -> bool {
        self.name.as_str().eq_ignore_ascii_case(name)
    }
}

pub trait Effect: Default {
    fn merge(&mut self, other: Self);
}

impl Effect for () {
    #[inline]
    fn merge(&mut self, _other: Self) {}
}

pub trait ExprVisitor<'a>: Sized {
    type Cont: Effect;
    type Break;
    /// Returns true if continue
    #[inline]
    fn enter(&mut self, _e: &'a Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }

    /// Returns true if continue
    #[inline]
    fn leave(&mut self, _e: &'a Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }
}

pub trait ExprMutVisitor {
    type Cont: Effect;
    type Break;
    /// Returns true if continue
    #[inline]
    fn enter(&mut self, _e: &mut Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }

    /// Returns true if continue
    #[inline]
    fn leave(&mut self, _e: &mut Expr) -> ControlFlow<Self::Break, Self::Cont> {
        ControlFlow::Continue(Self::Cont::default())
    }
}

/// Renames column references in place, used to map local column
/// names to the names of a remote source.
pub struct RenameCols<F>(pub F);

impl<F: FnMut(&str) -> Option<SemiStr>> ExprMutVisitor for RenameCols<F> {
    type Cont = ();
    type Break = ();
    #[inline]
    fn leave(&mut self, e: &mut Expr) -> ControlFlow<()> {
        if let ExprKind::Col(col) = &mut e.kind {
            if let Some(name) = (self.0)(col.name.as_str()) {
                col.name = name;
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_of_smallvec_expr_ref() {
        use std::mem::size_of;
        println!("size of Expr is {}", size_of::<Expr>());
        println!(
            "size of SmallVec<[&Expr; 2]> is {}",
            size_of::<SmallVec<[&Expr; 2]>>()
        );
    }

    #[test]
    fn test_conj_split_and_merge() {
        let a = Expr::cmp(PredFuncKind::Less, Expr::col("a"), Expr::const_i64(1));
        let b = Expr::cmp(PredFuncKind::Greater, Expr::col("b"), Expr::const_i64(2));
        let c = Expr::cmp(PredFuncKind::Equal, Expr::col("A"), Expr::const_i64(3));
        let inner = Expr::pred_conj(vec![b.clone(), c.clone()]);
        let e = Expr::pred_conj(vec![a.clone(), inner]);
        assert_eq!(vec![a.clone(), b, c], e.clone().into_conj());
        assert_eq!(a, Expr::pred_conj(vec![a.clone()]));
        assert!(Expr::pred_conj(vec![]).into_conj().is_empty());
        assert_eq!(
            vec!["a", "b"],
            e.collect_cols()
                .iter()
                .map(|c| c.as_str())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_rename_cols() {
        let mut e = Expr::pred_not(Expr::cmp(
            PredFuncKind::Equal,
            Expr::col("id"),
            Expr::func("abs", vec![Expr::col("x")]),
        ));
        assert!(e.contains_func());
        let _ = e.walk_mut(&mut RenameCols(|n: &str| {
            if n == "id" {
                Some(SemiStr::new("remote_id"))
            } else {
                None
            }
        }));
        let cols = e.collect_cols();
        assert_eq!("remote_id", cols[0].as_str());
        assert_eq!("x", cols[1].as_str());
    }
}
