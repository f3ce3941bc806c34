use crate::Expr;

/// Predicate of a pushed-down filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Pred {
    True,
    False,
    Conj(Vec<Expr>),
    Disj(Vec<Expr>),
    Func(PredFunc),
    Not(Box<Expr>),
}

impl Pred {
    #[inline]
    pub fn func(kind: PredFuncKind, args: Vec<Expr>) -> Self {
        Pred::Func(PredFunc {
            kind,
            args: args.into_boxed_slice(),
        })
    }
}

/// Predicate function is special function that returns only bool value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredFunc {
    pub kind: PredFuncKind,
    pub args: Box<[Expr]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredFuncKind {
    // comparison
    Equal,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    NotEqual,
    // special comparison: is
    IsNull,
    IsNotNull,
    // special comparison: match
    Like,
    NotLike,
    // layout of arguments: first arg is lhs, others are in list.
    InValues,
    NotInValues,
    // layout of arguments: lhs, low, high.
    Between,
    NotBetween,
}

impl PredFuncKind {
    #[inline]
    pub fn is_cmp(&self) -> bool {
        matches!(
            self,
            PredFuncKind::Equal
                | PredFuncKind::Greater
                | PredFuncKind::GreaterEqual
                | PredFuncKind::Less
                | PredFuncKind::LessEqual
                | PredFuncKind::NotEqual
        )
    }

    /// Returns the comparison with both sides swapped, so that
    /// `c op x` equals `x op.flip() c`.
    #[inline]
    pub fn flip(&self) -> Self {
        match self {
            PredFuncKind::Greater => PredFuncKind::Less,
            PredFuncKind::GreaterEqual => PredFuncKind::LessEqual,
            PredFuncKind::Less => PredFuncKind::Greater,
            PredFuncKind::LessEqual => PredFuncKind::GreaterEqual,
            other => *other,
        }
    }

    /// Returns the logical negation.
    #[inline]
    pub fn negate(&self) -> Self {
        match self {
            PredFuncKind::Equal => PredFuncKind::NotEqual,
            PredFuncKind::NotEqual => PredFuncKind::Equal,
            PredFuncKind::Greater => PredFuncKind::LessEqual,
            PredFuncKind::GreaterEqual => PredFuncKind::Less,
            PredFuncKind::Less => PredFuncKind::GreaterEqual,
            PredFuncKind::LessEqual => PredFuncKind::Greater,
            PredFuncKind::IsNull => PredFuncKind::IsNotNull,
            PredFuncKind::IsNotNull => PredFuncKind::IsNull,
            PredFuncKind::Like => PredFuncKind::NotLike,
            PredFuncKind::NotLike => PredFuncKind::Like,
            PredFuncKind::InValues => PredFuncKind::NotInValues,
            PredFuncKind::NotInValues => PredFuncKind::InValues,
            PredFuncKind::Between => PredFuncKind::NotBetween,
            PredFuncKind::NotBetween => PredFuncKind::Between,
        }
    }

    /// SQL operator text of comparisons and matches.
    #[inline]
    pub fn op_str(&self) -> &'static str {
        match self {
            PredFuncKind::Equal => "=",
            PredFuncKind::Greater => ">",
            PredFuncKind::GreaterEqual => ">=",
            PredFuncKind::Less => "<",
            PredFuncKind::LessEqual => "<=",
            PredFuncKind::NotEqual => "<>",
            PredFuncKind::IsNull => "IS NULL",
            PredFuncKind::IsNotNull => "IS NOT NULL",
            PredFuncKind::Like => "LIKE",
            PredFuncKind::NotLike => "NOT LIKE",
            PredFuncKind::InValues => "IN",
            PredFuncKind::NotInValues => "NOT IN",
            PredFuncKind::Between => "BETWEEN",
            PredFuncKind::NotBetween => "NOT BETWEEN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_and_negate() {
        assert_eq!(PredFuncKind::Greater, PredFuncKind::Less.flip());
        assert_eq!(PredFuncKind::Equal, PredFuncKind::Equal.flip());
        assert_eq!(PredFuncKind::Less, PredFuncKind::GreaterEqual.negate());
        assert_eq!(PredFuncKind::Like, PredFuncKind::NotLike.negate());
        assert!(!PredFuncKind::Between.is_cmp());
    }
}
