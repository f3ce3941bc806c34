use crate::Collation;
use crate::{Date, Datetime, PreciseType, RuntimeType, Time, Typed};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

/// Const is the runtime value of a single column in a single row.
/// Ordering between different variants follows declaration order, so
/// values should be cast to a common type before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Const {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(ValidF64),
    Date(Date),
    Time(Time),
    Datetime(Datetime),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
}

impl Default for Const {
    fn default() -> Self {
        Const::Null
    }
}

impl Typed for Const {
    #[inline]
    fn pty(&self) -> PreciseType {
        use Const::*;
        match self {
            I64(_) => PreciseType::i64(),
            U64(_) => PreciseType::u64(),
            F64(_) => PreciseType::f64(),
            Date(_) => PreciseType::date(),
            Time(tm) => PreciseType::Time(frac_of(tm.microsecond(), tm.millisecond())),
            Datetime(dt) => PreciseType::Datetime(frac_of(dt.microsecond(), dt.millisecond())),
            String(s) => {
                if s.is_ascii() {
                    PreciseType::char(s.chars().count() as u16, Collation::Ascii)
                } else {
                    PreciseType::char(s.chars().count() as u16, Collation::Utf8mb4)
                }
            }
            Bytes(b) => PreciseType::bytes(b.len() as u16),
            Bool(_) => PreciseType::bool(),
            Null => PreciseType::null(),
        }
    }
}

#[inline]
fn frac_of(micros: u32, millis: u16) -> u8 {
    if micros == 0 {
        0
    } else if millis as u32 * 1000 == micros {
        3
    } else {
        6
    }
}

impl Const {
    #[inline]
    pub fn new_f64(v: f64) -> Option<Self> {
        ValidF64::new(v).map(Const::F64)
    }

    #[inline]
    pub fn new_str(s: &str) -> Self {
        Const::String(Arc::from(s))
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Const::Null)
    }

    #[inline]
    pub fn runtime_ty(&self) -> RuntimeType {
        use Const::*;
        match self {
            I64(_) => RuntimeType::I64,
            U64(_) => RuntimeType::U64,
            F64(_) => RuntimeType::F64,
            Date(_) => RuntimeType::Date,
            Time(_) => RuntimeType::Time,
            Datetime(_) => RuntimeType::Datetime,
            String(_) => RuntimeType::String,
            Bytes(_) => RuntimeType::Bytes,
            Bool(_) => RuntimeType::Bool,
            Null => RuntimeType::Null,
        }
    }

    /// Returns the value as a signed integer if it is an integer
    /// constant representable as i64.
    #[inline]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Const::I64(v) => Some(*v),
            Const::U64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Const::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn cast_to_f64(&self) -> Option<f64> {
        let res = match self {
            Const::I64(v) => *v as f64,
            Const::U64(v) => *v as f64,
            Const::F64(v) => v.value(),
            Const::Bool(v) => {
                if *v {
                    1.0
                } else {
                    0.0
                }
            }
            Const::Date(_) | Const::Time(_) | Const::Datetime(_) => return None,
            // In MySQL, string is parsed to f64 in "best effort",
            // here we just truncate it to zero if it's not complete valid numerical text.
            Const::String(v) => return v.trim().parse().ok().or(Some(0.0)),
            Const::Bytes(v) => {
                return std::str::from_utf8(v)
                    .ok()
                    .and_then(|s| s.trim().parse().ok().or(Some(0.0)))
            }
            Const::Null => return None,
        };
        Some(res)
    }
}

pub const F64_ZERO: ValidF64 = ValidF64(0.0);
pub const F64_ONE: ValidF64 = ValidF64(1.0);

#[derive(Debug, Clone, Copy)]
pub struct ValidF64(f64);

impl ValidF64 {
    #[inline]
    pub fn new(value: f64) -> Option<Self> {
        if value.is_infinite() || value.is_nan() {
            None
        } else {
            Some(ValidF64(value))
        }
    }

    #[inline]
    pub const fn value(&self) -> f64 {
        self.0
    }
}

impl PartialEq for ValidF64 {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

// we must ensure f64 is valid for equality check
impl Eq for ValidF64 {}

impl PartialOrd for ValidF64 {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ValidF64 {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for ValidF64 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.to_bits())
    }
}

impl Deref for ValidF64 {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_f64() {
        assert!(ValidF64::new(f64::NAN).is_none());
        assert!(ValidF64::new(f64::INFINITY).is_none());
        assert_eq!(1.5, *ValidF64::new(1.5).unwrap());
        assert!(ValidF64::new(-1.0).unwrap() < F64_ZERO);
    }

    #[test]
    fn test_const_as_i64() {
        assert_eq!(Some(5), Const::I64(5).as_i64());
        assert_eq!(Some(5), Const::U64(5).as_i64());
        assert_eq!(None, Const::U64(u64::MAX).as_i64());
        assert_eq!(None, Const::new_str("5").as_i64());
    }

    #[test]
    fn test_const_pty() {
        assert_eq!(PreciseType::i64(), Const::I64(1).pty());
        assert_eq!(PreciseType::ascii(3), Const::new_str("abc").pty());
        assert_eq!(PreciseType::null(), Const::Null.pty());
    }

    #[test]
    fn test_cast_to_f64() {
        assert_eq!(Some(2.5), Const::new_str(" 2.5 ").cast_to_f64());
        assert_eq!(Some(0.0), Const::new_str("abc").cast_to_f64());
        assert_eq!(None, Const::Null.cast_to_f64());
    }
}
