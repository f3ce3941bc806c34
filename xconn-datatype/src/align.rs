use crate::RuntimeType;
use crate::{Const, Datetime};
use std::cmp::Ordering;
use std::sync::Arc;

pub trait AlignPartialOrd<Rhs: ?Sized = Self> {
    fn align_partial_cmp(&self, other: &Rhs) -> Option<Ordering>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlignType {
    Identical,
    F64,
    Bytes,
    Datetime,
}

impl AlignType {
    /// Align two runtime types to single type for comparison.
    ///
    /// All numeric types are aligned to f64, which loses precision
    /// on large i64 and u64 values. Key values read from files are
    /// always cast to the declared column type before alignment.
    #[inline]
    pub fn cmp_align(this: RuntimeType, that: RuntimeType) -> Option<Self> {
        use RuntimeType::*;
        if this == that {
            return Some(AlignType::Identical);
        }
        let res = match this {
            I32 | U32 | I64 | U64 | F32 | F64 | Decimal | Bool => match that {
                Null | Unknown => return None,
                _ => AlignType::F64,
            },
            String | Bytes => match that {
                I32 | U32 | I64 | U64 | F32 | F64 | Decimal | Bool => AlignType::F64,
                String | Bytes | Time => AlignType::Bytes,
                Date | Datetime => AlignType::Datetime,
                Null | Unknown => return None,
            },
            Date | Datetime => match that {
                I32 | U32 | I64 | U64 | F32 | F64 | Decimal | Bool => AlignType::F64,
                String | Bytes | Date | Datetime => AlignType::Datetime,
                Time => AlignType::Bytes,
                Null | Unknown => return None,
            },
            Time => match that {
                I32 | U32 | I64 | U64 | F32 | F64 | Decimal | Bool => AlignType::F64,
                String | Bytes | Date | Datetime | Time => AlignType::Bytes,
                Null | Unknown => return None,
            },
            Null | Unknown => return None,
        };
        Some(res)
    }
}

impl AlignPartialOrd for Const {
    fn align_partial_cmp(&self, other: &Self) -> Option<Ordering> {
        AlignType::cmp_align(self.runtime_ty(), other.runtime_ty()).and_then(|ty| match ty {
            AlignType::F64 => match (self.cast_to_f64(), other.cast_to_f64()) {
                (Some(v0), Some(v1)) => v0.partial_cmp(&v1),
                _ => None,
            },
            AlignType::Bytes => match (cast_to_bytes(self), cast_to_bytes(other)) {
                (Some(v0), Some(v1)) => v0.partial_cmp(&v1),
                _ => None,
            },
            AlignType::Datetime => match (cast_to_datetime(self), cast_to_datetime(other)) {
                (Some(v0), Some(v1)) => v0.partial_cmp(&v1),
                _ => None,
            },
            AlignType::Identical => match (self, other) {
                (Const::Null, Const::Null) => None,
                _ => self.partial_cmp(other),
            },
        })
    }
}

fn cast_to_bytes(c: &Const) -> Option<Arc<[u8]>> {
    match c {
        Const::String(s) => Some(Arc::from(s.as_bytes())),
        Const::Bytes(b) => Some(Arc::clone(b)),
        Const::Null => None,
        other => other.to_text(None).ok().map(|s| Arc::from(s.as_bytes())),
    }
}

fn cast_to_datetime(c: &Const) -> Option<Datetime> {
    match c {
        Const::Datetime(dt) => Some(*dt),
        Const::Date(d) => Some(d.midnight()),
        Const::String(_) | Const::Bytes(_) => match c.cast_to(crate::PreciseType::datetime(0)) {
            Ok(Const::Datetime(dt)) => Some(dt),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_numeric() {
        let a = Const::I64(3);
        let b = Const::new_f64(2.5).unwrap();
        assert_eq!(Some(Ordering::Greater), a.align_partial_cmp(&b));
        let s = Const::new_str("10");
        assert_eq!(Some(Ordering::Less), a.align_partial_cmp(&s));
    }

    #[test]
    fn test_align_datetime() {
        let d = Const::parse_as("2022-03-01", crate::PreciseType::date(), None).unwrap();
        let s = Const::new_str("2022-02-28 10:00:00");
        assert_eq!(Some(Ordering::Greater), d.align_partial_cmp(&s));
        assert_eq!(None, Const::Null.align_partial_cmp(&Const::Null));
    }
}
