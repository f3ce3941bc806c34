pub mod align;
pub mod convert;
pub mod error;
pub mod konst;

pub use convert::*;
pub use konst::*;

pub use time::format_description::{self, FormatItem, OwnedFormatItem};
pub use time::PrimitiveDateTime as Datetime;
pub use time::{Date, Time};

use static_init::dynamic;
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PreciseType {
    /// Columns discovered from a backend that cannot report
    /// a type start with unknown type.
    Unknown,
    /// Only constant null will have null type.
    Null,
    /// Integer type.
    /// First argument is byte number.
    /// Second argument is unsigned flag.
    Int(u8, bool),
    /// Decimal with max precision and max fraction.
    /// Values are carried as f64.
    Decimal(u8, u8),
    Float(u8),
    Bool,
    Date,
    Time(u8),
    Datetime(u8),
    /// Note: Char and Varchar length is not same as bytes.
    /// It depends on collation, e.g. commonly used utf8mb4
    /// uses at most 4 bytes to store single character.
    Char(u16, Collation),
    Varchar(u16, Collation),
}

impl Default for PreciseType {
    fn default() -> Self {
        PreciseType::Unknown
    }
}

impl PreciseType {
    #[inline]
    pub fn null() -> Self {
        PreciseType::Null
    }

    #[inline]
    pub fn bool() -> Self {
        PreciseType::Bool
    }

    #[inline]
    pub fn int(bytes: u8, unsigned: bool) -> Self {
        PreciseType::Int(bytes, unsigned)
    }

    #[inline]
    pub fn i32() -> Self {
        PreciseType::Int(4, false)
    }

    #[inline]
    pub fn u32() -> Self {
        PreciseType::Int(4, true)
    }

    #[inline]
    pub fn i64() -> Self {
        PreciseType::Int(8, false)
    }

    #[inline]
    pub fn u64() -> Self {
        PreciseType::Int(8, true)
    }

    #[inline]
    pub fn f32() -> Self {
        PreciseType::Float(4)
    }

    #[inline]
    pub fn f64() -> Self {
        PreciseType::Float(8)
    }

    #[inline]
    pub fn decimal(max_prec: u8, max_frac: u8) -> Self {
        PreciseType::Decimal(max_prec, max_frac)
    }

    #[inline]
    pub fn char(len: u16, collation: Collation) -> Self {
        PreciseType::Char(len, collation)
    }

    #[inline]
    pub fn varchar(max_len: u16, collation: Collation) -> Self {
        PreciseType::Varchar(max_len, collation)
    }

    #[inline]
    pub fn ascii(len: u16) -> Self {
        PreciseType::Char(len, Collation::Ascii)
    }

    #[inline]
    pub fn var_utf8(max_len: u16) -> Self {
        PreciseType::Varchar(max_len, Collation::Utf8mb4)
    }

    #[inline]
    pub fn bytes(len: u16) -> Self {
        PreciseType::Char(len, Collation::Binary)
    }

    #[inline]
    pub fn date() -> Self {
        PreciseType::Date
    }

    #[inline]
    pub fn time(frac: u8) -> Self {
        PreciseType::Time(frac)
    }

    #[inline]
    pub fn datetime(frac: u8) -> Self {
        PreciseType::Datetime(frac)
    }

    #[inline]
    pub fn runtime_ty(&self) -> RuntimeType {
        match self {
            PreciseType::Int(n, false) => match n {
                1..=4 => RuntimeType::I32,
                _ => RuntimeType::I64,
            },
            PreciseType::Int(n, true) => match n {
                1..=4 => RuntimeType::U32,
                _ => RuntimeType::U64,
            },
            PreciseType::Float(n) => match n {
                4 => RuntimeType::F32,
                _ => RuntimeType::F64,
            },
            PreciseType::Decimal { .. } => RuntimeType::Decimal,
            PreciseType::Bool => RuntimeType::Bool,
            PreciseType::Char(_, Collation::Binary)
            | PreciseType::Varchar(_, Collation::Binary) => RuntimeType::Bytes,
            PreciseType::Char(..) | PreciseType::Varchar(..) => RuntimeType::String,
            PreciseType::Date => RuntimeType::Date,
            PreciseType::Time(..) => RuntimeType::Time,
            PreciseType::Datetime(..) => RuntimeType::Datetime,
            PreciseType::Null => RuntimeType::Null,
            PreciseType::Unknown => RuntimeType::Unknown,
        }
    }

    /// Returns true if values of this type are rendered as quoted
    /// literals in SQL text and in delimited files.
    #[inline]
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            PreciseType::Char(..)
                | PreciseType::Varchar(..)
                | PreciseType::Date
                | PreciseType::Time(_)
                | PreciseType::Datetime(_)
        )
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            PreciseType::Int(..) | PreciseType::Decimal(..) | PreciseType::Float(_)
        )
    }

    /// Returns declared display length of the type, used as default
    /// field length of fixed-record layouts.
    #[inline]
    pub fn display_len(&self) -> usize {
        match self {
            PreciseType::Int(1, _) => 4,
            PreciseType::Int(2, _) => 6,
            PreciseType::Int(3..=4, _) => 11,
            PreciseType::Int(..) => 20,
            PreciseType::Decimal(prec, _) => *prec as usize + 2,
            PreciseType::Float(4) => 12,
            PreciseType::Float(_) => 22,
            PreciseType::Bool => 1,
            PreciseType::Date => 10,
            PreciseType::Time(frac) => 8 + if *frac > 0 { *frac as usize + 1 } else { 0 },
            PreciseType::Datetime(frac) => 19 + if *frac > 0 { *frac as usize + 1 } else { 0 },
            PreciseType::Char(n, _) | PreciseType::Varchar(n, _) => *n as usize,
            PreciseType::Null | PreciseType::Unknown => 0,
        }
    }

    #[inline]
    pub fn to_lower(&self) -> Cow<'_, str> {
        match self {
            PreciseType::Unknown => Cow::Borrowed("unknown"),
            PreciseType::Null => Cow::Borrowed("null"),
            PreciseType::Int(bytes, unsigned) => {
                if *unsigned {
                    Cow::Owned(format!("uint({})", bytes))
                } else {
                    Cow::Owned(format!("int({})", bytes))
                }
            }
            PreciseType::Decimal(max_prec, max_frac) => {
                Cow::Owned(format!("decimal({}, {})", max_prec, max_frac))
            }
            PreciseType::Float(bytes) => Cow::Owned(format!("float({})", bytes)),
            PreciseType::Bool => Cow::Borrowed("bool"),
            PreciseType::Date => Cow::Borrowed("date"),
            PreciseType::Time(frac) => Cow::Owned(format!("time({})", frac)),
            PreciseType::Datetime(frac) => Cow::Owned(format!("datetime({})", frac)),
            PreciseType::Char(n, c) => Cow::Owned(format!("char({}, {:?})", n, c)),
            PreciseType::Varchar(n, c) => Cow::Owned(format!("varchar({}, {:?})", n, c)),
        }
    }

    /// Returns SQL type name reported by catalog tables.
    #[inline]
    pub fn sql_name(&self) -> &'static str {
        match self {
            PreciseType::Int(1, _) => "TINYINT",
            PreciseType::Int(2, _) => "SMALLINT",
            PreciseType::Int(3..=4, _) => "INTEGER",
            PreciseType::Int(..) => "BIGINT",
            PreciseType::Decimal(..) => "DECIMAL",
            PreciseType::Float(4) => "FLOAT",
            PreciseType::Float(_) => "DOUBLE",
            PreciseType::Bool => "BOOLEAN",
            PreciseType::Date => "DATE",
            PreciseType::Time(_) => "TIME",
            PreciseType::Datetime(_) => "DATETIME",
            PreciseType::Char(_, Collation::Binary) => "BINARY",
            PreciseType::Varchar(_, Collation::Binary) => "VARBINARY",
            PreciseType::Char(..) => "CHAR",
            PreciseType::Varchar(..) => "VARCHAR",
            PreciseType::Null => "NULL",
            PreciseType::Unknown => "UNKNOWN",
        }
    }
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum RuntimeType {
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Bool,
    String,
    Bytes,
    Date,
    Time,
    Datetime,
    Null,
    Unknown,
}

pub trait Typed {
    /// Returns precise type
    fn pty(&self) -> PreciseType;
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collation {
    Ascii,
    Utf8mb4,
    Binary,
}

#[dynamic]
pub static DEFAULT_DATE_FORMAT: Vec<FormatItem<'static>> =
    format_description::parse("[year]-[month]-[day]").unwrap();

#[dynamic]
pub static DEFAULT_TIME_FORMAT: Vec<FormatItem<'static>> =
    format_description::parse("[hour]:[minute]:[second]").unwrap();

#[dynamic]
pub static DEFAULT_DATETIME_FORMAT: Vec<FormatItem<'static>> =
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]").unwrap();
