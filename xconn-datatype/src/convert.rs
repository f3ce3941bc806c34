//! Conversion between native values and their text representation.
//!
//! File backends store every value as text, remote drivers hand back
//! text or loosely typed values, and both must land in the declared
//! column type.
use crate::error::{Error, Result};
use crate::{format_description, Collation, OwnedFormatItem, PreciseType};
use crate::{Const, ValidF64};
use crate::{Date, Datetime, Time};
use crate::{DEFAULT_DATETIME_FORMAT, DEFAULT_DATE_FORMAT, DEFAULT_TIME_FORMAT};
use std::fmt;
use std::sync::Arc;

/// A user supplied date format of a column.
///
/// Both the bracketed component syntax of the `time` crate
/// ("[year]-[month]-[day]") and the short pattern syntax used in table
/// options ("YYYY-MM-DD hh:mm:ss") are accepted.
#[derive(Clone)]
pub struct DateFormat {
    src: String,
    items: OwnedFormatItem,
    has_date: bool,
    has_time: bool,
}

impl DateFormat {
    pub fn new(src: &str) -> Result<Self> {
        let desc = if src.contains('[') {
            src.to_string()
        } else {
            translate_pattern(src)
        };
        let items = format_description::parse_owned::<1>(&desc)
            .map_err(|_| Error::InvalidDateFormat(src.to_string()))?;
        let has_date = desc.contains("[year") || desc.contains("[day");
        let has_time = desc.contains("[hour");
        if !has_date && !has_time {
            return Err(Error::InvalidDateFormat(src.to_string()));
        }
        Ok(DateFormat {
            src: src.to_string(),
            items,
            has_date,
            has_time,
        })
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.src
    }
}

impl PartialEq for DateFormat {
    fn eq(&self, other: &Self) -> bool {
        self.src == other.src
    }
}

impl Eq for DateFormat {}

impl fmt::Debug for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DateFormat").field(&self.src).finish()
    }
}

/// Translates short pattern to component syntax.
/// Unrecognized characters are kept as literals.
fn translate_pattern(src: &str) -> String {
    const TOKENS: [(&str, &str); 7] = [
        ("YYYY", "[year]"),
        ("MMM", "[month repr:short]"),
        ("MM", "[month]"),
        ("DD", "[day]"),
        ("hh", "[hour]"),
        ("mm", "[minute]"),
        ("ss", "[second]"),
    ];
    let mut res = String::with_capacity(src.len() * 2);
    let mut rest = src;
    'outer: while !rest.is_empty() {
        for (tk, desc) in TOKENS {
            if let Some(r) = rest.strip_prefix(tk) {
                res.push_str(desc);
                rest = r;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '[' {
                res.push_str("[[");
            } else {
                res.push(c);
            }
        }
        rest = chars.as_str();
    }
    res
}

impl Const {
    /// Parses text into a value of given type.
    ///
    /// Empty text becomes null for every non-character type.
    pub fn parse_as(text: &str, pty: PreciseType, fmt: Option<&DateFormat>) -> Result<Const> {
        match pty {
            PreciseType::Char(_, Collation::Binary) | PreciseType::Varchar(_, Collation::Binary) => {
                return Ok(Const::Bytes(Arc::from(text.as_bytes())))
            }
            PreciseType::Char(..) | PreciseType::Varchar(..) | PreciseType::Unknown => {
                return Ok(Const::String(Arc::from(text)))
            }
            _ => (),
        }
        let text = text.trim();
        if text.is_empty() {
            return Ok(Const::Null);
        }
        let res = match pty {
            PreciseType::Null => Const::Null,
            PreciseType::Int(bytes, true) => {
                let v: u64 = text.parse()?;
                check_unsigned(v, bytes)?;
                Const::U64(v)
            }
            PreciseType::Int(bytes, false) => {
                let v: i64 = text.parse()?;
                check_signed(v, bytes)?;
                Const::I64(v)
            }
            PreciseType::Decimal(..) | PreciseType::Float(_) => {
                let v: f64 = text.parse()?;
                Const::F64(ValidF64::new(v).ok_or(Error::ValueOutOfRange)?)
            }
            PreciseType::Bool => match text.to_ascii_lowercase().as_str() {
                "1" | "t" | "true" | "y" | "yes" => Const::Bool(true),
                "0" | "f" | "false" | "n" | "no" => Const::Bool(false),
                _ => return Err(Error::InvalidFormat(text.to_string())),
            },
            PreciseType::Date => Const::Date(parse_date(text, fmt)?),
            PreciseType::Time(_) => Const::Time(parse_time(text, fmt)?),
            PreciseType::Datetime(_) => Const::Datetime(parse_datetime(text, fmt)?),
            PreciseType::Char(..) | PreciseType::Varchar(..) | PreciseType::Unknown => {
                Const::String(Arc::from(text))
            }
        };
        Ok(res)
    }

    /// Renders the value as text, using the date format if given.
    /// Null renders as empty text.
    pub fn to_text(&self, fmt: Option<&DateFormat>) -> Result<String> {
        let res = match self {
            Const::Null => String::new(),
            Const::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Const::I64(v) => v.to_string(),
            Const::U64(v) => v.to_string(),
            Const::F64(v) => v.value().to_string(),
            Const::String(s) => s.to_string(),
            Const::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Const::Date(d) => match fmt {
                Some(f) => d.format(&f.items).map_err(|_| invalid_fmt(f))?,
                None => d
                    .format(&DEFAULT_DATE_FORMAT[..])
                    .map_err(|e| Error::InvalidFormat(e.to_string()))?,
            },
            Const::Time(t) => match fmt {
                Some(f) => t.format(&f.items).map_err(|_| invalid_fmt(f))?,
                None => {
                    let mut s = t
                        .format(&DEFAULT_TIME_FORMAT[..])
                        .map_err(|e| Error::InvalidFormat(e.to_string()))?;
                    push_micros(&mut s, t.microsecond());
                    s
                }
            },
            Const::Datetime(dt) => match fmt {
                Some(f) if f.has_time => dt.format(&f.items).map_err(|_| invalid_fmt(f))?,
                Some(f) => dt.date().format(&f.items).map_err(|_| invalid_fmt(f))?,
                None => {
                    let mut s = dt
                        .format(&DEFAULT_DATETIME_FORMAT[..])
                        .map_err(|e| Error::InvalidFormat(e.to_string()))?;
                    push_micros(&mut s, dt.microsecond());
                    s
                }
            },
        };
        Ok(res)
    }

    /// Casts the value to given type, following MySQL's loose
    /// conversion rules for numbers and text.
    pub fn cast_to(&self, pty: PreciseType) -> Result<Const> {
        if self.is_null() {
            return Ok(Const::Null);
        }
        let res = match pty {
            PreciseType::Null => Const::Null,
            PreciseType::Unknown => self.clone(),
            PreciseType::Int(bytes, unsigned) => {
                let v: i128 = match self {
                    Const::I64(v) => *v as i128,
                    Const::U64(v) => *v as i128,
                    Const::Bool(b) => *b as i128,
                    Const::F64(v) => v.value().round() as i128,
                    Const::String(s) => return Const::parse_as(s, pty, None),
                    _ => return Err(self.cast_err(pty)),
                };
                if unsigned {
                    let v = u64::try_from(v).map_err(|_| Error::ValueOutOfRange)?;
                    check_unsigned(v, bytes)?;
                    Const::U64(v)
                } else {
                    let v = i64::try_from(v).map_err(|_| Error::ValueOutOfRange)?;
                    check_signed(v, bytes)?;
                    Const::I64(v)
                }
            }
            PreciseType::Decimal(..) | PreciseType::Float(_) => match self {
                Const::String(s) => return Const::parse_as(s, pty, None),
                _ => {
                    let v = self.cast_to_f64().ok_or_else(|| self.cast_err(pty))?;
                    Const::F64(ValidF64::new(v).ok_or(Error::ValueOutOfRange)?)
                }
            },
            PreciseType::Bool => match self {
                Const::String(s) => return Const::parse_as(s, pty, None),
                _ => {
                    let v = self.cast_to_f64().ok_or_else(|| self.cast_err(pty))?;
                    Const::Bool(v != 0.0)
                }
            },
            PreciseType::Char(_, Collation::Binary) | PreciseType::Varchar(_, Collation::Binary) => {
                match self {
                    Const::Bytes(_) => self.clone(),
                    _ => Const::Bytes(Arc::from(self.to_text(None)?.as_bytes())),
                }
            }
            PreciseType::Char(..) | PreciseType::Varchar(..) => match self {
                Const::String(_) => self.clone(),
                _ => Const::String(Arc::from(self.to_text(None)?)),
            },
            PreciseType::Date => match self {
                Const::Date(_) => self.clone(),
                Const::Datetime(dt) => Const::Date(dt.date()),
                Const::String(s) => Const::Date(parse_date(s.trim(), None)?),
                _ => return Err(self.cast_err(pty)),
            },
            PreciseType::Time(_) => match self {
                Const::Time(_) => self.clone(),
                Const::Datetime(dt) => Const::Time(dt.time()),
                Const::String(s) => Const::Time(parse_time(s.trim(), None)?),
                _ => return Err(self.cast_err(pty)),
            },
            PreciseType::Datetime(_) => match self {
                Const::Datetime(_) => self.clone(),
                Const::Date(d) => Const::Datetime(d.midnight()),
                Const::String(s) => Const::Datetime(parse_datetime(s.trim(), None)?),
                _ => return Err(self.cast_err(pty)),
            },
        };
        Ok(res)
    }

    #[inline]
    fn cast_err(&self, pty: PreciseType) -> Error {
        Error::InvalidCast(format!("{:?}", self.runtime_ty()), pty.to_lower().into_owned())
    }
}

#[inline]
fn invalid_fmt(f: &DateFormat) -> Error {
    Error::InvalidDateFormat(f.src.clone())
}

#[inline]
fn check_signed(v: i64, bytes: u8) -> Result<()> {
    if bytes >= 8 {
        return Ok(());
    }
    let bound = 1i64 << (bytes as u32 * 8 - 1);
    if v < -bound || v >= bound {
        return Err(Error::ValueOutOfRange);
    }
    Ok(())
}

#[inline]
fn check_unsigned(v: u64, bytes: u8) -> Result<()> {
    if bytes >= 8 {
        return Ok(());
    }
    if v >= 1u64 << (bytes as u32 * 8) {
        return Err(Error::ValueOutOfRange);
    }
    Ok(())
}

fn push_micros(s: &mut String, micros: u32) {
    if micros == 0 {
        return;
    }
    if micros % 1000 == 0 {
        s.push_str(&format!(".{:03}", micros / 1000));
    } else {
        s.push_str(&format!(".{:06}", micros));
    }
}

/// Splits optional fractional seconds from the text.
fn split_micros(text: &str) -> Result<(&str, u32)> {
    match text.rsplit_once('.') {
        Some((base, frac)) if !frac.is_empty() && frac.bytes().all(|b| b.is_ascii_digit()) => {
            if frac.len() > 6 {
                return Err(Error::InvalidFormat(text.to_string()));
            }
            let mut micros: u32 = frac.parse()?;
            for _ in frac.len()..6 {
                micros *= 10;
            }
            Ok((base, micros))
        }
        _ => Ok((text, 0)),
    }
}

fn parse_date(text: &str, fmt: Option<&DateFormat>) -> Result<Date> {
    match fmt {
        Some(f) => Date::parse(text, &f.items).map_err(|_| Error::InvalidFormat(text.to_string())),
        None => {
            // datetime text is accepted and truncated
            let text = text.split_once(' ').map(|(d, _)| d).unwrap_or(text);
            Date::parse(text, &DEFAULT_DATE_FORMAT[..])
                .map_err(|_| Error::InvalidFormat(text.to_string()))
        }
    }
}

fn parse_time(text: &str, fmt: Option<&DateFormat>) -> Result<Time> {
    match fmt {
        Some(f) if f.has_time => {
            Time::parse(text, &f.items).map_err(|_| Error::InvalidFormat(text.to_string()))
        }
        Some(f) => Err(invalid_fmt(f)),
        None => {
            let (base, micros) = split_micros(text)?;
            let tm = Time::parse(base, &DEFAULT_TIME_FORMAT[..])
                .map_err(|_| Error::InvalidFormat(text.to_string()))?;
            Time::from_hms_micro(tm.hour(), tm.minute(), tm.second(), micros)
                .map_err(|_| Error::ValueOutOfRange)
        }
    }
}

fn parse_datetime(text: &str, fmt: Option<&DateFormat>) -> Result<Datetime> {
    match fmt {
        Some(f) if f.has_time && f.has_date => {
            Datetime::parse(text, &f.items).map_err(|_| Error::InvalidFormat(text.to_string()))
        }
        Some(f) if f.has_date => Ok(parse_date(text, fmt)?.midnight()),
        Some(f) => Err(invalid_fmt(f)),
        None => {
            if !text.contains(' ') {
                return Ok(parse_date(text, None)?.midnight());
            }
            let (base, micros) = split_micros(text)?;
            let dt = Datetime::parse(base, &DEFAULT_DATETIME_FORMAT[..])
                .map_err(|_| Error::InvalidFormat(text.to_string()))?;
            let tm = Time::from_hms_micro(dt.hour(), dt.minute(), dt.second(), micros)
                .map_err(|_| Error::ValueOutOfRange)?;
            Ok(Datetime::new(dt.date(), tm))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbers() {
        assert_eq!(Const::I64(-42), Const::parse_as(" -42 ", PreciseType::i32(), None).unwrap());
        assert_eq!(Const::U64(7), Const::parse_as("7", PreciseType::u32(), None).unwrap());
        assert!(Const::parse_as("300", PreciseType::int(1, true), None).is_err());
        assert!(Const::parse_as("-129", PreciseType::int(1, false), None).is_err());
        assert!(Const::parse_as("abc", PreciseType::i64(), None).is_err());
        assert_eq!(
            Const::new_f64(1.25).unwrap(),
            Const::parse_as("1.25", PreciseType::decimal(6, 2), None).unwrap()
        );
    }

    #[test]
    fn test_parse_empty_is_null() {
        assert_eq!(Const::Null, Const::parse_as("", PreciseType::i64(), None).unwrap());
        assert_eq!(Const::Null, Const::parse_as("  ", PreciseType::date(), None).unwrap());
        assert_eq!(
            Const::new_str(""),
            Const::parse_as("", PreciseType::var_utf8(10), None).unwrap()
        );
    }

    #[test]
    fn test_parse_dates() {
        let d = Const::parse_as("2021-12-31", PreciseType::date(), None).unwrap();
        assert_eq!("2021-12-31", d.to_text(None).unwrap());
        let dt = Const::parse_as("2021-12-31 10:20:30.5", PreciseType::datetime(3), None).unwrap();
        assert_eq!("2021-12-31 10:20:30.500", dt.to_text(None).unwrap());
        let dt = Const::parse_as("2021-12-31", PreciseType::datetime(0), None).unwrap();
        assert_eq!("2021-12-31 00:00:00", dt.to_text(None).unwrap());
        let tm = Const::parse_as("23:59:01", PreciseType::time(0), None).unwrap();
        assert_eq!("23:59:01", tm.to_text(None).unwrap());
    }

    #[test]
    fn test_date_format() {
        let f = DateFormat::new("DD/MM/YYYY").unwrap();
        let d = Const::parse_as("03/04/2020", PreciseType::date(), Some(&f)).unwrap();
        assert_eq!(Const::parse_as("2020-04-03", PreciseType::date(), None).unwrap(), d);
        assert_eq!("03/04/2020", d.to_text(Some(&f)).unwrap());
        let f = DateFormat::new("[year][month][day] [hour][minute][second]").unwrap();
        let dt = Const::parse_as("20200403 101112", PreciseType::datetime(0), Some(&f)).unwrap();
        assert_eq!("2020-04-03 10:11:12", dt.to_text(None).unwrap());
        assert!(DateFormat::new("xyz").is_err());
        assert!(DateFormat::new("[bogus]").is_err());
    }

    #[test]
    fn test_cast() {
        assert_eq!(Const::I64(3), Const::new_f64(2.6).unwrap().cast_to(PreciseType::i64()).unwrap());
        assert_eq!(
            Const::new_str("12"),
            Const::U64(12).cast_to(PreciseType::var_utf8(20)).unwrap()
        );
        assert!(Const::I64(-1).cast_to(PreciseType::u64()).is_err());
        assert_eq!(Const::Null, Const::Null.cast_to(PreciseType::date()).unwrap());
        assert!(Const::Bool(true).cast_to(PreciseType::date()).is_err());
    }
}
