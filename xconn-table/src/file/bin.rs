use crate::error::{Error, Result};
use std::num::TryFromIntError;
use xconn_catalog::ColumnDef;
use xconn_datatype::{Const, PreciseType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "little" | "<" => Some(Endian::Little),
            "b" | "big" | ">" => Some(Endian::Big),
            _ => None,
        }
    }
}

/// Native encoding of a binary field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinKind {
    Text(usize),
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl BinKind {
    #[inline]
    fn width(&self) -> usize {
        match self {
            BinKind::Text(n) => *n,
            BinKind::I8 => 1,
            BinKind::I16 => 2,
            BinKind::I32 | BinKind::F32 => 4,
            BinKind::I64 | BinKind::F64 => 8,
        }
    }

    /// Default encoding of a column without `field_format`.
    fn of_column(col: &ColumnDef) -> Self {
        match col.pty {
            PreciseType::Int(1, _) => BinKind::I8,
            PreciseType::Int(2, _) => BinKind::I16,
            PreciseType::Int(3 | 4, _) => BinKind::I32,
            PreciseType::Int(..) => BinKind::I64,
            PreciseType::Float(4) => BinKind::F32,
            PreciseType::Float(_) | PreciseType::Decimal(..) => BinKind::F64,
            _ => BinKind::Text(col.field_length()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BinField {
    pub offset: usize,
    pub kind: BinKind,
    pub endian: Endian,
}

/// Layout of fixed-length binary records.
#[derive(Debug, Clone)]
pub(crate) struct BinLayout {
    pub lrecl: usize,
    pub fields: Vec<Option<BinField>>,
}

impl BinLayout {
    pub fn build(columns: &[ColumnDef], lrecl: Option<usize>, endian: Endian) -> Result<Self> {
        let mut next = 0;
        let mut end = 0;
        let mut fields = Vec::with_capacity(columns.len());
        for c in columns {
            if c.special.is_some() {
                fields.push(None);
                continue;
            }
            let (kind, endian) = match &c.opts.field_format {
                Some(f) => parse_format(f.as_str(), c.field_length(), endian)?,
                None => (BinKind::of_column(c), endian),
            };
            let offset = c.opts.offset.unwrap_or(next);
            next = offset + kind.width();
            end = end.max(next);
            fields.push(Some(BinField {
                offset,
                kind,
                endian,
            }));
        }
        let lrecl = match lrecl {
            Some(n) if n < end => return Err(Error::invalid_option("lrecl", n.to_string())),
            Some(n) => n,
            None => end,
        };
        Ok(BinLayout { lrecl, fields })
    }

    /// Decodes value of one field.
    pub fn decode(&self, record: &[u8], field: BinField, col: &ColumnDef, rowid: u64) -> Result<Const> {
        let w = field.kind.width();
        let bytes = record
            .get(field.offset..field.offset + w)
            .ok_or_else(|| Error::RecordCorrupt(rowid, "record too short".to_string()))?;
        macro_rules! num {
            ($ty:ty, $n:literal) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                match field.endian {
                    Endian::Little => <$ty>::from_le_bytes(buf),
                    Endian::Big => <$ty>::from_be_bytes(buf),
                }
            }};
        }
        let v = match field.kind {
            BinKind::Text(_) => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                let text = String::from_utf8_lossy(&bytes[..end]);
                return Const::parse_as(text.trim_end(), col.pty, col.opts.date_format.as_ref())
                    .map_err(|e| Error::RecordCorrupt(rowid, e.to_string()));
            }
            BinKind::I8 => Const::I64(bytes[0] as i8 as i64),
            BinKind::I16 => Const::I64(num!(i16, 2) as i64),
            BinKind::I32 => Const::I64(num!(i32, 4) as i64),
            BinKind::I64 => Const::I64(num!(i64, 8)),
            BinKind::F32 => Const::new_f64(num!(f32, 4) as f64).unwrap_or(Const::Null),
            BinKind::F64 => Const::new_f64(num!(f64, 8)).unwrap_or(Const::Null),
        };
        v.cast_to(col.pty)
            .map_err(|e| Error::RecordCorrupt(rowid, e.to_string()))
    }

    pub fn encode(&self, columns: &[ColumnDef], row: &[Const], rowid: u64) -> Result<Vec<u8>> {
        let mut rec = vec![0u8; self.lrecl];
        for ((col, field), v) in columns.iter().zip(&self.fields).zip(row) {
            let field = match field {
                Some(f) => *f,
                None => continue,
            };
            let w = field.kind.width();
            let dst = &mut rec[field.offset..field.offset + w];
            macro_rules! put {
                ($v:expr) => {{
                    let v = $v;
                    match field.endian {
                        Endian::Little => dst.copy_from_slice(&v.to_le_bytes()),
                        Endian::Big => dst.copy_from_slice(&v.to_be_bytes()),
                    }
                }};
            }
            let corrupt = |msg: String| Error::RecordCorrupt(rowid, msg);
            match field.kind {
                BinKind::Text(n) => {
                    let text = v.to_text(col.opts.date_format.as_ref())?;
                    if text.len() > n {
                        return Err(corrupt(format!(
                            "value of column {} exceeds {} bytes",
                            col.name.as_str(),
                            n
                        )));
                    }
                    dst[..text.len()].copy_from_slice(text.as_bytes());
                }
                BinKind::F32 | BinKind::F64 => {
                    let f = if v.is_null() {
                        0.0
                    } else {
                        v.cast_to_f64()
                            .ok_or_else(|| corrupt(format!("{:?} is not a number", v)))?
                    };
                    if field.kind == BinKind::F32 {
                        put!(f as f32)
                    } else {
                        put!(f)
                    }
                }
                kind => {
                    let i = match v {
                        Const::Null => 0,
                        Const::U64(u) => i64::try_from(*u).map_err(|_| {
                            corrupt(format!("{} overflows field of column {}", u, col.name.as_str()))
                        })?,
                        other => other
                            .cast_to(PreciseType::i64())
                            .ok()
                            .and_then(|c| c.as_i64())
                            .ok_or_else(|| corrupt(format!("{:?} is not an integer", other)))?,
                    };
                    let overflow = |_: TryFromIntError| {
                        corrupt(format!("{} overflows field of column {}", i, col.name.as_str()))
                    };
                    match kind {
                        BinKind::I8 => dst[0] = i8::try_from(i).map_err(overflow)? as u8,
                        BinKind::I16 => put!(i16::try_from(i).map_err(overflow)?),
                        BinKind::I32 => put!(i32::try_from(i).map_err(overflow)?),
                        _ => put!(i),
                    }
                }
            }
        }
        Ok(rec)
    }
}

/// Parses `field_format`, an optional endian prefix followed by one
/// type letter.
fn parse_format(f: &str, text_len: usize, default: Endian) -> Result<(BinKind, Endian)> {
    let f = f.trim();
    let (endian, code) = match f.chars().next() {
        Some('<') => (Endian::Little, &f[1..]),
        Some('>') => (Endian::Big, &f[1..]),
        _ => (default, f),
    };
    let kind = match code.to_ascii_uppercase().as_str() {
        "C" => BinKind::Text(text_len),
        "T" => BinKind::I8,
        "S" => BinKind::I16,
        "L" | "I" => BinKind::I32,
        "G" => BinKind::I64,
        "F" => BinKind::F32,
        "D" => BinKind::F64,
        _ => return Err(Error::invalid_option("field_format", f)),
    };
    Ok((kind, endian))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semistr::SemiStr;

    fn column(name: &str, pty: PreciseType, fmt: &str) -> ColumnDef {
        let mut c = ColumnDef::new(name, 0, pty);
        c.opts.field_format = Some(SemiStr::new(fmt));
        c
    }

    #[test]
    fn test_bin_layout() {
        let mut name = column("name", PreciseType::var_utf8(5), "C");
        name.opts.field_length = Some(5);
        let cols = vec![
            column("id", PreciseType::i32(), ">L"),
            column("qty", PreciseType::i32(), "S"),
            name,
            column("price", PreciseType::f64(), "D"),
        ];
        let layout = BinLayout::build(&cols, None, Endian::Little).unwrap();
        assert_eq!(4 + 2 + 5 + 8, layout.lrecl);
        let row = [
            Const::I64(258),
            Const::I64(-2),
            Const::new_str("ab"),
            Const::new_f64(1.5).unwrap(),
        ];
        let rec = layout.encode(&cols, &row, 1).unwrap();
        assert_eq!(&[0, 0, 1, 2], &rec[..4]);
        assert_eq!(&[0xfe, 0xff], &rec[4..6]);
        for (i, c) in cols.iter().enumerate() {
            let f = layout.fields[i].unwrap();
            assert_eq!(row[i], layout.decode(&rec, f, c, 1).unwrap());
        }
        assert!(layout.decode(&rec[..10], layout.fields[3].unwrap(), &cols[3], 1).is_err());
    }

    #[test]
    fn test_encode_out_of_range() {
        let cols = vec![
            column("big", PreciseType::u64(), "G"),
            column("small", PreciseType::i32(), "S"),
        ];
        let layout = BinLayout::build(&cols, None, Endian::Little).unwrap();
        let rec = layout
            .encode(&cols, &[Const::U64(i64::MAX as u64), Const::I64(-7)], 1)
            .unwrap();
        assert_eq!(&i64::MAX.to_le_bytes(), &rec[..8]);
        assert!(matches!(
            layout.encode(&cols, &[Const::U64(u64::MAX), Const::I64(1)], 4),
            Err(Error::RecordCorrupt(4, _))
        ));
        assert!(matches!(
            layout.encode(&cols, &[Const::U64(1), Const::I64(70000)], 5),
            Err(Error::RecordCorrupt(5, _))
        ));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!((BinKind::I64, Endian::Little), parse_format("G", 0, Endian::Little).unwrap());
        assert_eq!((BinKind::F32, Endian::Big), parse_format(">f", 0, Endian::Little).unwrap());
        assert_eq!((BinKind::Text(3), Endian::Big), parse_format("C", 3, Endian::Big).unwrap());
        assert!(parse_format("Q", 0, Endian::Little).is_err());
    }
}
