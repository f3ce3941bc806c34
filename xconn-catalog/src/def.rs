use crate::error::{Error, Result};
use crate::{Column, ColumnAttr, OptionBag, PseudoColumn};
use semistr::SemiStr;
use xconn_datatype::{DateFormat, PreciseType};

/// ColumnDef is the immutable definition of one column of a table.
///
/// It is built once from catalog metadata or from discovery and owned
/// by the table definition. Runtime accessors refer to it by index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: SemiStr,
    pub idx: u32,
    pub pty: PreciseType,
    /// Declared length: characters of text types, precision of
    /// decimals, display width of other types.
    pub length: u16,
    /// Fraction digits of decimals and temporal types.
    pub scale: u8,
    pub attr: ColumnAttr,
    pub special: Option<PseudoColumn>,
    pub opts: ColumnOptions,
}

/// Typed view of the column option string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOptions {
    /// `offset` or `flag`. Byte offset of fixed records, field number
    /// of delimited records, attribute selector of listings.
    pub offset: Option<usize>,
    pub field_length: Option<usize>,
    pub date_format: Option<DateFormat>,
    pub field_format: Option<SemiStr>,
    pub raw: OptionBag,
}

impl ColumnOptions {
    pub fn parse(raw: &OptionBag) -> Result<Self> {
        let offset = match raw.get_any(&["offset", "flag"]) {
            Some(v) => Some(
                v.trim()
                    .parse()
                    .map_err(|_| Error::InvalidOption("offset".to_string(), v.to_string()))?,
            ),
            None => None,
        };
        let field_length = raw.get_num("field_length")?;
        let date_format = match raw.get("date_format") {
            Some(f) => Some(
                DateFormat::new(f)
                    .map_err(|_| Error::InvalidOption("date_format".to_string(), f.to_string()))?,
            ),
            None => None,
        };
        let field_format = raw.get("field_format").map(SemiStr::new);
        Ok(ColumnOptions {
            offset,
            field_length,
            date_format,
            field_format,
            raw: raw.clone(),
        })
    }
}

impl ColumnDef {
    /// Creates a plain nullable column, used by discovery and by
    /// backends that synthesize their columns.
    #[inline]
    pub fn new(name: &str, idx: u32, pty: PreciseType) -> Self {
        let (length, scale) = length_and_scale(pty);
        ColumnDef {
            name: SemiStr::new(name),
            idx,
            pty,
            length,
            scale,
            attr: ColumnAttr::empty(),
            special: None,
            opts: ColumnOptions::default(),
        }
    }

    /// Creates a pseudo-column definition.
    #[inline]
    pub fn pseudo(special: PseudoColumn, idx: u32) -> Self {
        let pty = if special.is_numeric() {
            PreciseType::i64()
        } else {
            PreciseType::var_utf8(256)
        };
        let mut cd = ColumnDef::new(special.name(), idx, pty);
        cd.special = Some(special);
        cd.attr = ColumnAttr::NOT_NULL;
        cd
    }

    /// Builds definition from catalog column. The `special` option
    /// turns the column into a pseudo-column.
    pub fn from_column(col: &Column) -> Result<Self> {
        let opts = ColumnOptions::parse(&col.options)?;
        let special = match col.options.get("special") {
            Some(name) => Some(
                PseudoColumn::from_name(name)
                    .ok_or_else(|| Error::UnknownPseudoColumn(name.to_string()))?,
            ),
            None => None,
        };
        let (length, scale) = length_and_scale(col.pty);
        Ok(ColumnDef {
            name: col.name.clone(),
            idx: col.idx,
            pty: col.pty,
            length,
            scale,
            attr: col.attr,
            special,
            opts,
        })
    }

    #[inline]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.opts.offset = Some(offset);
        self
    }

    #[inline]
    pub fn nullable(&self) -> bool {
        !self.attr.intersects(ColumnAttr::NOT_NULL | ColumnAttr::PK)
    }

    #[inline]
    pub fn unsigned(&self) -> bool {
        matches!(self.pty, PreciseType::Int(_, true))
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        self.special.is_some()
    }

    #[inline]
    pub fn name_eq(&self, name: &str) -> bool {
        self.name.as_str().eq_ignore_ascii_case(name)
    }

    /// Width of the field in fixed layouts.
    #[inline]
    pub fn field_length(&self) -> usize {
        self.opts
            .field_length
            .unwrap_or_else(|| self.pty.display_len())
    }
}

#[inline]
fn length_and_scale(pty: PreciseType) -> (u16, u8) {
    match pty {
        PreciseType::Decimal(prec, frac) => (prec as u16, frac),
        PreciseType::Time(frac) | PreciseType::Datetime(frac) => (pty.display_len() as u16, frac),
        PreciseType::Char(n, _) | PreciseType::Varchar(n, _) => (n, 0),
        _ => (pty.display_len() as u16, 0),
    }
}

/// Definition of an index: ordered key parts referring to columns
/// by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: SemiStr,
    pub unique: bool,
    pub parts: Vec<SemiStr>,
}

impl IndexDef {
    #[inline]
    pub fn new(name: &str, unique: bool, parts: &[&str]) -> Self {
        IndexDef {
            name: SemiStr::new(name),
            unique,
            parts: parts.iter().map(|p| SemiStr::new(p)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnID, TableID};

    fn column(name: &str, pty: PreciseType, options: OptionBag) -> Column {
        Column {
            id: ColumnID::new(1),
            table_id: TableID::new(1),
            name: SemiStr::new(name),
            pty,
            idx: 0,
            attr: ColumnAttr::empty(),
            options,
        }
    }

    #[test]
    fn test_column_def_options() {
        let c = column(
            "d",
            PreciseType::date(),
            OptionBag::new()
                .with("FLAG", "3")
                .with("date_format", "DD/MM/YYYY")
                .with("field_length", "10"),
        );
        let cd = ColumnDef::from_column(&c).unwrap();
        assert_eq!(Some(3), cd.opts.offset);
        assert_eq!(10, cd.field_length());
        assert!(cd.opts.date_format.is_some());
        assert!(cd.nullable());
        assert!(!cd.is_special());
    }

    #[test]
    fn test_column_def_special() {
        let c = column(
            "r",
            PreciseType::i64(),
            OptionBag::new().with("special", "rowid"),
        );
        let cd = ColumnDef::from_column(&c).unwrap();
        assert_eq!(Some(PseudoColumn::RowId), cd.special);
        let c = column(
            "r",
            PreciseType::i64(),
            OptionBag::new().with("special", "nope"),
        );
        assert!(ColumnDef::from_column(&c).is_err());
        let c = column("r", PreciseType::i64(), OptionBag::new().with("offset", "x"));
        assert!(ColumnDef::from_column(&c).is_err());
    }

    #[test]
    fn test_length_and_scale() {
        let cd = ColumnDef::new("p", 0, PreciseType::decimal(10, 2));
        assert_eq!((10, 2), (cd.length, cd.scale));
        let cd = ColumnDef::new("s", 0, PreciseType::var_utf8(40));
        assert_eq!((40, 0), (cd.length, cd.scale));
        assert!(ColumnDef::new("u", 0, PreciseType::u32()).unsigned());
    }
}
