use crate::error::{Error, Result};
use xconn_catalog::{ColumnDef, OptionBag};
use xconn_datatype::{Const, PreciseType};

/// Delimited text layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    pub sep: char,
    pub quote: Option<char>,
    /// Quoting level used when writing, 0 to 3.
    pub quoted: u8,
    /// First line holds column names.
    pub header: bool,
}

impl Default for CsvFormat {
    fn default() -> Self {
        CsvFormat {
            sep: ',',
            quote: Some('"'),
            quoted: 0,
            header: false,
        }
    }
}

impl CsvFormat {
    pub fn parse(options: &OptionBag) -> Result<Self> {
        let sep = options.get_char("separator")?.unwrap_or(',');
        let quote = match options.get("quote_char") {
            Some("") => None,
            Some(_) => options.get_char("quote_char")?,
            None => Some('"'),
        };
        let quoted: u8 = options.num_or("quoted", 0)?;
        if quoted > 3 {
            return Err(Error::invalid_option("quoted", quoted.to_string()));
        }
        if Some(sep) == quote {
            return Err(Error::invalid_option("quote_char", sep.to_string()));
        }
        let header = options.bool_or("header", false)?;
        Ok(CsvFormat {
            sep,
            quote,
            quoted,
            header,
        })
    }

    /// Splits a line into fields. Returns None if a quoted field is
    /// not terminated.
    pub fn split(&self, line: &str) -> Option<Vec<String>> {
        let mut fields = vec![];
        let mut chars = line.chars().peekable();
        loop {
            let mut field = String::new();
            if self.quote.is_some() && chars.peek().copied() == self.quote {
                let q = chars.next()?;
                loop {
                    match chars.next() {
                        None => return None,
                        Some('\\') if chars.peek() == Some(&q) => {
                            chars.next();
                            field.push(q);
                        }
                        Some(c) if c == q => {
                            if chars.peek() == Some(&q) {
                                chars.next();
                                field.push(q);
                            } else {
                                break;
                            }
                        }
                        Some(c) => field.push(c),
                    }
                }
                // text between closing quote and separator is kept
                while let Some(c) = chars.peek().copied() {
                    if c == self.sep {
                        break;
                    }
                    field.push(c);
                    chars.next();
                }
            } else {
                while let Some(c) = chars.peek().copied() {
                    if c == self.sep {
                        break;
                    }
                    field.push(c);
                    chars.next();
                }
            }
            fields.push(field);
            match chars.next() {
                Some(_) => continue,
                None => return Some(fields),
            }
        }
    }

    /// Joins field texts into one line. `textual` tells which fields
    /// hold character data.
    pub fn join(&self, fields: &[(String, bool)]) -> Result<String> {
        let mut line = String::new();
        for (i, (text, textual)) in fields.iter().enumerate() {
            if i > 0 {
                line.push(self.sep);
            }
            let needed = text.contains(self.sep)
                || text.contains('\n')
                || text.contains('\r')
                || self.quote.map(|q| text.contains(q)).unwrap_or_default();
            let wanted = match self.quoted {
                0 => needed,
                1 => needed || (*textual && !text.is_empty()),
                2 => needed || !text.is_empty(),
                _ => true,
            };
            match self.quote {
                Some(q) if wanted => {
                    line.push(q);
                    for c in text.chars() {
                        if c == q {
                            line.push(q);
                        }
                        line.push(c);
                    }
                    line.push(q);
                }
                None if needed => {
                    return Err(Error::RecordCorrupt(
                        0,
                        format!("field '{}' contains separator but no quote is set", text),
                    ))
                }
                _ => line.push_str(text),
            }
        }
        Ok(line)
    }
}

/// Infers column types from sample rows.
/// Each column widens from integer to float to date to text.
pub(crate) fn infer_columns(names: &[String], rows: &[Vec<String>]) -> Vec<ColumnDef> {
    names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let mut kind = Inferred::Empty;
            let mut max_len = 1usize;
            for row in rows {
                let text = match row.get(i) {
                    Some(t) => t.trim(),
                    None => continue,
                };
                if text.is_empty() {
                    continue;
                }
                max_len = max_len.max(text.chars().count());
                kind = kind.widen(text);
            }
            let pty = match kind {
                Inferred::Int => PreciseType::i64(),
                Inferred::Float => PreciseType::f64(),
                Inferred::Date => PreciseType::date(),
                Inferred::Empty | Inferred::Text => {
                    PreciseType::var_utf8(max_len.min(u16::MAX as usize) as u16)
                }
            };
            ColumnDef::new(name.trim(), i as u32, pty).with_offset(i + 1)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Inferred {
    Empty,
    Int,
    Float,
    Date,
    Text,
}

impl Inferred {
    fn widen(self, text: &str) -> Self {
        let fits = |k: Inferred| match k {
            Inferred::Int => text.parse::<i64>().is_ok(),
            Inferred::Float => text.parse::<f64>().is_ok(),
            Inferred::Date => Const::parse_as(text, PreciseType::date(), None).is_ok(),
            _ => true,
        };
        [Inferred::Int, Inferred::Float, Inferred::Date, Inferred::Text]
            .into_iter()
            .filter(|k| *k >= self)
            .find(|k| fits(*k))
            .unwrap_or(Inferred::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_split() {
        let f = CsvFormat::default();
        assert_eq!(Some(vec!["a".to_string(), "".to_string(), "c".to_string()]), f.split("a,,c"));
        assert_eq!(
            Some(vec!["x,y".to_string(), "say \"hi\"".to_string()]),
            f.split("\"x,y\",\"say \"\"hi\\\"\"")
        );
        assert_eq!(None, f.split("\"open,b"));
        assert_eq!(Some(vec!["".to_string()]), f.split(""));
        let tab = CsvFormat {
            sep: '\t',
            quote: None,
            ..Default::default()
        };
        assert_eq!(Some(vec!["\"a".to_string(), "b".to_string()]), tab.split("\"a\tb"));
    }

    #[test]
    fn test_csv_join_quoting() {
        let fields = vec![
            ("1".to_string(), false),
            ("ann".to_string(), true),
            ("".to_string(), true),
            ("a,b".to_string(), true),
        ];
        let mut f = CsvFormat::default();
        assert_eq!("1,ann,,\"a,b\"", f.join(&fields).unwrap());
        f.quoted = 1;
        assert_eq!("1,\"ann\",,\"a,b\"", f.join(&fields).unwrap());
        f.quoted = 2;
        assert_eq!("\"1\",\"ann\",,\"a,b\"", f.join(&fields).unwrap());
        f.quoted = 3;
        assert_eq!("\"1\",\"ann\",\"\",\"a,b\"", f.join(&fields).unwrap());
        f.quoted = 0;
        assert_eq!("\"say \"\"hi\"\"\"", f.join(&[("say \"hi\"".to_string(), true)]).unwrap());
    }

    #[test]
    fn test_infer_columns() {
        let names = vec!["id".to_string(), "price".to_string(), "born".to_string(), "name".to_string()];
        let rows = vec![
            vec!["1".to_string(), "2".to_string(), "2020-01-02".to_string(), "ann".to_string()],
            vec!["2".to_string(), "2.5".to_string(), "".to_string(), "bobby".to_string()],
        ];
        let cols = infer_columns(&names, &rows);
        assert_eq!(PreciseType::i64(), cols[0].pty);
        assert_eq!(PreciseType::f64(), cols[1].pty);
        assert_eq!(PreciseType::date(), cols[2].pty);
        assert_eq!(PreciseType::var_utf8(5), cols[3].pty);
        assert_eq!(Some(4), cols[3].opts.offset);
    }
}
