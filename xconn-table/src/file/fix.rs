use crate::error::{Error, Result};
use xconn_catalog::ColumnDef;
use xconn_datatype::Const;

/// Placement of one field inside a fixed-length record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldSpan {
    pub offset: usize,
    pub len: usize,
}

/// Layout of fixed-length text records.
#[derive(Debug, Clone)]
pub(crate) struct FixLayout {
    pub lrecl: usize,
    /// Span of every column, None for pseudo-columns.
    pub spans: Vec<Option<FieldSpan>>,
}

impl FixLayout {
    /// Lays out columns. Offsets default to the end of the previous
    /// field and record length to the end of the last field.
    pub fn build(columns: &[ColumnDef], lrecl: Option<usize>) -> Result<Self> {
        let mut next = 0;
        let mut end = 0;
        let spans: Vec<_> = columns
            .iter()
            .map(|c| {
                if c.special.is_some() {
                    return None;
                }
                let offset = c.opts.offset.unwrap_or(next);
                let len = c.field_length();
                next = offset + len;
                end = end.max(next);
                Some(FieldSpan { offset, len })
            })
            .collect();
        let lrecl = match lrecl {
            Some(n) if n < end => {
                return Err(Error::invalid_option("lrecl", n.to_string()));
            }
            Some(n) => n,
            None => end,
        };
        Ok(FixLayout { lrecl, spans })
    }

    /// Reads text of the field. Short records yield empty text.
    #[inline]
    pub fn field<'a>(&self, record: &'a [u8], span: FieldSpan) -> &'a [u8] {
        if span.offset >= record.len() {
            return &[];
        }
        let end = (span.offset + span.len).min(record.len());
        &record[span.offset..end]
    }

    /// Encodes a row as one record without line terminator.
    /// Text is left-aligned and numbers right-aligned.
    pub fn encode(&self, columns: &[ColumnDef], row: &[Const], rowid: u64) -> Result<Vec<u8>> {
        let mut rec = vec![b' '; self.lrecl];
        for ((col, span), v) in columns.iter().zip(&self.spans).zip(row) {
            let span = match span {
                Some(s) => *s,
                None => continue,
            };
            let text = v.to_text(col.opts.date_format.as_ref())?;
            let bytes = text.as_bytes();
            if bytes.len() > span.len {
                return Err(Error::RecordCorrupt(
                    rowid,
                    format!("value of column {} exceeds {} bytes", col.name.as_str(), span.len),
                ));
            }
            let start = if col.pty.is_numeric() {
                span.offset + span.len - bytes.len()
            } else {
                span.offset
            };
            rec[start..start + bytes.len()].copy_from_slice(bytes);
        }
        Ok(rec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xconn_datatype::PreciseType;

    fn columns() -> Vec<ColumnDef> {
        let mut id = ColumnDef::new("id", 0, PreciseType::i32());
        id.opts.field_length = Some(4);
        let mut name = ColumnDef::new("name", 1, PreciseType::var_utf8(6));
        name.opts.field_length = Some(6);
        vec![id, name]
    }

    #[test]
    fn test_fix_layout() {
        let cols = columns();
        let layout = FixLayout::build(&cols, None).unwrap();
        assert_eq!(10, layout.lrecl);
        assert_eq!(Some(FieldSpan { offset: 4, len: 6 }), layout.spans[1]);
        assert!(FixLayout::build(&cols, Some(8)).is_err());
        let rec = layout
            .encode(&cols, &[Const::I64(42), Const::new_str("ann")], 1)
            .unwrap();
        assert_eq!(b"  42ann   ".to_vec(), rec);
        assert_eq!(b"ann   ", layout.field(&rec, FieldSpan { offset: 4, len: 6 }));
        assert_eq!(b"an", layout.field(b"  42an", FieldSpan { offset: 4, len: 6 }));
        assert!(layout
            .encode(&cols, &[Const::I64(1), Const::new_str("toolongname")], 3)
            .is_err());
    }
}
