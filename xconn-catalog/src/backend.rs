use std::fmt;

/// BackendType is the closed set of table types.
///
/// Every table declares one of them with the `type` option. Both
/// definition resolution and cursor construction match on this enum
/// exhaustively, so a new backend must be handled on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendType {
    /// Delimited text file.
    Csv,
    /// Fixed-length text records.
    Fix,
    /// Fixed-length binary records.
    Bin,
    /// Remote MySQL-compatible server.
    Mysql,
    /// Remote source behind a generic driver.
    Jdbc,
    /// Network adapters of the local host.
    Mac,
    /// Inventory classes of the local host.
    Wmi,
    /// Directory listing.
    Dir,
    /// Computed rows.
    Vir,
    /// Remote driver catalog: tables or columns.
    Catalog,
    /// Externally loaded module.
    Oem,
}

impl BackendType {
    pub const ALL: [BackendType; 11] = [
        BackendType::Csv,
        BackendType::Fix,
        BackendType::Bin,
        BackendType::Mysql,
        BackendType::Jdbc,
        BackendType::Mac,
        BackendType::Wmi,
        BackendType::Dir,
        BackendType::Vir,
        BackendType::Catalog,
        BackendType::Oem,
    ];

    /// Matches a type tag case-insensitively.
    #[inline]
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        BackendType::ALL
            .into_iter()
            .find(|b| b.tag().eq_ignore_ascii_case(tag))
    }

    #[inline]
    pub fn tag(&self) -> &'static str {
        match self {
            BackendType::Csv => "CSV",
            BackendType::Fix => "FIX",
            BackendType::Bin => "BIN",
            BackendType::Mysql => "MYSQL",
            BackendType::Jdbc => "JDBC",
            BackendType::Mac => "MAC",
            BackendType::Wmi => "WMI",
            BackendType::Dir => "DIR",
            BackendType::Vir => "VIR",
            BackendType::Catalog => "CATALOG",
            BackendType::Oem => "OEM",
        }
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        matches!(self, BackendType::Csv | BackendType::Fix | BackendType::Bin)
    }

    #[inline]
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendType::Mysql | BackendType::Jdbc)
    }

    /// Whether the backend supports keyed access at all.
    /// A table is indexable only if it also declares indexes.
    #[inline]
    pub fn supports_keys(&self) -> bool {
        self.is_file() || self.is_remote()
    }

    /// Whether the backend may accept insert, update and delete.
    /// Individual tables can still be read-only.
    #[inline]
    pub fn supports_write(&self) -> bool {
        self.is_file() || self.is_remote() || matches!(self, BackendType::Oem)
    }

    /// Whether a table may omit its columns and have them discovered
    /// or synthesized. Fixed-width layouts cannot be inferred.
    #[inline]
    pub fn discoverable(&self) -> bool {
        !matches!(self, BackendType::Fix | BackendType::Bin)
    }

    #[inline]
    pub fn record_format(&self) -> RecordFormat {
        match self {
            BackendType::Fix => RecordFormat::Fixed,
            BackendType::Bin => RecordFormat::Binary,
            _ => RecordFormat::Variable,
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Record layout of file tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordFormat {
    Variable,
    Fixed,
    Binary,
}

/// PseudoColumn is the fixed vocabulary of special columns.
/// Their values come from cursor state instead of stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PseudoColumn {
    /// 1-based row ordinal within the table.
    RowId,
    /// 1-based row ordinal within the current file.
    RowNum,
    /// Full path of the current file.
    FileId,
    /// Drive or root part of the path.
    FDisk,
    /// Directory part of the path.
    FPath,
    /// File name without extension.
    FName,
    /// Extension with leading dot.
    FType,
    /// Name of the current sub-table.
    TabId,
    /// Partition name.
    PartId,
    /// Name of the remote server.
    ServId,
}

impl PseudoColumn {
    pub const ALL: [PseudoColumn; 10] = [
        PseudoColumn::RowId,
        PseudoColumn::RowNum,
        PseudoColumn::FileId,
        PseudoColumn::FDisk,
        PseudoColumn::FPath,
        PseudoColumn::FName,
        PseudoColumn::FType,
        PseudoColumn::TabId,
        PseudoColumn::PartId,
        PseudoColumn::ServId,
    ];

    #[inline]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        PseudoColumn::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            PseudoColumn::RowId => "ROWID",
            PseudoColumn::RowNum => "ROWNUM",
            PseudoColumn::FileId => "FILEID",
            PseudoColumn::FDisk => "FDISK",
            PseudoColumn::FPath => "FPATH",
            PseudoColumn::FName => "FNAME",
            PseudoColumn::FType => "FTYPE",
            PseudoColumn::TabId => "TABID",
            PseudoColumn::PartId => "PARTID",
            PseudoColumn::ServId => "SERVID",
        }
    }

    /// Whether the value is derived from the current file path.
    #[inline]
    pub fn is_file_part(&self) -> bool {
        matches!(
            self,
            PseudoColumn::FileId
                | PseudoColumn::FDisk
                | PseudoColumn::FPath
                | PseudoColumn::FName
                | PseudoColumn::FType
        )
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, PseudoColumn::RowId | PseudoColumn::RowNum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_tag_any_casing() {
        for b in BackendType::ALL {
            let tag = b.tag();
            assert_eq!(Some(b), BackendType::from_tag(tag));
            assert_eq!(Some(b), BackendType::from_tag(&tag.to_ascii_lowercase()));
            let mixed: String = tag
                .chars()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { c.to_ascii_lowercase() } else { c })
                .collect();
            assert_eq!(Some(b), BackendType::from_tag(&mixed));
        }
        assert_eq!(None, BackendType::from_tag("XML"));
        assert_eq!(None, BackendType::from_tag(""));
    }

    #[test]
    fn test_pseudo_column_names() {
        assert_eq!(Some(PseudoColumn::RowId), PseudoColumn::from_name("rowid"));
        assert_eq!(Some(PseudoColumn::FName), PseudoColumn::from_name("FName"));
        assert_eq!(None, PseudoColumn::from_name("ROW_ID"));
        assert!(PseudoColumn::FType.is_file_part());
        assert!(!PseudoColumn::TabId.is_file_part());
    }

    #[test]
    fn test_discoverable() {
        assert!(BackendType::Csv.discoverable());
        assert!(BackendType::Jdbc.discoverable());
        assert!(BackendType::Vir.discoverable());
        assert!(!BackendType::Fix.discoverable());
        assert!(!BackendType::Bin.discoverable());
    }
}
