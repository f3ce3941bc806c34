//! Inventory tables of the local host: network interfaces, processes,
//! system summary and disks.
use crate::access::{Access, OpenArgs, RowInfo};
use crate::cursor::{Cardinality, Position, QueryContext, ReadStatus};
use crate::def::{AccessDef, TableDef};
use crate::error::{Error, Result};
use crate::rowset::{map_columns, synthesize, RowSet};
use std::sync::Arc;
use sysinfo::{Disks, Networks, System};
use xconn_catalog::{BackendType, ColumnDef, OptionBag};
use xconn_datatype::{Const, PreciseType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsKind {
    /// Network interfaces.
    Mac,
    Process,
    System,
    Disk,
}

impl OsKind {
    pub fn parse(backend: BackendType, options: &OptionBag) -> Result<Self> {
        match backend {
            BackendType::Mac => Ok(OsKind::Mac),
            BackendType::Wmi => {
                let class = options.get("class").unwrap_or("system");
                match class.trim().to_ascii_lowercase().as_str() {
                    "process" | "win32_process" => Ok(OsKind::Process),
                    "system" | "computersystem" | "win32_computersystem" => Ok(OsKind::System),
                    "disk" | "logicaldisk" | "win32_logicaldisk" => Ok(OsKind::Disk),
                    _ => Err(Error::invalid_option("class", class)),
                }
            }
            other => Err(Error::InvalidState(format!("{} is not an inventory type", other))),
        }
    }

    fn attrs(&self) -> &'static [(&'static str, PreciseType)] {
        const TEXT: PreciseType = PreciseType::Varchar(255, xconn_datatype::Collation::Utf8mb4);
        const NUM: PreciseType = PreciseType::Int(8, true);
        match self {
            OsKind::Mac => &[
                ("NAME", TEXT),
                ("MAC_ADDRESS", TEXT),
                ("RECEIVED", NUM),
                ("TRANSMITTED", NUM),
            ],
            OsKind::Process => &[
                ("PID", NUM),
                ("NAME", TEXT),
                ("MEMORY", NUM),
                ("VIRTUAL_MEMORY", NUM),
            ],
            OsKind::System => &[
                ("HOST_NAME", TEXT),
                ("OS_NAME", TEXT),
                ("OS_VERSION", TEXT),
                ("KERNEL_VERSION", TEXT),
                ("TOTAL_MEMORY", NUM),
                ("USED_MEMORY", NUM),
                ("CPU_COUNT", NUM),
            ],
            OsKind::Disk => &[
                ("NAME", TEXT),
                ("MOUNT_POINT", TEXT),
                ("TOTAL_SPACE", NUM),
                ("AVAILABLE_SPACE", NUM),
            ],
        }
    }

    #[inline]
    pub fn columns(&self) -> Vec<ColumnDef> {
        synthesize(self.attrs())
    }

    #[inline]
    fn attr_names(&self) -> Vec<&'static str> {
        self.attrs().iter().map(|(n, _)| *n).collect()
    }

    /// Takes a snapshot of the inventory.
    pub fn snapshot(&self) -> Vec<Vec<Const>> {
        let text = |s: Option<String>| s.map(|s| Const::new_str(&s)).unwrap_or(Const::Null);
        match self {
            OsKind::Mac => {
                let networks = Networks::new_with_refreshed_list();
                let mut rows: Vec<_> = networks
                    .iter()
                    .map(|(name, data)| {
                        vec![
                            Const::new_str(name),
                            Const::new_str(&data.mac_address().to_string()),
                            Const::U64(data.total_received()),
                            Const::U64(data.total_transmitted()),
                        ]
                    })
                    .collect();
                rows.sort_by(|a, b| a[0].cmp(&b[0]));
                rows
            }
            OsKind::Process => {
                let mut sys = System::new();
                sys.refresh_processes();
                let mut procs: Vec<_> = sys.processes().iter().collect();
                procs.sort_by_key(|(pid, _)| pid.as_u32());
                procs
                    .into_iter()
                    .map(|(pid, p)| {
                        vec![
                            Const::U64(pid.as_u32() as u64),
                            Const::new_str(p.name()),
                            Const::U64(p.memory()),
                            Const::U64(p.virtual_memory()),
                        ]
                    })
                    .collect()
            }
            OsKind::System => {
                let mut sys = System::new();
                sys.refresh_memory();
                sys.refresh_cpu();
                vec![vec![
                    text(System::host_name()),
                    text(System::name()),
                    text(System::os_version()),
                    text(System::kernel_version()),
                    Const::U64(sys.total_memory()),
                    Const::U64(sys.used_memory()),
                    Const::U64(sys.cpus().len() as u64),
                ]]
            }
            OsKind::Disk => {
                let disks = Disks::new_with_refreshed_list();
                disks
                    .list()
                    .iter()
                    .map(|d| {
                        vec![
                            Const::new_str(&d.name().to_string_lossy()),
                            Const::new_str(&d.mount_point().to_string_lossy()),
                            Const::U64(d.total_space()),
                            Const::U64(d.available_space()),
                        ]
                    })
                    .collect()
            }
        }
    }
}

/// OsTable serves a snapshot of the inventory taken at open.
pub struct OsTable {
    def: Arc<TableDef>,
    kind: OsKind,
    positions: Vec<Option<usize>>,
    rows: RowSet,
}

impl OsTable {
    pub fn new(def: Arc<TableDef>) -> Result<Self> {
        let kind = match &def.access {
            AccessDef::Os(k) => *k,
            _ => return Err(def.access_mismatch()),
        };
        let positions = map_columns(&def, &kind.attr_names())?;
        Ok(OsTable {
            def,
            kind,
            positions,
            rows: RowSet::default(),
        })
    }
}

impl Access for OsTable {
    fn open(&mut self, _args: OpenArgs<'_>) -> Result<()> {
        let rows = self.kind.snapshot();
        log::debug!(
            "inventory table {} of {:?} has {} rows",
            self.def.name.as_str(),
            self.kind,
            rows.len()
        );
        self.rows = RowSet::with_capacity(rows.len());
        for r in rows {
            self.rows.push(r);
        }
        Ok(())
    }

    #[inline]
    fn read_next(&mut self, _ctx: &mut QueryContext) -> Result<ReadStatus> {
        Ok(self.rows.advance())
    }

    fn read_column(&mut self, idx: usize, col: &ColumnDef) -> Result<Const> {
        match self.positions.get(idx).copied().flatten() {
            Some(pos) => self.rows.value(pos, col),
            None => Err(Error::NotFoundInRow(col.name.to_string())),
        }
    }

    fn row_info(&self) -> RowInfo<'_> {
        RowInfo {
            rowid: self.rows.rowid(),
            rownum: self.rows.rowid(),
            ..Default::default()
        }
    }

    #[inline]
    fn cardinality(&mut self) -> Result<Cardinality> {
        Ok(Cardinality::Exact(self.rows.len() as u64))
    }

    #[inline]
    fn position(&self) -> Position {
        Position(self.rows.rowid())
    }

    #[inline]
    fn seek(&mut self, pos: Position) -> Result<ReadStatus> {
        Ok(self.rows.seek(pos.0))
    }

    fn close(&mut self, _ctx: &mut QueryContext) -> Result<()> {
        self.rows.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_kind() {
        let wmi = |class: &str| OsKind::parse(BackendType::Wmi, &OptionBag::new().with("class", class));
        assert_eq!(OsKind::Process, wmi("Win32_Process").unwrap());
        assert_eq!(OsKind::Disk, wmi("disk").unwrap());
        assert!(wmi("printer").is_err());
        assert_eq!(
            OsKind::System,
            OsKind::parse(BackendType::Wmi, &OptionBag::new()).unwrap()
        );
        assert_eq!(OsKind::Mac, OsKind::parse(BackendType::Mac, &OptionBag::new()).unwrap());
        assert!(OsKind::parse(BackendType::Csv, &OptionBag::new()).is_err());
        let cols = OsKind::System.columns();
        assert_eq!(7, cols.len());
        assert!(cols[6].name_eq("cpu_count"));
    }

    #[test]
    fn test_system_snapshot() {
        let rows = OsKind::System.snapshot();
        assert_eq!(1, rows.len());
        assert_eq!(7, rows[0].len());
        assert!(rows[0][6].as_i64().unwrap_or_default() >= 1);
        let procs = OsKind::Process.snapshot();
        let me = std::process::id() as u64;
        assert!(procs.iter().any(|r| r[0] == Const::U64(me)));
    }
}
