use crate::error::Result;
use std::path::PathBuf;
use xconn_catalog::OptionBag;

pub const DEFAULT_VIRTUAL_SIZE: u64 = 1;
pub const DEFAULT_REMOTE_ESTIMATE: u64 = 10;
pub const DEFAULT_MAX_BUFFERED_ROWS: u64 = 1_000_000;
pub const DEFAULT_DISCOVERY_SCAN_ROWS: usize = 100;
pub const DEFAULT_MAX_BAD_RECORDS: u32 = 0;

/// Process-wide settings shared by all sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Base directory of relative file names.
    pub data_path: PathBuf,
    /// Row count of virtual tables without `size` option.
    pub default_virtual_size: u64,
    /// Row estimate reported by streaming remote cursors.
    pub remote_estimate: u64,
    /// Buffered remote results larger than this fall back to streaming.
    pub max_buffered_rows: u64,
    /// Rows scanned to infer column types of headed files.
    pub discovery_scan_rows: usize,
    /// Bad records tolerated per scan if table has no `maxerr`.
    pub max_bad_records: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_path: PathBuf::from("."),
            default_virtual_size: DEFAULT_VIRTUAL_SIZE,
            remote_estimate: DEFAULT_REMOTE_ESTIMATE,
            max_buffered_rows: DEFAULT_MAX_BUFFERED_ROWS,
            discovery_scan_rows: DEFAULT_DISCOVERY_SCAN_ROWS,
            max_bad_records: DEFAULT_MAX_BAD_RECORDS,
        }
    }
}

impl Config {
    /// Builds config from host variables, using the same option
    /// vocabulary as tables. Missing keys keep their defaults.
    pub fn from_options(opts: &OptionBag) -> Result<Self> {
        let mut cfg = Config::default();
        if let Some(p) = opts.get("data_path") {
            cfg.data_path = PathBuf::from(p);
        }
        cfg.default_virtual_size = opts.num_or("default_virtual_size", cfg.default_virtual_size)?;
        cfg.remote_estimate = opts.num_or("remote_estimate", cfg.remote_estimate)?;
        cfg.max_buffered_rows = opts.num_or("max_buffered_rows", cfg.max_buffered_rows)?;
        cfg.discovery_scan_rows = opts.num_or("discovery_scan_rows", cfg.discovery_scan_rows)?;
        cfg.max_bad_records = opts.num_or("max_bad_records", cfg.max_bad_records)?;
        Ok(cfg)
    }

    #[inline]
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_options() {
        let opts = OptionBag::new()
            .with("DATA_PATH", "/tmp/x")
            .with("max_buffered_rows", "10");
        let cfg = Config::from_options(&opts).unwrap();
        assert_eq!(PathBuf::from("/tmp/x"), cfg.data_path);
        assert_eq!(10, cfg.max_buffered_rows);
        assert_eq!(DEFAULT_VIRTUAL_SIZE, cfg.default_virtual_size);
        let bad = OptionBag::new().with("remote_estimate", "many");
        assert!(Config::from_options(&bad).is_err());
    }
}
