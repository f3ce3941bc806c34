use crate::error::{Error, Result};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// How `file_name` designates the files of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Multiple {
    Single,
    /// Wildcard pattern in the directory of the file.
    Wildcard,
    /// List file holding one path per line.
    List,
    /// Wildcard pattern searched in sub-directories too.
    Recursive,
}

impl Multiple {
    #[inline]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Multiple::Single),
            1 => Some(Multiple::Wildcard),
            2 => Some(Multiple::List),
            3 => Some(Multiple::Recursive),
            _ => None,
        }
    }
}

/// Translates a file wildcard into an anchored regex.
/// `*` matches any run of characters and `?` any single one.
pub(crate) fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    Ok(Regex::new(&re)?)
}

/// Expands the file name into the sorted list of files to visit.
pub(crate) fn expand(path: &Path, multiple: Multiple) -> Result<Vec<PathBuf>> {
    match multiple {
        Multiple::Single => Ok(vec![path.to_path_buf()]),
        Multiple::Wildcard | Multiple::Recursive => {
            let (dir, pattern) = split_pattern(path)?;
            let re = wildcard_regex(&pattern)?;
            let mut files = vec![];
            collect(&dir, &re, multiple == Multiple::Recursive, &mut files)?;
            files.sort();
            log::debug!("pattern {} matches {} files", path.display(), files.len());
            Ok(files)
        }
        Multiple::List => {
            let text = fs::read_to_string(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new(""));
            let files = text
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|l| {
                    let p = Path::new(l);
                    if p.is_absolute() {
                        p.to_path_buf()
                    } else {
                        base.join(p)
                    }
                })
                .collect();
            Ok(files)
        }
    }
}

/// Splits a wildcard path into its directory and file pattern.
pub(crate) fn split_pattern(path: &Path) -> Result<(PathBuf, String)> {
    let pattern = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::invalid_option("file_name", path.display().to_string()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, pattern))
}

/// Collects files under the directory whose names match.
pub(crate) fn collect(dir: &Path, re: &Regex, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let path = entry.path();
        if ty.is_dir() {
            if recursive {
                collect(&path, re, recursive, out)?;
            }
        } else if re.is_match(&entry.file_name().to_string_lossy()) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_regex() {
        let re = wildcard_regex("emp*.csv").unwrap();
        assert!(re.is_match("emp1.csv"));
        assert!(re.is_match("emp.csv"));
        assert!(!re.is_match("emp1.csvx"));
        assert!(!re.is_match("emp1xcsv"));
        let re = wildcard_regex("f?.txt").unwrap();
        assert!(re.is_match("f1.txt"));
        assert!(!re.is_match("f12.txt"));
    }

    #[test]
    fn test_expand_files() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        for p in [dir.path().join("b.csv"), dir.path().join("a.csv"), sub.join("c.csv")] {
            fs::write(p, "x\n").unwrap();
        }
        fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        let files = expand(&dir.path().join("*.csv"), Multiple::Wildcard).unwrap();
        assert_eq!(vec![dir.path().join("a.csv"), dir.path().join("b.csv")], files);
        let files = expand(&dir.path().join("*.csv"), Multiple::Recursive).unwrap();
        assert_eq!(3, files.len());
        let list = dir.path().join("files.lst");
        fs::write(&list, "b.csv\n\n# skipped\nsub/c.csv\n").unwrap();
        let files = expand(&list, Multiple::List).unwrap();
        assert_eq!(vec![dir.path().join("b.csv"), dir.path().join("sub/c.csv")], files);
    }
}
