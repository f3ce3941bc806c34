use crate::error::{Error, Result};
use indexmap::IndexMap;
use semistr::SemiStr;
use std::str::FromStr;

/// OptionBag holds free-form options attached to a table or a column.
///
/// Keys are matched case-insensitively and kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionBag {
    opts: IndexMap<SemiStr, String>,
}

impl OptionBag {
    #[inline]
    pub fn new() -> Self {
        OptionBag::default()
    }

    /// Builder style insertion.
    #[inline]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    #[inline]
    pub fn insert(&mut self, key: &str, value: impl Into<String>) -> Option<String> {
        self.opts.insert(lower_key(key), value.into())
    }

    #[inline]
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.opts.shift_remove(lower_key(key).as_str())
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.opts.get(lower_key(key).as_str()).map(|s| s.as_str())
    }

    /// Returns the first present value among given keys.
    /// Used for option names that have aliases.
    #[inline]
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.opts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.opts.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.opts.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses a boolean option. Accepts 1/0, yes/no, true/false, on/off.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => match v.trim().to_ascii_lowercase().as_str() {
                "1" | "y" | "yes" | "t" | "true" | "on" => Ok(Some(true)),
                "0" | "n" | "no" | "f" | "false" | "off" | "" => Ok(Some(false)),
                _ => Err(invalid(key, v)),
            },
        }
    }

    #[inline]
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        self.get_bool(key).map(|v| v.unwrap_or(default))
    }

    /// Parses a numeric option.
    pub fn get_num<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v.trim().parse().map(Some).map_err(|_| invalid(key, v)),
        }
    }

    #[inline]
    pub fn num_or<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        self.get_num(key).map(|v| v.unwrap_or(default))
    }

    /// Parses a single character option.
    /// Escapes `\t` and `\n` are recognized.
    pub fn get_char(&self, key: &str) -> Result<Option<char>> {
        match self.get(key) {
            None => Ok(None),
            Some("\\t") => Ok(Some('\t')),
            Some("\\n") => Ok(Some('\n')),
            Some(v) => {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Some(c)),
                    _ => Err(invalid(key, v)),
                }
            }
        }
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for OptionBag {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut bag = OptionBag::new();
        for (k, v) in iter {
            bag.insert(k, v);
        }
        bag
    }
}

#[inline]
fn lower_key(key: &str) -> SemiStr {
    SemiStr::from_iter(key.chars().map(|c| c.to_ascii_lowercase()))
}

#[inline]
fn invalid(key: &str, value: &str) -> Error {
    Error::InvalidOption(key.to_ascii_lowercase(), value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_keys_case_insensitive() {
        let bag = OptionBag::new().with("File_Name", "a.csv").with("HEADER", "1");
        assert_eq!(Some("a.csv"), bag.get("file_name"));
        assert_eq!(Some("a.csv"), bag.get("FILE_NAME"));
        assert_eq!(Some(true), bag.get_bool("header").unwrap());
        assert_eq!(vec!["file_name", "header"], bag.iter().map(|(k, _)| k).collect::<Vec<_>>());
    }

    #[test]
    fn test_option_parse() {
        let bag: OptionBag = vec![("lrecl", "20"), ("sep", "\\t"), ("quoted", "x")]
            .into_iter()
            .collect();
        assert_eq!(Some(20usize), bag.get_num("lrecl").unwrap());
        assert_eq!(7usize, bag.num_or("size", 7).unwrap());
        assert_eq!(Some('\t'), bag.get_char("sep").unwrap());
        assert!(bag.get_num::<u8>("quoted").is_err());
        assert!(bag.get_bool("quoted").is_err());
        assert_eq!(Some("20"), bag.get_any(&["offset", "lrecl"]));
    }
}
