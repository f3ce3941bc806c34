use crate::cursor::KeyOp;
use crate::error::Result;
use std::cmp::Ordering;
use xconn_datatype::{Const, PreciseType};

/// Ordered in-memory key index mapping key values to row positions.
///
/// Lookups compare only as many key parts as the search key has, so a
/// prefix of a composite key can be searched.
#[derive(Debug, Default)]
pub(crate) struct KeyIndex {
    types: Vec<PreciseType>,
    entries: Vec<(Vec<Const>, u64)>,
    /// Entry returned by the last lookup.
    current: Option<usize>,
    last_key: Vec<Const>,
}

impl KeyIndex {
    /// Builds index from unordered entries. Entries with equal keys
    /// keep row order.
    pub fn build(types: Vec<PreciseType>, mut entries: Vec<(Vec<Const>, u64)>) -> Self {
        entries.sort();
        KeyIndex {
            types,
            entries,
            current: None,
            last_key: vec![],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Casts search key to the key types.
    fn normalize(&self, key: &[Const]) -> Result<Vec<Const>> {
        key.iter()
            .zip(&self.types)
            .map(|(k, ty)| k.cast_to(*ty).map_err(Into::into))
            .collect()
    }

    #[inline]
    fn cmp_prefix(entry: &[Const], key: &[Const]) -> Ordering {
        let n = key.len().min(entry.len());
        entry[..n].cmp(&key[..n])
    }

    /// Returns row position matching the search key, or None if no entry
    /// matches.
    pub fn lookup(&mut self, op: KeyOp, key: &[Const]) -> Result<Option<u64>> {
        let found = match op {
            KeyOp::FIRST => {
                if self.entries.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            KeyOp::NEXT => match self.current {
                Some(i) if i + 1 < self.entries.len() => Some(i + 1),
                None if !self.entries.is_empty() => Some(0),
                _ => None,
            },
            KeyOp::SAME => match self.current {
                Some(i)
                    if i + 1 < self.entries.len()
                        && Self::cmp_prefix(&self.entries[i + 1].0, &self.last_key)
                            == Ordering::Equal =>
                {
                    Some(i + 1)
                }
                _ => None,
            },
            KeyOp::EQ | KeyOp::GT | KeyOp::GE | KeyOp::LT | KeyOp::LE => {
                let key = self.normalize(key)?;
                let lower = self
                    .entries
                    .partition_point(|(k, _)| Self::cmp_prefix(k, &key) == Ordering::Less);
                let upper = self
                    .entries
                    .partition_point(|(k, _)| Self::cmp_prefix(k, &key) != Ordering::Greater);
                let res = match op {
                    KeyOp::EQ if lower < upper => Some(lower),
                    KeyOp::GE if lower < self.entries.len() => Some(lower),
                    KeyOp::GT if upper < self.entries.len() => Some(upper),
                    KeyOp::LT if lower > 0 => Some(lower - 1),
                    KeyOp::LE if upper > 0 => Some(upper - 1),
                    _ => None,
                };
                self.last_key = key;
                res
            }
        };
        if let Some(i) = found {
            if matches!(op, KeyOp::FIRST | KeyOp::NEXT) {
                self.last_key = self.entries[i].0.clone();
            }
            self.current = Some(i);
            Ok(Some(self.entries[i].1))
        } else {
            if op != KeyOp::SAME && op != KeyOp::NEXT {
                self.current = None;
            }
            Ok(None)
        }
    }

    /// Counts entries with key in [lo, hi]. Missing bound is open.
    pub fn count_range(&self, lo: Option<&[Const]>, hi: Option<&[Const]>) -> Result<u64> {
        let start = match lo {
            Some(lo) => {
                let lo = self.normalize(lo)?;
                self.entries
                    .partition_point(|(k, _)| Self::cmp_prefix(k, &lo) == Ordering::Less)
            }
            None => 0,
        };
        let end = match hi {
            Some(hi) => {
                let hi = self.normalize(hi)?;
                self.entries
                    .partition_point(|(k, _)| Self::cmp_prefix(k, &hi) != Ordering::Greater)
            }
            None => self.entries.len(),
        };
        Ok(end.saturating_sub(start) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    fn index(n: i64) -> KeyIndex {
        let mut entries: Vec<_> = (1..=n)
            .map(|i| (vec![Const::I64(i / 2)], i as u64))
            .collect();
        entries.shuffle(&mut thread_rng());
        KeyIndex::build(vec![PreciseType::i64()], entries)
    }

    #[test]
    fn test_key_index_lookup() {
        // keys: 0 1 1 2 2 3 3 4 4 5
        let mut idx = index(10);
        assert_eq!(10, idx.len());
        assert_eq!(Some(2), idx.lookup(KeyOp::EQ, &[Const::I64(1)]).unwrap());
        assert_eq!(Some(3), idx.lookup(KeyOp::SAME, &[]).unwrap());
        assert_eq!(None, idx.lookup(KeyOp::SAME, &[]).unwrap());
        assert_eq!(Some(4), idx.lookup(KeyOp::GT, &[Const::I64(1)]).unwrap());
        assert_eq!(Some(5), idx.lookup(KeyOp::NEXT, &[]).unwrap());
        assert_eq!(Some(1), idx.lookup(KeyOp::LT, &[Const::I64(1)]).unwrap());
        assert_eq!(Some(3), idx.lookup(KeyOp::LE, &[Const::I64(1)]).unwrap());
        assert_eq!(None, idx.lookup(KeyOp::EQ, &[Const::I64(9)]).unwrap());
        assert_eq!(None, idx.lookup(KeyOp::GE, &[Const::I64(6)]).unwrap());
        assert_eq!(Some(1), idx.lookup(KeyOp::FIRST, &[]).unwrap());
        // search key is cast to key type
        assert_eq!(Some(10), idx.lookup(KeyOp::EQ, &[Const::new_str("5")]).unwrap());
    }

    #[test]
    fn test_key_index_range() {
        let idx = index(10);
        assert_eq!(10, idx.count_range(None, None).unwrap());
        assert_eq!(4, idx.count_range(Some(&[Const::I64(1)]), Some(&[Const::I64(2)])).unwrap());
        assert_eq!(3, idx.count_range(Some(&[Const::I64(4)]), None).unwrap());
        assert_eq!(0, idx.count_range(Some(&[Const::I64(3)]), Some(&[Const::I64(2)])).unwrap());
    }
}
