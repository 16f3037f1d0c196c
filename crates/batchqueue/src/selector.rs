//! Partition selection
//!
//! Maps an item to a partition index. The default hashes the item's
//! [`TypeKey`](crate::TypeKey), so every item of one type lands in the same
//! partition for a given partition count.

use std::fmt;
use std::sync::Arc;

use crate::handler::TypeKeyed;

type SelectFn<T> = dyn Fn(&T, usize) -> usize + Send + Sync;

/// Item-to-partition mapping
pub struct PartitionSelector<T> {
    kind: SelectorKind<T>,
}

enum SelectorKind<T> {
    TypeHash,
    Custom(Arc<SelectFn<T>>),
}

impl<T: TypeKeyed> PartitionSelector<T> {
    /// Hash of the item's type key modulo the partition count
    pub fn type_hash() -> Self {
        Self {
            kind: SelectorKind::TypeHash,
        }
    }

    /// Caller-supplied mapping, e.g. by an explicit type id field
    ///
    /// Results are reduced modulo the partition count, so the function may
    /// return any index.
    pub fn custom<F>(select: F) -> Self
    where
        F: Fn(&T, usize) -> usize + Send + Sync + 'static,
    {
        Self {
            kind: SelectorKind::Custom(Arc::new(select)),
        }
    }

    /// Pick a partition in `[0, partition_count)`
    #[inline]
    pub fn select(&self, item: &T, partition_count: usize) -> usize {
        debug_assert!(partition_count > 0);
        match &self.kind {
            SelectorKind::TypeHash => {
                (item.type_key().hash_code() % partition_count as u64) as usize
            }
            SelectorKind::Custom(select) => select(item, partition_count) % partition_count,
        }
    }
}

impl<T: TypeKeyed> Default for PartitionSelector<T> {
    fn default() -> Self {
        Self::type_hash()
    }
}

impl<T> Clone for PartitionSelector<T> {
    fn clone(&self) -> Self {
        let kind = match &self.kind {
            SelectorKind::TypeHash => SelectorKind::TypeHash,
            SelectorKind::Custom(select) => SelectorKind::Custom(Arc::clone(select)),
        };
        Self { kind }
    }
}

impl<T> fmt::Debug for PartitionSelector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SelectorKind::TypeHash => f.write_str("PartitionSelector::TypeHash"),
            SelectorKind::Custom(_) => f.write_str("PartitionSelector::Custom"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TypeKey;

    struct Sample {
        key: TypeKey,
        type_id: usize,
    }

    impl TypeKeyed for Sample {
        fn type_key(&self) -> TypeKey {
            self.key
        }
    }

    fn sample(name: &'static str, type_id: usize) -> Sample {
        Sample {
            key: TypeKey::new(name),
            type_id,
        }
    }

    #[test]
    fn test_type_hash_is_stable_per_type() {
        let selector = PartitionSelector::type_hash();
        let a1 = selector.select(&sample("service_cpm", 1), 16);
        let a2 = selector.select(&sample("service_cpm", 2), 16);
        assert_eq!(a1, a2);
        assert!(a1 < 16);
    }

    #[test]
    fn test_type_hash_spreads_types() {
        let selector = PartitionSelector::type_hash();
        let names = [
            "a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k", "l", "m", "n", "o", "p",
        ];
        let used: std::collections::HashSet<usize> = names
            .iter()
            .map(|name| selector.select(&sample(name, 0), 8))
            .collect();
        assert!(used.len() > 1);
    }

    #[test]
    fn test_single_partition_always_zero() {
        let selector = PartitionSelector::type_hash();
        assert_eq!(selector.select(&sample("anything", 0), 1), 0);
    }

    #[test]
    fn test_custom_selector_by_field() {
        let selector = PartitionSelector::custom(|s: &Sample, count| s.type_id % count);
        assert_eq!(selector.select(&sample("x", 5), 4), 1);
        assert_eq!(selector.select(&sample("x", 8), 4), 0);
    }

    #[test]
    fn test_custom_selector_out_of_range_is_wrapped() {
        let selector = PartitionSelector::custom(|_: &Sample, _| 1_000);
        assert_eq!(selector.select(&sample("x", 0), 7), 1_000 % 7);

        let cloned = selector.clone();
        assert_eq!(format!("{cloned:?}"), "PartitionSelector::Custom");
    }
}
