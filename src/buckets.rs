//! Buckets are the parsers' accumulation storage.
//!
//! A bucket is a unix-millisecond timestamp truncated to the parser's
//! granularity. `Buckets` keeps one counter per bucket, `KeyedBuckets` keeps
//! one counter per secondary key within a bucket. Both iterate in ascending
//! bucket order, then ascending key order, so snapshots built from them are
//! deterministic.

use std::collections::BTreeMap;
use std::collections::btree_map;

/// One counter per time bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Buckets {
    counts: BTreeMap<i64, u64>,
}

impl Buckets {
    /// Add one to the counter for `bucket`.
    ///
    /// # Examples
    ///
    /// ```
    /// use logster::buckets::Buckets;
    ///
    /// let mut buckets = Buckets::default();
    /// buckets.incr(1000);
    /// buckets.incr(1000);
    /// assert_eq!(buckets.get(1000), 2);
    /// assert_eq!(buckets.get(2000), 0);
    /// ```
    pub fn incr(&mut self, bucket: i64) {
        *self.counts.entry(bucket).or_insert(0) += 1;
    }

    /// The count in `bucket`, zero if it was never hit.
    pub fn get(&self, bucket: i64) -> u64 {
        self.counts.get(&bucket).cloned().unwrap_or(0)
    }

    /// True if nothing has been counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of buckets holding a count.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Sum over every bucket.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Buckets and their counts, oldest first.
    pub fn iter(&self) -> btree_map::Iter<i64, u64> {
        self.counts.iter()
    }
}

impl IntoIterator for Buckets {
    type Item = (i64, u64);
    type IntoIter = btree_map::IntoIter<i64, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}

/// One counter per secondary key per time bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct KeyedBuckets {
    counts: BTreeMap<i64, BTreeMap<String, u64>>,
}

impl KeyedBuckets {
    /// Add one to the counter for `key` in `bucket`.
    ///
    /// # Examples
    ///
    /// ```
    /// use logster::buckets::KeyedBuckets;
    ///
    /// let mut buckets = KeyedBuckets::default();
    /// buckets.incr(1000, "200");
    /// buckets.incr(1000, "404");
    /// buckets.incr(1000, "200");
    /// assert_eq!(buckets.get(1000, "200"), 2);
    /// assert_eq!(buckets.get(1000, "404"), 1);
    /// assert_eq!(buckets.get(1000, "500"), 0);
    /// ```
    pub fn incr(&mut self, bucket: i64, key: &str) {
        let keys = self.counts.entry(bucket).or_insert_with(BTreeMap::new);
        if let Some(count) = keys.get_mut(key) {
            *count += 1;
            return;
        }
        keys.insert(key.to_string(), 1);
    }

    /// The count for `key` in `bucket`, zero if it was never hit.
    pub fn get(&self, bucket: i64, key: &str) -> u64 {
        self.counts
            .get(&bucket)
            .and_then(|keys| keys.get(key))
            .cloned()
            .unwrap_or(0)
    }

    /// True if nothing has been counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Number of (bucket, key) pairs holding a count.
    pub fn len(&self) -> usize {
        self.counts.values().map(|keys| keys.len()).sum()
    }

    /// Sum over every bucket and key.
    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .flat_map(|keys| keys.values())
            .sum()
    }

    /// Iterate `(bucket, key, count)` in bucket then key order.
    pub fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = (i64, &'a str, u64)> + 'a> {
        Box::new(self.counts.iter().flat_map(|(bucket, keys)| {
            keys.iter()
                .map(move |(key, count)| (*bucket, key.as_str(), *count))
        }))
    }
}
