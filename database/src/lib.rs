//! Ordered key-value store with compressed values.
//!
//! Values are compressed with Snappy on write and decompressed on read. Keys are compared
//! lexicographically, so big-endian integer prefixes sort numerically.

use core::ops::{Range, RangeFrom, RangeToInclusive};
use std::sync::Arc;

use anyhow::Result;
use im::OrdMap;
use parking_lot::Mutex;
use snap::raw::{Decoder, Encoder};
use std_ext::ArcExt as _;
use unwrap_none::UnwrapNone as _;

#[derive(Default)]
pub struct Database {
    // Methods of `OrdMap` clone its elements, so keys and values should be cheaply cloneable.
    // This disqualifies `Vec<u8>` and `Box<[u8]>`.
    map: Mutex<InMemoryMap>,
}

impl Database {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn delete(&self, key: impl AsRef<[u8]>) -> Result<()> {
        self.map.lock().remove(key.as_ref());
        Ok(())
    }

    pub fn delete_range(&self, range: Range<impl AsRef<[u8]>>) -> Result<()> {
        let start = range.start.as_ref();
        let end = range.end.as_ref();

        // Update the map atomically for consistency with `Database::put_batch`.
        let mut map = self.map.lock();
        let mut new_map = map.clone();

        let end_pair = map.get_key_value(end);
        let (below, _) = new_map.split(start);
        let (_, above) = new_map.split(end);

        new_map = below.union(above);

        if let Some((key, value)) = end_pair {
            new_map
                .insert(key.clone_arc(), value.clone_arc())
                .expect_none("end_pair should have been discarded by OrdMap::split");
        }

        *map = new_map;

        Ok(())
    }

    pub fn contains_key(&self, key: impl AsRef<[u8]>) -> Result<bool> {
        Ok(self.map.lock().contains_key(key.as_ref()))
    }

    pub fn get(&self, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.map
            .lock()
            .get(key.as_ref())
            .map(|compressed| decompress(compressed))
            .transpose()
    }

    /// Number of keys in the database.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.lock().is_empty()
    }

    pub fn iterator_ascending(
        &self,
        range: RangeFrom<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let start = range.start.as_ref();
        let map = self.map.lock();
        let start_pair = map.get_key_value(start);
        let (_, mut above) = map.split(start);

        if let Some((key, value)) = start_pair {
            above
                .insert(key.clone_arc(), value.clone_arc())
                .expect_none("start_pair should have been discarded by OrdMap::split");
        }

        Ok(above.into_iter().map(decompress_pair))
    }

    pub fn iterator_descending(
        &self,
        range: RangeToInclusive<impl AsRef<[u8]>>,
    ) -> Result<impl Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>> {
        let end = range.end.as_ref();
        let map = self.map.lock();
        let end_pair = map.get_key_value(end);
        let (mut below, _) = map.split(end);

        if let Some((key, value)) = end_pair {
            below
                .insert(key.clone_arc(), value.clone_arc())
                .expect_none("end_pair should have been discarded by OrdMap::split");
        }

        Ok(below.into_iter().rev().map(decompress_pair))
    }

    pub fn put(&self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.put_batch(core::iter::once((key, value)))
    }

    /// Writes all pairs or none of them.
    pub fn put_batch(
        &self,
        pairs: impl IntoIterator<Item = (impl AsRef<[u8]>, impl AsRef<[u8]>)>,
    ) -> Result<()> {
        let compressed_pairs = pairs
            .into_iter()
            .map(|(key, value)| {
                let key = Arc::<[u8]>::from(key.as_ref());
                let compressed = Arc::<[u8]>::from(compress(value.as_ref())?);
                Ok((key, compressed))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut map = self.map.lock();

        for (key, compressed) in compressed_pairs {
            map.insert(key, compressed);
        }

        Ok(())
    }

    /// Returns the first key-value pair whose key is less than or equal to `key`.
    ///
    /// Behaves like [`im::OrdMap::get_prev`].
    pub fn prev(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.map
            .lock()
            .get_prev(key.as_ref())
            .map(|(key, value)| Ok((key.to_vec(), decompress(value)?)))
            .transpose()
    }

    /// Returns the first key-value pair whose key is greater than or equal to `key`.
    ///
    /// Behaves like [`im::OrdMap::get_next`].
    pub fn next(&self, key: impl AsRef<[u8]>) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        self.map
            .lock()
            .get_next(key.as_ref())
            .map(|(key, value)| Ok((key.to_vec(), decompress(value)?)))
            .transpose()
    }
}

type InMemoryMap = OrdMap<Arc<[u8]>, Arc<[u8]>>;

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    Encoder::new().compress_vec(data).map_err(Into::into)
}

fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    Decoder::new().decompress_vec(data).map_err(Into::into)
}

fn decompress_pair(
    (key, compressed_value): (Arc<[u8]>, Arc<[u8]>),
) -> Result<(Vec<u8>, Vec<u8>)> {
    let value = decompress(&compressed_value)?;
    Ok((key.to_vec(), value))
}
