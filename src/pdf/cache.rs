//! LRU cache of rendered base pages
//!
//! Base pages are whole pages rendered at scale 1 for the current viewport
//! width. They back the interim display while a zoomed viewport renders.
//! The cache only tracks buffer ids; evicted ids are handed back so the
//! caller can free them in the pool.

use std::num::NonZeroUsize;

use lru::LruCache;

use super::buffer::BufferId;
use super::types::BufferDimensions;

/// Cache key for a base page
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub page: usize,
    /// Viewport width the page was fitted to
    pub width: i32,
}

/// A rendered base page living in a pool buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BasePage {
    pub buffer: BufferId,
    pub dimensions: BufferDimensions,
}

pub struct BasePageCache {
    cache: LruCache<CacheKey, BasePage>,
}

impl BasePageCache {
    pub const DEFAULT_CAPACITY: usize = 8;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached page, promoting it in the LRU order
    pub fn get(&mut self, key: &CacheKey) -> Option<BasePage> {
        self.cache.get(key).copied()
    }

    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a page. Returns the buffer that is no longer referenced, either
    /// the evicted least recently used page or the one this key replaced.
    pub fn insert(&mut self, key: CacheKey, page: BasePage) -> Option<BufferId> {
        match self.cache.push(key, page) {
            Some((_, old)) if old.buffer != page.buffer => Some(old.buffer),
            _ => None,
        }
    }

    /// Drop every entry, returning the buffers to free.
    pub fn invalidate_all(&mut self) -> Vec<BufferId> {
        let mut freed = Vec::with_capacity(self.cache.len());
        while let Some((_, page)) = self.cache.pop_lru() {
            freed.push(page.buffer);
        }
        freed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}

impl Default for BasePageCache {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(page: usize) -> CacheKey {
        CacheKey { page, width: 100 }
    }

    fn base(id: u64) -> BasePage {
        BasePage {
            buffer: BufferId(id),
            dimensions: BufferDimensions {
                width: 100,
                height: 141,
                stride: 400,
            },
        }
    }

    #[test]
    fn zero_capacity_becomes_one() {
        assert_eq!(BasePageCache::new(0).capacity(), 1);
    }

    #[test]
    fn eviction_returns_the_oldest_buffer() {
        let mut cache = BasePageCache::new(2);
        assert_eq!(cache.insert(key(0), base(1)), None);
        assert_eq!(cache.insert(key(1), base(2)), None);
        // Touch page 0 so page 1 becomes the oldest.
        assert!(cache.get(&key(0)).is_some());
        assert_eq!(cache.insert(key(2), base(3)), Some(BufferId(2)));
        assert!(!cache.contains(&key(1)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn replacing_a_key_frees_the_old_buffer() {
        let mut cache = BasePageCache::new(2);
        cache.insert(key(0), base(1));
        assert_eq!(cache.insert(key(0), base(5)), Some(BufferId(1)));
        assert_eq!(cache.insert(key(0), base(5)), None);
    }

    #[test]
    fn keys_differ_by_width() {
        let mut cache = BasePageCache::new(4);
        cache.insert(key(0), base(1));
        assert!(!cache.contains(&CacheKey { page: 0, width: 200 }));
    }

    #[test]
    fn invalidate_all_returns_every_buffer() {
        let mut cache = BasePageCache::new(4);
        cache.insert(key(0), base(1));
        cache.insert(key(1), base(2));
        let mut freed = cache.invalidate_all();
        freed.sort();
        assert_eq!(freed, vec![BufferId(1), BufferId(2)]);
        assert!(cache.is_empty());
    }
}
