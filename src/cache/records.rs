// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The bounded pool of backing surfaces behind the tile cache.
//!
//! Surface allocation is expensive, so records are reused rather than
//! freed: when the pool is full the least-recently-used record is
//! reassigned to the requesting tile. The previous owner discovers the
//! loss by checking ownership before reuse, which also makes the
//! "deallocation must not allocate" rule structural: reassignment never
//! calls back into anything.

use std::cell::RefCell;
use std::rc::Rc;

use inkboard_geom::Rect2;

use crate::raster::SurfaceRenderer;

/// One backing surface plus its bookkeeping.
pub struct CacheRecord {
    /// The tile surface. Its viewport maps the owning tile's region
    /// onto the full pixmap.
    pub surface: SurfaceRenderer,
    /// The tile currently owning this record.
    pub owner_tile: Option<u64>,
    /// Rendering cycle of the last use, for LRU eviction.
    pub last_used_cycle: u64,
}

/// A shared handle to a record.
pub type CacheRecordRef = Rc<RefCell<CacheRecord>>;

/// Allocates and reclaims backing surfaces under a byte budget.
pub struct CacheRecordManager {
    records: Vec<CacheRecordRef>,
    max_records: usize,
    block_resolution: u32,
}

impl CacheRecordManager {
    /// Creates a manager holding at most
    /// `⌈cache_size_bytes / (4 · BR²)⌉` records.
    pub fn new(cache_size_bytes: usize, block_resolution: u32) -> Self {
        let bytes_per_record = 4 * block_resolution as usize * block_resolution as usize;
        let max_records = (cache_size_bytes + bytes_per_record - 1) / bytes_per_record;
        CacheRecordManager {
            records: Vec::new(),
            max_records: max_records.max(1),
            block_resolution,
        }
    }

    /// The number of live records.
    pub fn allocated_count(&self) -> usize {
        self.records.len()
    }

    /// The pool limit.
    pub fn max_records(&self) -> usize {
        self.max_records
    }

    /// Allocates a record for `tile_id`, mapping `region` onto the
    /// surface.
    ///
    /// Reclaims the least-recently-used record when the pool is full;
    /// the previous owner's cached content is lost. Returns `None` only
    /// when surface allocation itself fails.
    pub fn alloc(&mut self, tile_id: u64, region: Rect2, cycle: u64) -> Option<CacheRecordRef> {
        if self.records.len() < self.max_records {
            let surface = SurfaceRenderer::for_region(
                self.block_resolution,
                self.block_resolution,
                region,
            )?;
            let record = Rc::new(RefCell::new(CacheRecord {
                surface,
                owner_tile: Some(tile_id),
                last_used_cycle: cycle,
            }));
            self.records.push(Rc::clone(&record));
            return Some(record);
        }

        // Reclaim the least recently used record.
        let lru = self
            .records
            .iter()
            .min_by_key(|record| record.borrow().last_used_cycle)
            .map(Rc::clone)?;

        {
            let mut borrowed = lru.borrow_mut();
            borrowed.owner_tile = Some(tile_id);
            borrowed.last_used_cycle = cycle;
            borrowed.surface.reset_for_region(region);
        }
        Some(lru)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_follows_cache_size() {
        let manager = CacheRecordManager::new(4 * 500 * 500 * 10, 500);
        assert_eq!(manager.max_records(), 10);

        // Rounds up.
        let manager = CacheRecordManager::new(4 * 500 * 500 * 10 + 1, 500);
        assert_eq!(manager.max_records(), 11);
    }

    #[test]
    fn full_pool_reclaims_lru() {
        let mut manager = CacheRecordManager::new(4 * 16 * 16 * 2, 16);
        assert_eq!(manager.max_records(), 2);

        let region = Rect2::new(0.0, 0.0, 100.0, 100.0);
        let a = manager.alloc(1, region, 1).unwrap();
        let _b = manager.alloc(2, region, 2).unwrap();
        assert_eq!(manager.allocated_count(), 2);

        // The pool is full; tile 3 steals tile 1's record.
        let c = manager.alloc(3, region, 3).unwrap();
        assert!(Rc::ptr_eq(&a, &c));
        assert_eq!(a.borrow().owner_tile, Some(3));
        assert_eq!(manager.allocated_count(), 2);
    }
}
