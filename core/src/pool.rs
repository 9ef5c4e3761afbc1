//! Memory Pools & Observations (§4.2).
//!
//! A lazy byte-range store keyed by `(pool, address)`. "Reads" observations preload bytes into
//! the application pool before a command's mutation runs; "writes" observations pre-populate
//! pool contents so later reads that logically cross this point see what the captured
//! application produced (e.g. a newly generated handle array written by `glGenBuffers`).
//!
//! Grounded on the teacher's `backend_gl::pool::Pool` aliasing-pool shape (a keyed table of
//! byte-bearing entries with explicit alloc/destroy), generalized here from GPU-object aliasing
//! to raw byte-range storage.

use fxhash::FxHashMap;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// A named byte-addressable region. Device pools are minted per device-memory allocation so
/// aliasing stays structural rather than numeric (§9 design note).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Pool {
    Application,
    ApplicationArena,
    Device(u32),
}

/// A typed view over a pool range; callers must carry the pool alongside any address so reads
/// dispatch to the correct region (no slice may straddle two pools, §4.2 invariant).
#[derive(Clone, Debug)]
pub struct Slice {
    pub pool: Pool,
    pub base: u64,
    pub count: usize,
    pub element_size: usize,
}

impl Slice {
    pub fn byte_len(&self) -> usize {
        self.count * self.element_size
    }
}

/// One `(pool, range, bytes)` record attached to a command.
#[derive(Clone, Debug)]
pub struct Observation {
    pub pool: Pool,
    pub base: u64,
    pub bytes: Vec<u8>,
}

/// Stable 20-byte content identifier, as named in §3/§4.2.
pub type ContentId = [u8; 20];

#[derive(Default)]
struct Region {
    /// Sparse chunks keyed by start address; chunks never overlap once inserted (a later
    /// observation covering the same range replaces the overlapping prefix/suffix/whole chunk).
    chunks: BTreeMap<u64, Vec<u8>>,
}

impl Region {
    fn store(&mut self, base: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.chunks.insert(base, data.to_vec());
    }

    fn read(&self, base: u64, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        let end = base + len as u64;
        // Any chunk whose range intersects [base, end) contributes its overlap. Chunks with
        // start <= base may still extend into the requested range, so start one entry back.
        let start_bound = self
            .chunks
            .range(..=base)
            .next_back()
            .map(|(&k, _)| k)
            .unwrap_or(base);
        for (&chunk_base, chunk) in self.chunks.range(start_bound..end) {
            let chunk_end = chunk_base + chunk.len() as u64;
            if chunk_end <= base || chunk_base >= end {
                continue;
            }
            let copy_start = chunk_base.max(base);
            let copy_end = chunk_end.min(end);
            let src_off = (copy_start - chunk_base) as usize;
            let dst_off = (copy_start - base) as usize;
            let n = (copy_end - copy_start) as usize;
            out[dst_off..dst_off + n].copy_from_slice(&chunk[src_off..src_off + n]);
        }
        out
    }
}

/// The process-wide collection of pools, owned by [`crate::state::State`].
pub struct MemoryPools {
    regions: FxHashMap<Pool, Region>,
    next_device_pool: u32,
}

impl MemoryPools {
    pub fn new() -> MemoryPools {
        MemoryPools {
            regions: FxHashMap::default(),
            next_device_pool: 0,
        }
    }

    /// Mints a fresh device pool, e.g. for a new device-memory allocation during replay, so
    /// aliasing between allocations is structural rather than numeric (§9).
    pub fn mint_device_pool(&mut self) -> Pool {
        let id = self.next_device_pool;
        self.next_device_pool += 1;
        Pool::Device(id)
    }

    pub fn apply_reads(&mut self, observations: &[Observation]) {
        for obs in observations {
            self.regions
                .entry(obs.pool)
                .or_insert_with(Region::default)
                .store(obs.base, &obs.bytes);
        }
    }

    pub fn apply_writes(&mut self, observations: &[Observation]) {
        // Same storage mechanics as apply_reads; the distinction is purely in when the caller
        // invokes it relative to the command's mutation (§4.2 contract).
        self.apply_reads(observations);
    }

    /// Reads `slice` out of its pool. Ranges not covered by any observation read back as zero,
    /// unless the pool is one populated by explicit replay-side allocation (still zero-filled
    /// here; a replay-side allocator is expected to have applied its own writes first).
    pub fn read(&self, slice: &Slice) -> Vec<u8> {
        match self.regions.get(&slice.pool) {
            Some(region) => region.read(slice.base, slice.byte_len()),
            None => vec![0u8; slice.byte_len()],
        }
    }

    /// Hashes `slice`'s current contents into a stable 20-byte content id for downstream blob
    /// storage.
    pub fn resource_id(&self, slice: &Slice) -> ContentId {
        let bytes = self.read(slice);
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uncovered_range_reads_as_zero() {
        let pools = MemoryPools::new();
        let slice = Slice { pool: Pool::Application, base: 0, count: 4, element_size: 1 };
        assert_eq!(pools.read(&slice), vec![0, 0, 0, 0]);
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut pools = MemoryPools::new();
        pools.apply_writes(&[Observation { pool: Pool::Application, base: 16, bytes: vec![1, 2, 3, 4] }]);
        let slice = Slice { pool: Pool::Application, base: 16, count: 4, element_size: 1 };
        assert_eq!(pools.read(&slice), vec![1, 2, 3, 4]);
    }

    #[test]
    fn partial_overlap_reads_only_the_covered_bytes() {
        let mut pools = MemoryPools::new();
        pools.apply_writes(&[Observation { pool: Pool::Application, base: 4, bytes: vec![9, 9] }]);
        let slice = Slice { pool: Pool::Application, base: 0, count: 8, element_size: 1 };
        assert_eq!(pools.read(&slice), vec![0, 0, 0, 0, 9, 9, 0, 0]);
    }

    #[test]
    fn minted_device_pools_are_distinct() {
        let mut pools = MemoryPools::new();
        let a = pools.mint_device_pool();
        let b = pools.mint_device_pool();
        assert_ne!(a, b);
    }

    #[test]
    fn resource_id_is_stable_and_content_addressed() {
        let mut pools = MemoryPools::new();
        pools.apply_writes(&[Observation { pool: Pool::Application, base: 0, bytes: vec![1, 2, 3] }]);
        let slice = Slice { pool: Pool::Application, base: 0, count: 3, element_size: 1 };
        let id1 = pools.resource_id(&slice);
        let id2 = pools.resource_id(&slice);
        assert_eq!(id1, id2);
    }
}
