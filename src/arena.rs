//! Region allocator with staged lifetimes.
//!
//! Every buffer a [`Statement`](crate::Statement) hands to the native layer lives in
//! one of three arenas:
//!
//! - [`Tier::Statement`]: field descriptors, kept until the result shape is recaptured
//! - [`Tier::Query`]: rewritten SQL, parameter names and bound values, one prepare cycle
//! - [`Tier::Result`]: variable-length column buffers of the current result set
//!
//! Allocations are addressed through [`ArenaRef`] handles instead of pointers. A handle
//! carries the generation of the arena it came from, so a lookup made after
//! [`Arena::reset`] fails with [`AllocError::Stale`] rather than reading freed memory.

use std::ffi::CStr;

use crate::config::ArenaConfig;

/// Lifetime tier of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Statement,
    Query,
    Result,
}

/// Generation-tagged handle to one arena allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaRef {
    tier: Tier,
    generation: u32,
    slot: u32,
}

impl ArenaRef {
    /// Tier the allocation belongs to.
    pub fn tier(&self) -> Tier {
        self.tier
    }
}

/// Allocation failures. The arena is left untouched when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocError {
    #[error("{tier:?} arena limit of {limit} bytes exceeded (requested {requested}, in use {used})")]
    LimitExceeded {
        tier: Tier,
        requested: usize,
        used: usize,
        limit: usize,
    },

    #[error("system allocator refused {requested} bytes for the {tier:?} arena")]
    OutOfMemory { tier: Tier, requested: usize },

    #[error("handle into the {tier:?} arena was invalidated by a reset")]
    Stale { tier: Tier },

    #[error("handle belongs to the {found:?} arena, not the {expected:?} arena")]
    WrongTier { expected: Tier, found: Tier },

    #[error("{tier:?} arena allocation holds no NUL terminator")]
    Unterminated { tier: Tier },
}

/// A region of byte allocations released all at once.
#[derive(Debug)]
pub struct Arena {
    tier: Tier,
    generation: u32,
    blocks: Vec<Vec<u8>>,
    used: usize,
    limit: Option<usize>,
}

impl Arena {
    /// Creates an arena with room for `initial_size` allocations before its block
    /// table grows.
    pub fn new(tier: Tier, initial_size: usize) -> Self {
        Self::with_limit(tier, initial_size, None)
    }

    /// Creates an arena that refuses to hold more than `limit` bytes at once.
    pub fn with_limit(tier: Tier, initial_size: usize, limit: Option<usize>) -> Self {
        Self {
            tier,
            generation: 0,
            blocks: Vec::with_capacity(initial_size),
            used: 0,
            limit,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Bytes currently allocated.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of resets performed so far.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Returns a zero-filled allocation of `size` bytes.
    pub fn alloc(&mut self, size: usize) -> Result<ArenaRef, AllocError> {
        self.charge(size)?;
        let mut block = Vec::new();
        block
            .try_reserve_exact(size)
            .map_err(|_| self.out_of_memory(size))?;
        block.resize(size, 0);
        self.blocks
            .try_reserve(1)
            .map_err(|_| self.out_of_memory(size))?;

        let slot = self.blocks.len() as u32;
        self.blocks.push(block);
        self.used += size;
        Ok(ArenaRef {
            tier: self.tier,
            generation: self.generation,
            slot,
        })
    }

    /// Copies `bytes` into a new allocation.
    pub fn alloc_bytes(&mut self, bytes: &[u8]) -> Result<ArenaRef, AllocError> {
        let handle = self.alloc(bytes.len())?;
        self.get_mut(handle)?.copy_from_slice(bytes);
        Ok(handle)
    }

    /// Copies `s` into a new NUL-terminated allocation.
    pub fn alloc_str(&mut self, s: &str) -> Result<ArenaRef, AllocError> {
        let handle = self.alloc(s.len() + 1)?;
        self.get_mut(handle)?[..s.len()].copy_from_slice(s.as_bytes());
        Ok(handle)
    }

    /// Resizes an allocation, keeping its first `min(old, new)` bytes. `None` behaves
    /// like [`alloc`](Self::alloc). On failure the old allocation stays valid.
    pub fn realloc(
        &mut self,
        handle: Option<ArenaRef>,
        new_size: usize,
    ) -> Result<ArenaRef, AllocError> {
        let Some(handle) = handle else {
            return self.alloc(new_size);
        };
        let index = self.index(handle)?;
        let old_size = self.blocks[index].len();
        if new_size > old_size {
            let extra = new_size - old_size;
            self.charge(extra)?;
            let tier = self.tier;
            self.blocks[index]
                .try_reserve_exact(extra)
                .map_err(|_| AllocError::OutOfMemory {
                    tier,
                    requested: new_size,
                })?;
        }
        self.blocks[index].resize(new_size, 0);
        self.used = self.used - old_size + new_size;
        Ok(handle)
    }

    pub fn get(&self, handle: ArenaRef) -> Result<&[u8], AllocError> {
        let index = self.index(handle)?;
        Ok(&self.blocks[index])
    }

    pub fn get_mut(&mut self, handle: ArenaRef) -> Result<&mut [u8], AllocError> {
        let index = self.index(handle)?;
        Ok(&mut self.blocks[index])
    }

    /// Reads a NUL-terminated allocation.
    pub fn get_cstr(&self, handle: ArenaRef) -> Result<&CStr, AllocError> {
        CStr::from_bytes_until_nul(self.get(handle)?)
            .map_err(|_| AllocError::Unterminated { tier: self.tier })
    }

    /// Invalidates every handle issued so far. The block table keeps its capacity.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.blocks.clear();
        self.used = 0;
    }

    /// Releases the arena and everything it holds. Returns the bytes that were still
    /// allocated.
    pub fn destroy(self) -> usize {
        tracing::trace!(tier = ?self.tier, bytes = self.used, blocks = self.blocks.len(), "arena destroyed");
        self.used
    }

    fn index(&self, handle: ArenaRef) -> Result<usize, AllocError> {
        if handle.tier != self.tier {
            return Err(AllocError::WrongTier {
                expected: self.tier,
                found: handle.tier,
            });
        }
        let index = handle.slot as usize;
        if handle.generation != self.generation || index >= self.blocks.len() {
            return Err(AllocError::Stale { tier: self.tier });
        }
        Ok(index)
    }

    fn charge(&self, requested: usize) -> Result<(), AllocError> {
        match self.limit {
            Some(limit) if self.used.saturating_add(requested) > limit => {
                Err(AllocError::LimitExceeded {
                    tier: self.tier,
                    requested,
                    used: self.used,
                    limit,
                })
            }
            _ => Ok(()),
        }
    }

    fn out_of_memory(&self, requested: usize) -> AllocError {
        AllocError::OutOfMemory {
            tier: self.tier,
            requested,
        }
    }
}

/// The three arenas owned by one statement.
#[derive(Debug)]
pub struct Tiers {
    statement: Arena,
    query: Arena,
    result: Arena,
}

impl Tiers {
    pub fn new(config: &ArenaConfig) -> Self {
        Self {
            statement: Arena::with_limit(Tier::Statement, config.initial_size, config.statement),
            query: Arena::with_limit(Tier::Query, config.initial_size, config.query),
            result: Arena::with_limit(Tier::Result, config.initial_size, config.result),
        }
    }

    pub fn arena(&self, tier: Tier) -> &Arena {
        match tier {
            Tier::Statement => &self.statement,
            Tier::Query => &self.query,
            Tier::Result => &self.result,
        }
    }

    pub fn arena_mut(&mut self, tier: Tier) -> &mut Arena {
        match tier {
            Tier::Statement => &mut self.statement,
            Tier::Query => &mut self.query,
            Tier::Result => &mut self.result,
        }
    }

    pub fn get(&self, handle: ArenaRef) -> Result<&[u8], AllocError> {
        self.arena(handle.tier).get(handle)
    }

    pub fn get_mut(&mut self, handle: ArenaRef) -> Result<&mut [u8], AllocError> {
        self.arena_mut(handle.tier).get_mut(handle)
    }

    pub fn get_cstr(&self, handle: ArenaRef) -> Result<&CStr, AllocError> {
        self.arena(handle.tier).get_cstr(handle)
    }

    /// Reads a NUL-terminated allocation as UTF-8, falling back to an empty string.
    pub fn get_str(&self, handle: ArenaRef) -> &str {
        self.get_cstr(handle)
            .ok()
            .and_then(|s| s.to_str().ok())
            .unwrap_or_default()
    }

    pub fn reset(&mut self, tier: Tier) {
        self.arena_mut(tier).reset();
    }

    /// Destroys all three arenas, statement tier last. Returns the bytes released.
    pub fn destroy(self) -> usize {
        self.result.destroy() + self.query.destroy() + self.statement.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_zeroed() {
        let mut arena = Arena::new(Tier::Query, 4);
        let handle = arena.alloc(8).unwrap();
        assert_eq!(arena.get(handle).unwrap(), &[0u8; 8]);
        assert_eq!(arena.used(), 8);
    }

    #[test]
    fn test_alloc_str_is_nul_terminated() {
        let mut arena = Arena::new(Tier::Query, 4);
        let handle = arena.alloc_str("prj_id").unwrap();
        assert_eq!(arena.get(handle).unwrap(), b"prj_id\0");
        assert_eq!(arena.get_cstr(handle).unwrap().to_str().unwrap(), "prj_id");
    }

    #[test]
    fn test_realloc_preserves_prefix() {
        let mut arena = Arena::new(Tier::Result, 4);
        let handle = arena.alloc_bytes(b"abcdef").unwrap();
        let handle = arena.realloc(Some(handle), 10).unwrap();
        assert_eq!(&arena.get(handle).unwrap()[..6], b"abcdef");
        assert_eq!(arena.get(handle).unwrap().len(), 10);

        let handle = arena.realloc(Some(handle), 3).unwrap();
        assert_eq!(arena.get(handle).unwrap(), b"abc");
        assert_eq!(arena.used(), 3);
    }

    #[test]
    fn test_realloc_none_allocates() {
        let mut arena = Arena::new(Tier::Result, 0);
        let handle = arena.realloc(None, 5).unwrap();
        assert_eq!(arena.get(handle).unwrap().len(), 5);
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let mut arena = Arena::new(Tier::Query, 4);
        let handle = arena.alloc_str("gone").unwrap();
        arena.reset();
        assert_eq!(arena.get(handle), Err(AllocError::Stale { tier: Tier::Query }));
        assert!(arena.is_empty());
        assert_eq!(arena.used(), 0);

        // a fresh allocation reuses slot 0 but not the old generation
        let fresh = arena.alloc_str("new").unwrap();
        assert_ne!(fresh, handle);
        assert!(arena.get(handle).is_err());
        assert!(arena.get(fresh).is_ok());
    }

    #[test]
    fn test_limit_is_enforced() {
        let mut arena = Arena::with_limit(Tier::Result, 1, Some(16));
        arena.alloc(10).unwrap();
        let err = arena.alloc(10).unwrap_err();
        assert!(matches!(err, AllocError::LimitExceeded { requested: 10, used: 10, .. }));
    }

    #[test]
    fn test_failed_realloc_keeps_old_allocation() {
        let mut arena = Arena::with_limit(Tier::Result, 1, Some(8));
        let handle = arena.alloc_bytes(b"keep").unwrap();
        assert!(arena.realloc(Some(handle), 64).is_err());
        assert_eq!(arena.get(handle).unwrap(), b"keep");
        assert_eq!(arena.used(), 4);
    }

    #[test]
    fn test_tiers_dispatch_by_handle() {
        let mut tiers = Tiers::new(&ArenaConfig::default());
        let name = tiers.arena_mut(Tier::Statement).alloc_str("id").unwrap();
        let value = tiers.arena_mut(Tier::Query).alloc_str("five").unwrap();

        tiers.reset(Tier::Query);
        assert_eq!(tiers.get_str(name), "id");
        assert!(tiers.get(value).is_err());
    }

    #[test]
    fn test_wrong_tier_is_rejected() {
        let mut query = Arena::new(Tier::Query, 1);
        let result = Arena::new(Tier::Result, 1);
        let handle = query.alloc(1).unwrap();
        assert_eq!(
            result.get(handle),
            Err(AllocError::WrongTier {
                expected: Tier::Result,
                found: Tier::Query
            })
        );
    }

    #[test]
    fn test_destroy_reports_released_bytes() {
        let mut tiers = Tiers::new(&ArenaConfig::default());
        tiers.arena_mut(Tier::Statement).alloc_str("id").unwrap();
        tiers.arena_mut(Tier::Query).alloc(10).unwrap();
        tiers.arena_mut(Tier::Result).alloc_bytes(b"row").unwrap();
        assert_eq!(tiers.destroy(), 3 + 10 + 3);

        let mut arena = Arena::new(Tier::Query, 1);
        arena.alloc(4).unwrap();
        arena.reset();
        assert_eq!(arena.destroy(), 0);
    }
}
