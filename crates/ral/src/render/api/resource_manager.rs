//! Generation-tagged slot allocator
//!
//! `ResourceManager` owns slots, not GPU objects. Destroying a handle
//! recycles its slot immediately; releasing the native object is the
//! device's job and goes through a deletion queue.
//!
//! Generations are never reset. A freed slot keeps its generation until the
//! next `create` bumps it, so every stale handle fails validation instead of
//! aliasing the new occupant. A slot whose generation reaches `u32::MAX` is
//! retired rather than wrapped.

use crate::render::api::handle::{Handle, ResourceKind, SENTINEL};
use crate::render::error::{RalError, RalResult};

struct ResourceSlot<T> {
    resource: Option<T>,
    generation: u32,
}

/// Slot array with a LIFO free-list
pub struct ResourceManager<K: ResourceKind, T> {
    slots: Vec<ResourceSlot<T>>,
    free_list: Vec<u32>,
    live: usize,
    _kind: std::marker::PhantomData<fn() -> K>,
}

impl<K: ResourceKind, T> ResourceManager<K, T> {
    /// Create an empty manager
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            live: 0,
            _kind: std::marker::PhantomData,
        }
    }

    /// Store a resource and return the handle naming this creation
    ///
    /// Reuses the most recently freed index when one exists, otherwise grows
    /// the slot array by one.
    pub fn create(&mut self, resource: T) -> Handle<K> {
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len())
                    .ok()
                    .filter(|&index| index != SENTINEL)
                    .unwrap_or_else(|| panic!("{} slot space exhausted", K::NAME));
                self.slots.push(ResourceSlot { resource: None, generation: 0 });
                index
            }
        };

        let slot = &mut self.slots[index as usize];
        // Starts at 1; only slots below u32::MAX ever reach the free list.
        slot.generation += 1;
        slot.resource = Some(resource);
        self.live += 1;

        Handle::from_raw(index, slot.generation)
    }

    /// Whether the handle names the current occupant of its slot
    pub fn is_valid(&self, handle: Handle<K>) -> bool {
        self.slot(handle).is_some()
    }

    /// Resolve a handle
    pub fn get(&self, handle: Handle<K>) -> RalResult<&T> {
        self.slot(handle)
            .and_then(|slot| slot.resource.as_ref())
            .ok_or_else(|| Self::invalid(handle))
    }

    /// Resolve a handle mutably
    pub fn get_mut(&mut self, handle: Handle<K>) -> RalResult<&mut T> {
        let valid = self.is_valid(handle);
        if !valid {
            return Err(Self::invalid(handle));
        }
        self.slots[handle.index() as usize]
            .resource
            .as_mut()
            .ok_or_else(|| Self::invalid(handle))
    }

    /// Release the slot and hand back the resource it held
    ///
    /// Returns `None` (and does nothing) for stale or sentinel handles, so
    /// destroying twice is harmless.
    pub fn destroy(&mut self, handle: Handle<K>) -> Option<T> {
        if !self.is_valid(handle) {
            return None;
        }

        let slot = &mut self.slots[handle.index() as usize];
        let resource = slot.resource.take();
        self.release(handle.index());
        self.live -= 1;
        resource
    }

    /// Number of live resources
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether no resources are live
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live resources with their handles
    pub fn iter(&self) -> impl Iterator<Item = (Handle<K>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.resource.as_ref().map(|resource| {
                (Handle::from_raw(index as u32, slot.generation), resource)
            })
        })
    }

    /// Remove every live resource, invalidating all outstanding handles
    pub fn drain(&mut self) -> Vec<T> {
        let mut drained = Vec::with_capacity(self.live);
        for index in 0..self.slots.len() {
            if let Some(resource) = self.slots[index].resource.take() {
                drained.push(resource);
                self.release(index as u32);
            }
        }
        self.live = 0;
        drained
    }

    /// Return an emptied slot to the free list unless its generation is spent
    fn release(&mut self, index: u32) {
        if self.slots[index as usize].generation == u32::MAX {
            log::debug!("Retiring {} slot {index}: generation exhausted", K::NAME);
        } else {
            self.free_list.push(index);
        }
    }

    fn slot(&self, handle: Handle<K>) -> Option<&ResourceSlot<T>> {
        if handle.is_sentinel() {
            return None;
        }
        self.slots
            .get(handle.index() as usize)
            .filter(|slot| slot.generation == handle.generation() && slot.resource.is_some())
    }

    fn invalid(handle: Handle<K>) -> RalError {
        RalError::InvalidHandle {
            kind: K::NAME,
            index: handle.index(),
            generation: handle.generation(),
        }
    }
}

impl<K: ResourceKind, T> Default for ResourceManager<K, T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::api::handle::{Buffer, BufferHandle};
    use std::collections::HashSet;

    type Manager = ResourceManager<Buffer, &'static str>;

    #[test]
    fn test_create_and_get() {
        let mut manager = Manager::new();
        let handle = manager.create("vertex");
        assert!(manager.is_valid(handle));
        assert_eq!(*manager.get(handle).unwrap(), "vertex");
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_stale_handle_rejected_after_reuse() {
        let mut manager = Manager::new();
        let old = manager.create("old");
        assert_eq!(manager.destroy(old), Some("old"));
        assert!(!manager.is_valid(old));

        let new = manager.create("new");
        assert_eq!(new.index(), old.index(), "freed index should be reused");
        assert_ne!(new.generation(), old.generation());
        assert!(!manager.is_valid(old));
        assert!(manager.is_valid(new));
        assert!(matches!(
            manager.get(old),
            Err(RalError::InvalidHandle { kind: "buffer", .. })
        ));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let mut manager = Manager::new();
        let handle = manager.create("a");
        assert!(manager.destroy(handle).is_some());
        assert!(manager.destroy(handle).is_none());
        assert!(manager.destroy(BufferHandle::INVALID).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_most_recently_freed_index_reused_first() {
        let mut manager = Manager::new();
        let a = manager.create("a");
        let b = manager.create("b");
        let _c = manager.create("c");
        manager.destroy(a);
        manager.destroy(b);

        assert_eq!(manager.create("d").index(), b.index());
        assert_eq!(manager.create("e").index(), a.index());
        assert_eq!(manager.create("f").index(), 3);
    }

    #[test]
    fn test_out_of_range_and_sentinel_handles() {
        let manager = Manager::new();
        assert!(!manager.is_valid(BufferHandle::from_raw(17, 1)));
        assert!(!manager.is_valid(BufferHandle::INVALID));
        assert!(manager.get(BufferHandle::from_raw(17, 1)).is_err());
    }

    #[test]
    fn test_live_handles_never_collide() {
        // Deterministic create/destroy churn; every live handle must be unique.
        let mut manager = ResourceManager::<Buffer, u32>::new();
        let mut live: Vec<BufferHandle> = Vec::new();
        let mut ever_issued = HashSet::new();
        let mut state = 0x2545_f491_u32;

        for step in 0..2000u32 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;

            if state % 3 == 0 && !live.is_empty() {
                let victim = live.swap_remove((state as usize / 3) % live.len());
                assert!(manager.destroy(victim).is_some());
                assert!(!manager.is_valid(victim));
            } else {
                let handle = manager.create(step);
                assert!(ever_issued.insert(handle), "handle {handle:?} issued twice");
                live.push(handle);
            }

            let unique: HashSet<_> = live.iter().copied().collect();
            assert_eq!(unique.len(), live.len());
        }

        for handle in &live {
            assert!(manager.is_valid(*handle));
        }
        assert_eq!(manager.len(), live.len());
    }

    #[test]
    fn test_exhausted_generation_retires_slot() {
        let mut manager = Manager::new();
        let first = manager.create("a");
        manager.destroy(first);
        manager.slots[first.index() as usize].generation = u32::MAX - 1;

        let last = manager.create("b");
        assert_eq!(last.index(), first.index());
        assert_eq!(last.generation(), u32::MAX);
        manager.destroy(last);

        let next = manager.create("c");
        assert_ne!(next.index(), last.index(), "spent slot must not be reused");
        assert_eq!(next.generation(), 1);
        assert!(!manager.is_valid(last));
        assert!(!manager.is_valid(BufferHandle::from_raw(last.index(), 0)));
        assert!(manager.is_valid(next));
    }

    #[test]
    fn test_drain_invalidates_everything() {
        let mut manager = Manager::new();
        let a = manager.create("a");
        let b = manager.create("b");
        let mut drained = manager.drain();
        drained.sort_unstable();
        assert_eq!(drained, vec!["a", "b"]);
        assert!(!manager.is_valid(a));
        assert!(!manager.is_valid(b));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_iter_yields_live_only() {
        let mut manager = Manager::new();
        let a = manager.create("a");
        let b = manager.create("b");
        manager.destroy(a);
        let items: Vec<_> = manager.iter().collect();
        assert_eq!(items, vec![(b, &"b")]);
    }
}
