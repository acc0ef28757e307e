//! Reuse pool for entities that are created and destroyed every few frames.
//!
//! Instances live in slots owned by the pool. Callers hold a `PoolHandle`
//! while an instance is active and hand it back with `release`, which runs
//! the type's `Poolable::reset` before the slot goes back on the idle list.

/// Typed reset contract for pooled entities.
pub trait Poolable {
    /// Restore inert defaults before the instance is reused.
    fn reset(&mut self);

    /// Free anything the instance holds. Called once per instance by `dispose`.
    fn dispose(&mut self) {}
}

/// Opaque reference to an active pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolHandle(usize);

pub struct EntityPool<T: Poolable> {
    slots: Vec<T>,
    idle: Vec<usize>,
    /// Per-slot active flag, used to catch double releases
    active: Vec<bool>,
    active_count: usize,
}

impl<T: Poolable> EntityPool<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            idle: Vec::new(),
            active: Vec::new(),
            active_count: 0,
        }
    }

    /// Construct `count` idle instances up front.
    pub fn prewarm(&mut self, count: usize, mut make: impl FnMut() -> T) {
        self.slots.reserve(count);
        for _ in 0..count {
            let index = self.slots.len();
            self.slots.push(make());
            self.active.push(false);
            self.idle.push(index);
        }
    }

    /// Hand out an idle instance, or build a new one with `make` when the
    /// idle list is empty. The pool grows without bound.
    pub fn acquire_with(&mut self, make: impl FnOnce() -> T) -> PoolHandle {
        let index = match self.idle.pop() {
            Some(index) => index,
            None => {
                let index = self.slots.len();
                self.slots.push(make());
                self.active.push(false);
                tracing::debug!("Pool miss, grew to {} instances", self.slots.len());
                index
            }
        };
        self.active[index] = true;
        self.active_count += 1;
        PoolHandle(index)
    }

    /// Return an instance to the pool. Releasing a handle that is not active
    /// is logged and ignored. Returns whether the release took effect.
    pub fn release(&mut self, handle: PoolHandle) -> bool {
        let PoolHandle(index) = handle;
        if !self.is_active(handle) {
            tracing::warn!("Ignoring release of unmanaged pool slot {}", index);
            return false;
        }
        self.slots[index].reset();
        self.active[index] = false;
        self.active_count -= 1;
        self.idle.push(index);
        true
    }

    /// Run the disposal hook on every instance and forget all of them.
    /// Outstanding handles become invalid.
    pub fn dispose(&mut self) {
        for slot in &mut self.slots {
            slot.dispose();
        }
        self.slots.clear();
        self.idle.clear();
        self.active.clear();
        self.active_count = 0;
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        if self.is_active(handle) {
            self.slots.get(handle.0)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        if self.is_active(handle) {
            self.slots.get_mut(handle.0)
        } else {
            None
        }
    }

    pub fn is_active(&self, handle: PoolHandle) -> bool {
        self.active.get(handle.0).copied().unwrap_or(false)
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Instances ever constructed since the last `dispose`.
    pub fn total_created(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Poolable + Default> EntityPool<T> {
    pub fn acquire(&mut self) -> PoolHandle {
        self.acquire_with(T::default)
    }
}

impl<T: Poolable> Default for EntityPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::cell::Cell;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[derive(Default)]
    struct Spark {
        value: u32,
        resets: u32,
        disposed: Option<Rc<Cell<usize>>>,
    }

    impl Poolable for Spark {
        fn reset(&mut self) {
            self.value = 0;
            self.resets += 1;
        }

        fn dispose(&mut self) {
            if let Some(counter) = &self.disposed {
                counter.set(counter.get() + 1);
            }
        }
    }

    #[test]
    fn acquire_on_empty_pool_constructs() {
        let mut pool: EntityPool<Spark> = EntityPool::new();
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a, b);
        assert_eq!(pool.total_created(), 2);
        assert_eq!(pool.active_count(), 2);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn release_resets_and_reuses_instance() {
        let mut pool: EntityPool<Spark> = EntityPool::new();
        let h = pool.acquire();
        pool.get_mut(h).unwrap().value = 7;
        assert!(pool.release(h));
        assert_eq!(pool.idle_count(), 1);

        let h2 = pool.acquire();
        assert_eq!(h, h2);
        let spark = pool.get(h2).unwrap();
        assert_eq!(spark.value, 0);
        assert_eq!(spark.resets, 1);
        assert_eq!(pool.total_created(), 1);
    }

    #[test]
    fn double_release_is_ignored() {
        let mut pool: EntityPool<Spark> = EntityPool::new();
        let h = pool.acquire();
        assert!(pool.release(h));
        assert!(!pool.release(h));
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.active_count(), 0);
        assert_eq!(pool.get(h).map(|s| s.resets), None);
    }

    #[test]
    fn release_of_foreign_handle_is_ignored() {
        let mut pool: EntityPool<Spark> = EntityPool::new();
        let mut other: EntityPool<Spark> = EntityPool::new();
        other.acquire();
        let foreign = other.acquire();
        assert!(!pool.release(foreign));
        assert_eq!(pool.total_created(), 0);
    }

    #[test]
    fn prewarm_fills_idle_list() {
        let mut pool: EntityPool<Spark> = EntityPool::new();
        pool.prewarm(5, Spark::default);
        assert_eq!(pool.idle_count(), 5);
        pool.acquire();
        assert_eq!(pool.total_created(), 5);
        assert_eq!(pool.idle_count(), 4);
    }

    #[test]
    fn dispose_runs_hook_on_idle_and_active() {
        let counter = Rc::new(Cell::new(0));
        let mut pool: EntityPool<Spark> = EntityPool::new();
        let make = || Spark {
            disposed: Some(counter.clone()),
            ..Default::default()
        };
        let a = pool.acquire_with(make);
        pool.acquire_with(make);
        pool.acquire_with(make);
        pool.release(a);

        pool.dispose();
        assert_eq!(counter.get(), 3);
        assert_eq!(pool.total_created(), 0);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.active_count(), 0);
        assert!(pool.get(a).is_none());
    }

    #[test]
    fn idle_plus_active_equals_created_for_random_sequences() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut pool: EntityPool<Spark> = EntityPool::new();
        let mut held: Vec<PoolHandle> = Vec::new();

        for _ in 0..2000 {
            if held.is_empty() || rng.gen_bool(0.55) {
                held.push(pool.acquire());
            } else {
                let idx = rng.gen_range(0..held.len());
                let h = held.swap_remove(idx);
                assert!(pool.release(h));
            }

            assert_eq!(pool.idle_count() + pool.active_count(), pool.total_created());
            assert_eq!(pool.active_count(), held.len());

            let live: HashSet<PoolHandle> = held.iter().copied().collect();
            assert_eq!(live.len(), held.len(), "handle handed out twice");
            for h in &held {
                assert!(pool.is_active(*h));
            }
        }
    }
}
