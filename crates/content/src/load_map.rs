//! Path-keyed map that loads each key at most once.
//!
//! Every key owns a slot that is either loading or loaded. The first request
//! for a key marks its slot loading and runs the load without holding any
//! lock; later requests for the same key wait on the slot's condvar and reuse
//! the result, while unrelated keys load in parallel. Lookups, counts and
//! draining only read slot states and never wait on a load in flight. A
//! failed load removes its slot and wakes the waiters, which then try again.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ahash::HashMap;

/// How long a waiter sleeps between calls to its idle hook.
const WAIT_SLICE: Duration = Duration::from_millis(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

enum SlotState<T> {
    Loading,
    Loaded(Arc<T>),
    Failed,
}

struct Slot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

impl<T> Slot<T> {
    fn loading() -> Self {
        Slot {
            state: Mutex::new(SlotState::Loading),
            ready: Condvar::new(),
        }
    }

    fn loaded(&self) -> Option<Arc<T>> {
        match &*lock(&self.state) {
            SlotState::Loaded(value) => Some(value.clone()),
            _ => None,
        }
    }

    fn finish(&self, state: SlotState<T>) {
        *lock(&self.state) = state;
        self.ready.notify_all();
    }

    /// Blocks until the load settles, calling `idle` between short waits.
    /// `None` means the load failed.
    fn wait(&self, idle: &dyn Fn()) -> Option<Arc<T>> {
        loop {
            let state = self
                .ready
                .wait_timeout_while(lock(&self.state), WAIT_SLICE, |s| {
                    matches!(s, SlotState::Loading)
                })
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            match &*state {
                SlotState::Loaded(value) => return Some(value.clone()),
                SlotState::Failed => return None,
                SlotState::Loading => {}
            }
            drop(state);
            idle();
        }
    }
}

/// Clears a slot whose load did not complete, including by panicking.
struct PendingLoad<'a, T> {
    map: &'a LoadMap<T>,
    key: &'a str,
    slot: Arc<Slot<T>>,
    completed: bool,
}

impl<T> Drop for PendingLoad<'_, T> {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        {
            let mut slots = lock(&self.map.slots);
            if slots
                .get(self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.slot))
            {
                slots.remove(self.key);
            }
        }
        self.slot.finish(SlotState::Failed);
    }
}

pub(crate) struct LoadMap<T> {
    slots: Mutex<HashMap<String, Arc<Slot<T>>>>,
}

impl<T> Default for LoadMap<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::default()),
        }
    }
}

impl<T> LoadMap<T> {
    /// The loaded value for `key`. A load still in flight reads as absent.
    pub(crate) fn get(&self, key: &str) -> Option<Arc<T>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        slot.loaded()
    }

    /// Returns the value for `key`, running `load` if no other request has.
    /// While another thread's load is in flight the caller waits, running
    /// `idle` regularly so it can service work that load depends on.
    pub(crate) fn get_or_load<E>(
        &self,
        key: &str,
        idle: &dyn Fn(),
        load: impl FnOnce() -> Result<T, E>,
    ) -> Result<Arc<T>, E> {
        loop {
            let (slot, owner) = {
                let mut slots = lock(&self.slots);
                match slots.get(key) {
                    Some(slot) => (slot.clone(), false),
                    None => {
                        let slot = Arc::new(Slot::loading());
                        slots.insert(key.to_owned(), slot.clone());
                        (slot, true)
                    }
                }
            };

            if !owner {
                match slot.wait(idle) {
                    Some(value) => return Ok(value),
                    None => continue,
                }
            }

            let mut pending = PendingLoad {
                map: self,
                key,
                slot,
                completed: false,
            };
            let value = Arc::new(load()?);
            pending.completed = true;
            pending.slot.finish(SlotState::Loaded(value.clone()));
            return Ok(value);
        }
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        let slots: Vec<Arc<Slot<T>>> = lock(&self.slots).values().cloned().collect();
        slots.iter().filter(|slot| slot.loaded().is_some()).count()
    }

    /// Empties the map and hands back the loaded values so they drop outside
    /// the lock. Loads in flight finish for their callers but are not cached.
    pub(crate) fn drain(&self) -> Vec<Arc<T>> {
        let slots: Vec<Arc<Slot<T>>> = lock(&self.slots).drain().map(|(_, slot)| slot).collect();
        slots.iter().filter_map(|slot| slot.loaded()).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use crossbeam_channel::unbounded;

    use super::*;

    fn no_idle() {}

    #[test]
    fn loads_once_per_key() {
        let map: LoadMap<String> = LoadMap::default();
        let calls = AtomicUsize::new(0);
        let load = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>("value".to_string())
        };
        let a = map.get_or_load("a.png", &no_idle, load).unwrap();
        let b = map.get_or_load("a.png", &no_idle, load).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn failed_load_leaves_no_slot() {
        let map: LoadMap<u32> = LoadMap::default();
        for key in ["a", "b", "c"] {
            assert!(map.get_or_load(key, &no_idle, || Err("broken")).is_err());
        }
        assert!(!map.contains("a"));
        assert_eq!(map.len(), 0);
        assert!(lock(&map.slots).is_empty());
        assert_eq!(*map.get_or_load("a", &no_idle, || Ok::<_, ()>(7)).unwrap(), 7);
    }

    #[test]
    fn panicking_load_leaves_no_slot() {
        let map: Arc<LoadMap<u32>> = Arc::default();
        let worker = {
            let map = map.clone();
            thread::spawn(move || {
                let _ = map.get_or_load("a", &no_idle, || -> Result<u32, ()> {
                    panic!("decoder bug")
                });
            })
        };
        assert!(worker.join().is_err());
        assert!(lock(&map.slots).is_empty());
        assert_eq!(*map.get_or_load("a", &no_idle, || Ok::<_, ()>(3)).unwrap(), 3);
    }

    #[test]
    fn concurrent_requests_share_one_load() {
        let map: Arc<LoadMap<usize>> = Arc::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let (map, calls, barrier) = (map.clone(), calls.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    map.get_or_load("walk000.png", &no_idle, || {
                        thread::sleep(Duration::from_millis(20));
                        Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst))
                    })
                    .unwrap()
                })
            })
            .collect();

        let results: Vec<Arc<usize>> = workers.into_iter().map(|w| w.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn reads_do_not_wait_on_loads_in_flight() {
        let map: Arc<LoadMap<u8>> = Arc::default();
        map.get_or_load("done", &no_idle, || Ok::<_, ()>(1)).unwrap();
        let (started_tx, started) = unbounded();
        let (release, release_rx) = unbounded::<()>();

        let loader = {
            let map = map.clone();
            thread::spawn(move || {
                map.get_or_load("slow", &no_idle, || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok::<_, ()>(2)
                })
                .unwrap()
            })
        };
        started.recv().unwrap();

        assert!(map.get("slow").is_none());
        assert!(!map.contains("slow"));
        assert_eq!(map.len(), 1);
        assert_eq!(map.drain().len(), 1);

        release.send(()).unwrap();
        assert_eq!(*loader.join().unwrap(), 2);
        // drained while loading, so never cached
        assert_eq!(map.len(), 0);
    }

    #[test]
    fn waiter_runs_idle_hook_until_load_settles() {
        let map: Arc<LoadMap<u8>> = Arc::default();
        let (started_tx, started) = unbounded();
        let (release, release_rx) = unbounded::<()>();

        let loader = {
            let map = map.clone();
            thread::spawn(move || {
                map.get_or_load("slow", &no_idle, || {
                    started_tx.send(()).unwrap();
                    release_rx.recv().unwrap();
                    Ok::<_, ()>(9)
                })
                .unwrap()
            })
        };
        started.recv().unwrap();

        // the load only finishes once the waiter's idle hook releases it
        let idle_calls = AtomicUsize::new(0);
        let idle = || {
            idle_calls.fetch_add(1, Ordering::SeqCst);
            let _ = release.send(());
        };
        let value = map.get_or_load("slow", &idle, || Ok::<_, ()>(0)).unwrap();

        assert_eq!(*value, 9);
        assert!(idle_calls.load(Ordering::SeqCst) >= 1);
        assert!(Arc::ptr_eq(&value, &loader.join().unwrap()));
    }

    #[test]
    fn drain_empties_map() {
        let map: LoadMap<u8> = LoadMap::default();
        map.get_or_load("a", &no_idle, || Ok::<_, ()>(1)).unwrap();
        map.get_or_load("b", &no_idle, || Ok::<_, ()>(2)).unwrap();
        assert_eq!(map.drain().len(), 2);
        assert_eq!(map.len(), 0);
        assert!(map.get("a").is_none());
    }
}
