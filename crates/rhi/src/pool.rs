//! Command-list pooling and parallel recording.

use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::command::CommandList;
use crate::desc::CommandListKind;
use crate::device::Device;
use crate::error::RhiError;
use crate::sync::lock;

/// A list handed out by a [`CommandListPool`]. Give it back with
/// [`CommandListPool::release`].
pub struct PooledList<B: Backend> {
    index: usize,
    list: Arc<Mutex<CommandList<B>>>,
}

impl<B: Backend> PooledList<B> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn list(&self) -> &Arc<Mutex<CommandList<B>>> {
        &self.list
    }

    /// Runs `f` with the list locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut CommandList<B>) -> R) -> R {
        f(&mut lock(&self.list))
    }
}

struct PoolInner<B: Backend> {
    lists: Vec<Arc<Mutex<CommandList<B>>>>,
    free: Vec<usize>,
    acquired: usize,
}

/// Lazily-growing pool of command lists of one kind.
///
/// `acquire`, `release` and the counters are safe from any thread. `reset`
/// takes `&mut self`, so it cannot race with outstanding recorders.
pub struct CommandListPool<B: Backend> {
    kind: CommandListKind,
    heap_id: u32,
    max_lists: usize,
    inner: Mutex<PoolInner<B>>,
}

impl<B: Backend> CommandListPool<B> {
    pub(crate) fn new(kind: CommandListKind, heap_id: u32, max_lists: usize) -> Self {
        Self {
            kind,
            heap_id,
            max_lists,
            inner: Mutex::new(PoolInner { lists: Vec::new(), free: Vec::new(), acquired: 0 }),
        }
    }

    pub fn kind(&self) -> CommandListKind {
        self.kind
    }

    pub fn max_lists(&self) -> usize {
        self.max_lists
    }

    /// A free list, a new one if below capacity, or `None` when saturated.
    pub fn acquire(&self) -> Option<PooledList<B>> {
        let mut inner = lock(&self.inner);
        let index = match inner.free.pop() {
            Some(index) => index,
            None if inner.lists.len() < self.max_lists => {
                let index = inner.lists.len();
                let label = format!("{:?}_pool_{index}", self.kind);
                inner.lists.push(Arc::new(Mutex::new(CommandList::new(self.kind, self.heap_id, label))));
                index
            }
            None => return None,
        };
        inner.acquired += 1;
        Some(PooledList { index, list: Arc::clone(&inner.lists[index]) })
    }

    pub fn release(&self, list: PooledList<B>) {
        let mut inner = lock(&self.inner);
        if inner.free.contains(&list.index) {
            tracing::warn!(index = list.index, "command list released twice");
            return;
        }
        inner.free.push(list.index);
        inner.acquired -= 1;
    }

    pub fn acquired_count(&self) -> usize {
        lock(&self.inner).acquired
    }

    pub fn free_count(&self) -> usize {
        lock(&self.inner).free.len()
    }

    pub fn total_count(&self) -> usize {
        lock(&self.inner).lists.len()
    }

    /// Returns every outstanding list to the free set.
    pub fn reset(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|p| p.into_inner());
        inner.free = (0..inner.lists.len()).rev().collect();
        inner.acquired = 0;
    }
}

/// Per-worker command lists drawn from a pool for one frame.
pub struct ParallelRecordingContext<'a, B: Backend> {
    pool: &'a CommandListPool<B>,
    lists: Vec<Option<PooledList<B>>>,
}

impl<'a, B: Backend> ParallelRecordingContext<'a, B> {
    pub fn new(pool: &'a CommandListPool<B>, workers: usize) -> Self {
        Self { pool, lists: (0..workers).map(|_| None).collect() }
    }

    /// The list for worker `index`, acquired and begun on first use. `None`
    /// when the pool is saturated.
    pub fn get_or_create(&mut self, index: usize) -> Option<Arc<Mutex<CommandList<B>>>> {
        if index >= self.lists.len() {
            self.lists.resize_with(index + 1, || None);
        }
        if self.lists[index].is_none() {
            let pooled = self.pool.acquire()?;
            pooled.with(|list| list.begin());
            self.lists[index] = Some(pooled);
        }
        self.lists[index].as_ref().map(|p| Arc::clone(p.list()))
    }

    pub fn active_count(&self) -> usize {
        self.lists.iter().filter(|l| l.is_some()).count()
    }

    /// Closes every list that is still recording.
    pub fn finalize(&mut self) -> Result<(), RhiError> {
        for pooled in self.lists.iter().flatten() {
            pooled.with(|list| {
                if list.state() == crate::command::CommandListState::Recording {
                    list.end()
                } else {
                    Ok(())
                }
            })?;
        }
        Ok(())
    }

    /// Submits the lists in worker-index order.
    pub fn submit(&self, device: &Device<B>) -> Result<u64, RhiError> {
        let mut guards: Vec<_> = self.lists.iter().flatten().map(|p| lock(p.list())).collect();
        let mut refs: Vec<&mut CommandList<B>> = guards.iter_mut().map(|g| &mut **g).collect();
        device.submit(&mut refs)
    }

    /// Returns all lists to the pool.
    pub fn release(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        for pooled in self.lists.iter_mut().filter_map(Option::take) {
            self.pool.release(pooled);
        }
    }
}

impl<B: Backend> Drop for ParallelRecordingContext<'_, B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDesc;
    use crate::headless::HeadlessBackend;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), &DeviceDesc::default())
    }

    #[test]
    fn pool_grows_lazily_up_to_capacity() {
        let device = device();
        let pool = device.create_command_list_pool(CommandListKind::Graphics, 2);
        assert_eq!(pool.total_count(), 0);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert_eq!((pool.acquired_count(), pool.free_count(), pool.total_count()), (2, 0, 2));
        pool.release(a);
        assert_eq!((pool.acquired_count(), pool.free_count()), (1, 1));
        let c = pool.acquire().unwrap();
        assert_eq!(pool.total_count(), 2);
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.acquired_count() + pool.free_count(), pool.total_count());
    }

    #[test]
    fn reset_frees_everything() {
        let device = device();
        let mut pool = device.create_command_list_pool(CommandListKind::Graphics, 4);
        let held: Vec<_> = (0..3).filter_map(|_| pool.acquire()).collect();
        assert_eq!(held.len(), 3);
        drop(held);
        pool.reset();
        assert_eq!((pool.acquired_count(), pool.free_count(), pool.total_count()), (0, 3, 3));
    }

    #[test]
    fn parallel_context_submits_in_worker_order() {
        let device = device();
        let pool = device.create_command_list_pool(CommandListKind::Graphics, 4);
        {
            let mut ctx = ParallelRecordingContext::new(&pool, 3);
            for worker in [2, 0] {
                let list = ctx.get_or_create(worker).unwrap();
                lock(&list).debug_delay(std::time::Duration::from_millis(1));
            }
            assert_eq!(ctx.active_count(), 2);
            ctx.finalize().unwrap();
            let serial = ctx.submit(&device).unwrap();
            device.backend().wait_serial(serial);
            assert_eq!(device.backend().stats().command_lists, 2);
        }
        assert_eq!(pool.acquired_count(), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn saturated_pool_yields_none_to_workers() {
        let device = device();
        let pool = device.create_command_list_pool(CommandListKind::Graphics, 1);
        let mut ctx = ParallelRecordingContext::new(&pool, 2);
        assert!(ctx.get_or_create(0).is_some());
        assert!(ctx.get_or_create(1).is_none());
        ctx.release();
        assert_eq!(pool.acquired_count(), 0);
    }
}
