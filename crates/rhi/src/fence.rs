//! Monotonic 64-bit fences mapped onto backend submission serials.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::Backend;
use crate::sync::lock;

pub struct Fence<B: Backend> {
    backend: Arc<B>,
    completed: AtomicU64,
    /// `(value, serial)` pairs signalled on the queue and not yet observed retired.
    pending: Mutex<VecDeque<(u64, u64)>>,
}

impl<B: Backend> Fence<B> {
    pub(crate) fn new(backend: Arc<B>, initial: u64) -> Self {
        Self { backend, completed: AtomicU64::new(initial), pending: Mutex::new(VecDeque::new()) }
    }

    /// Queue-side signal: `value` completes once everything submitted so far
    /// has retired.
    pub(crate) fn signal_on_queue(&self, value: u64) {
        let serial = self.backend.last_submitted_serial();
        if serial <= self.backend.completed_serial() {
            self.completed.fetch_max(value, Ordering::AcqRel);
            return;
        }
        lock(&self.pending).push_back((value, serial));
    }

    /// CPU-side signal: sets the completed value immediately.
    pub fn signal(&self, value: u64) {
        self.completed.fetch_max(value, Ordering::AcqRel);
    }

    fn retire(&self, completed_serial: u64) {
        let mut pending = lock(&self.pending);
        while let Some(&(value, serial)) = pending.front() {
            if serial > completed_serial {
                break;
            }
            self.completed.fetch_max(value, Ordering::AcqRel);
            pending.pop_front();
        }
    }

    pub fn completed_value(&self) -> u64 {
        self.retire(self.backend.completed_serial());
        self.completed.load(Ordering::Acquire)
    }

    /// Blocks until the fence reaches `value` and returns true. Returns false
    /// without blocking if no signal for `value` was ever queued.
    pub fn wait(&self, value: u64) -> bool {
        if self.completed_value() >= value {
            return true;
        }
        let serial = lock(&self.pending).iter().find(|&&(v, _)| v >= value).map(|&(_, s)| s);
        match serial {
            Some(serial) => {
                self.backend.wait_serial(serial);
                self.retire(self.backend.completed_serial().max(serial));
                self.completed.load(Ordering::Acquire) >= value
            }
            None => {
                tracing::warn!(value, completed = self.completed.load(Ordering::Acquire), "fence wait on a value that was never signalled");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::desc::CommandListKind;
    use crate::device::{Device, DeviceDesc};
    use crate::headless::HeadlessBackend;

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(), &DeviceDesc::default())
    }

    #[test]
    fn cpu_signal_is_immediate_and_monotonic() {
        let device = device();
        let fence = device.create_fence(3);
        assert_eq!(fence.completed_value(), 3);
        fence.signal(7);
        fence.signal(5);
        assert_eq!(fence.completed_value(), 7);
    }

    #[test]
    fn queue_signal_on_an_idle_queue_completes_at_once() {
        let device = device();
        let fence = device.create_fence(0);
        device.signal_fence(&fence, 1);
        assert_eq!(fence.completed_value(), 1);
    }

    #[test]
    fn queue_signal_waits_for_prior_work() {
        let device = device();
        let mut list = device.create_command_list(CommandListKind::Graphics, "slow");
        list.begin();
        list.debug_delay(Duration::from_millis(50));
        list.end().unwrap();
        device.submit_one(&mut list).unwrap();

        let fence = device.create_fence(0);
        device.signal_fence(&fence, 1);
        assert!(fence.wait(1));
        assert!(fence.completed_value() >= 1);
        assert_eq!(device.backend().stats().submissions, 1);
    }

    #[test]
    fn waiting_on_an_unsignalled_value_reports_it() {
        let device = device();
        let fence = device.create_fence(0);
        assert!(!fence.wait(10));
        assert_eq!(fence.completed_value(), 0);
        fence.signal(10);
        assert!(fence.wait(10));
    }
}
