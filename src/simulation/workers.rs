//! Persistent worker threads for the per-step force evaluation.
//!
//! The pool owns the [`SpatialTree`] behind a read/write lock: the simulation
//! thread rebuilds it while every worker is idle, then workers only read it.
//! Each step the body list is split into `workers + 1` contiguous ranges; the
//! workers take the first `workers` ranges, the calling thread computes the
//! last one itself. Workers write into their own result buffer, which the
//! caller copies into `next_acceleration` once the countdown reaches zero.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error, info};
use parking_lot::{Condvar, Mutex, RwLock};

use crate::error::{Result, SimError};
use crate::simulation::barnes_hut::SpatialTree;
use crate::simulation::params::Parameters;
use crate::simulation::states::{Body, Vector};
use crate::simulation::sync::Countdown;

/// Split `n` items into `parts` contiguous ranges whose sizes differ by at most one.
/// The first `n % parts` ranges get the extra item.
pub fn partition(n: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let base = n / parts;
    let extra = n % parts;
    let mut start = 0;
    (0..parts)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let r = start..start + len;
            start += len;
            r
        })
        .collect()
}

#[derive(Debug, Default)]
struct Job {
    range: Range<usize>,
    params: Parameters,
    out: Vec<Vector>,
}

#[derive(Debug, Default)]
struct WorkerSlot {
    wake: Mutex<bool>,
    cv: Condvar,
    job: Mutex<Job>,
}

#[derive(Debug)]
struct Shared {
    tree: RwLock<SpatialTree>,
    slots: Vec<WorkerSlot>,
    done: Countdown,
    terminate: AtomicBool,
    panicked: AtomicUsize, // id of the first worker that panicked, NO_PANIC otherwise
}

const NO_PANIC: usize = usize::MAX;

impl Shared {
    fn check_panicked(&self) -> Result<()> {
        match self.panicked.load(Ordering::Acquire) {
            NO_PANIC => Ok(()),
            worker => Err(SimError::WorkerPanicked { worker }),
        }
    }
}

/// Counts a worker's arrival on drop, also when its job panics.
struct Arrival<'a> {
    id: usize,
    shared: &'a Shared,
}

impl Drop for Arrival<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("worker {} panicked during force evaluation", self.id);
            let _ = self.shared.panicked.compare_exchange(
                NO_PANIC,
                self.id,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
        self.shared.done.count_down();
    }
}

/// Fixed set of force-evaluation threads.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` threads sharing `tree`. Zero workers is allowed: the
    /// calling thread then does all the work.
    pub fn new(workers: usize, tree: SpatialTree) -> Result<Self> {
        let shared = Arc::new(Shared {
            tree: RwLock::new(tree),
            slots: (0..workers).map(|_| WorkerSlot::default()).collect(),
            done: Countdown::new(),
            terminate: AtomicBool::new(false),
            panicked: AtomicUsize::new(NO_PANIC),
        });

        let mut pool = Self {
            shared,
            handles: Vec::with_capacity(workers),
        };
        for id in 0..workers {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("bh-worker-{id}"))
                .spawn(move || worker_loop(id, &shared))?;
            pool.handles.push(handle);
        }
        info!("worker pool started with {workers} workers");
        Ok(pool)
    }

    pub fn workers(&self) -> usize {
        self.shared.slots.len()
    }

    /// Number of worker threads not yet joined.
    pub fn live_workers(&self) -> usize {
        self.handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Rebuild the shared tree over `bodies`. Must not overlap with `compute`.
    pub fn rebuild(&self, bodies: &[Body]) -> Result<()> {
        self.shared.tree.write().build(bodies)
    }

    /// Read access to the tree, e.g. for probing the field between steps.
    pub fn with_tree<R>(&self, f: impl FnOnce(&SpatialTree) -> R) -> R {
        f(&self.shared.tree.read())
    }

    /// Evaluate `next_acceleration` for every body against the current tree.
    ///
    /// Dispatches one range per worker, computes the last range on the calling
    /// thread, waits for the countdown, then gathers the worker results.
    /// `bodies` must be the slice the tree was last built from.
    ///
    /// # Errors
    /// [`SimError::WorkerPanicked`] if a worker panicked, in this call or an
    /// earlier one. The pool cannot compute again after that.
    pub fn compute(&self, bodies: &mut [Body], params: &Parameters) -> Result<()> {
        let shared = &*self.shared;
        shared.check_panicked()?;
        let ranges = partition(bodies.len(), shared.slots.len() + 1);

        shared.done.arm(shared.slots.len());
        for (slot, range) in shared.slots.iter().zip(ranges.iter()) {
            {
                let mut job = slot.job.lock();
                job.range = range.clone();
                job.params = *params;
            }
            *slot.wake.lock() = true;
            slot.cv.notify_one();
        }

        // our own share
        let own = ranges[ranges.len() - 1].clone();
        {
            let tree = shared.tree.read();
            for i in own {
                bodies[i].next_acceleration = tree.force_on(i, params);
            }
        }

        shared.done.wait();
        shared.check_panicked()?;

        for slot in &shared.slots {
            let job = slot.job.lock();
            for (i, a) in job.range.clone().zip(job.out.iter()) {
                bodies[i].next_acceleration = *a;
            }
        }
        Ok(())
    }

    /// Raise the terminate flag, wake every worker and join them all.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.handles.is_empty() {
            return Ok(());
        }
        self.shared.terminate.store(true, Ordering::Release);
        for slot in &self.shared.slots {
            *slot.wake.lock() = true;
            slot.cv.notify_one();
        }

        let mut result = Ok(());
        for (id, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                result = Err(SimError::WorkerPanicked { worker: id });
            }
        }
        info!("worker pool shut down");
        result
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

fn worker_loop(id: usize, shared: &Shared) {
    let slot = &shared.slots[id];
    loop {
        {
            let mut go = slot.wake.lock();
            while !*go {
                slot.cv.wait(&mut go);
            }
            *go = false;
        }
        if shared.terminate.load(Ordering::Acquire) {
            debug!("worker {id} exiting");
            return;
        }

        let _arrival = Arrival { id, shared };
        let tree = shared.tree.read();
        let mut job = slot.job.lock();
        let Job { range, params, out } = &mut *job;
        out.clear();
        out.extend(range.clone().map(|i| tree.force_on(i, params)));
    }
}
