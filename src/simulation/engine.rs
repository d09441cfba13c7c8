//! The simulation controller
//!
//! [`Simulator`] runs the step loop on its own thread:
//!
//! 1. honor pause/stop requests (the only safe point),
//! 2. rebuild the Barnes–Hut tree from the galaxy,
//! 3. evaluate forces across the worker pool plus this thread,
//! 4. integrate and check the world bounds,
//! 5. hand the galaxy to the step observer.
//!
//! Other threads drive it through `pause(id)`, `unpause(id)` and `stop()`.
//! The galaxy sits behind a mutex that the loop holds for steps 2–5 only, so
//! a caller that has paused the simulation can read or mutate it freely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{error, info};
use parking_lot::Mutex;

use crate::error::{Result, SimError};
use crate::simulation::barnes_hut::SpatialTree;
use crate::simulation::integrator::integrate;
use crate::simulation::params::{Parameters, TreeLimits};
use crate::simulation::states::Galaxy;
use crate::simulation::sync::{BoundaryAction, Handshake, PauseState, RequesterId, RunState};
use crate::simulation::workers::WorkerPool;

/// Runtime engine settings: threading and tree sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Engine {
    pub workers: usize, // worker threads besides the simulation thread
    pub tree: TreeLimits,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            workers: 3,
            tree: TreeLimits::default(),
        }
    }
}

/// Called on the simulation thread after every completed step.
pub trait StepObserver: Send {
    fn on_step(&mut self, step: u64, galaxy: &Galaxy);
}

impl<F> StepObserver for F
where
    F: FnMut(u64, &Galaxy) + Send,
{
    fn on_step(&mut self, step: u64, galaxy: &Galaxy) {
        self(step, galaxy)
    }
}

pub struct Simulator {
    galaxy: Arc<Mutex<Galaxy>>,
    control: Arc<Handshake>,
    steps: Arc<AtomicU64>,
    thread: Mutex<Option<JoinHandle<Result<()>>>>,
    params: Parameters,
}

impl Simulator {
    /// Start simulating `galaxy` on a new thread.
    pub fn start(galaxy: Galaxy, engine: Engine, params: Parameters) -> Result<Self> {
        Self::spawn(galaxy, engine, params, None)
    }

    /// Like [`Simulator::start`], calling `observer` after every step.
    pub fn start_observed(
        galaxy: Galaxy,
        engine: Engine,
        params: Parameters,
        observer: impl StepObserver + 'static,
    ) -> Result<Self> {
        Self::spawn(galaxy, engine, params, Some(Box::new(observer)))
    }

    fn spawn(
        galaxy: Galaxy,
        engine: Engine,
        params: Parameters,
        observer: Option<Box<dyn StepObserver>>,
    ) -> Result<Self> {
        let tree = SpatialTree::new(params.world_extent, engine.tree);
        let pool = WorkerPool::new(engine.workers, tree)?;

        let galaxy = Arc::new(Mutex::new(galaxy));
        let control = Arc::new(Handshake::new());
        let steps = Arc::new(AtomicU64::new(0));

        let handle = {
            let galaxy = Arc::clone(&galaxy);
            let control = Arc::clone(&control);
            let steps = Arc::clone(&steps);
            thread::Builder::new()
                .name("bh-simulation".into())
                .spawn(move || sim_loop(&galaxy, &control, &steps, pool, &params, observer))?
        };
        info!(
            "simulation started: {} bodies, {} workers, dt = {}",
            galaxy.lock().bodies.len(),
            engine.workers,
            params.dt
        );

        Ok(Self {
            galaxy,
            control,
            steps,
            thread: Mutex::new(Some(handle)),
            params,
        })
    }

    /// Pause the simulation on behalf of `id` and block until it is paused.
    ///
    /// Returns false without blocking when a lower id already holds the
    /// pause or the simulation is stopping. Returns true once `id` owns a
    /// pause that the simulation thread has confirmed.
    pub fn pause(&self, id: RequesterId) -> bool {
        self.control.pause(id)
    }

    /// Release the pause held by `id` and block until the simulation resumes.
    /// A no-op returning false if `id` is not the current owner.
    pub fn unpause(&self, id: RequesterId) -> bool {
        self.control.unpause(id)
    }

    /// Pause for the lifetime of the returned guard.
    pub fn pause_guard(&self, id: RequesterId) -> PauseGuard<'_> {
        let acquired = self.pause(id);
        PauseGuard {
            sim: self,
            id,
            acquired,
        }
    }

    /// Stop the simulation and join its thread and workers.
    ///
    /// Returns the fatal error that ended the run, if any. Stopping is
    /// terminal and idempotent: later calls return `Ok(())`.
    pub fn stop(&self) -> Result<()> {
        self.control.stop();
        let handle = self.thread.lock().take();
        match handle {
            Some(h) => h.join().map_err(|_| SimError::SimulationPanicked)?,
            None => Ok(()),
        }
    }

    pub fn state(&self) -> RunState {
        self.control.run_state()
    }

    pub fn pause_state(&self) -> PauseState {
        self.control.snapshot()
    }

    /// Completed steps since start.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Acquire)
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Run `f` on the galaxy between steps.
    ///
    /// Mutating callers should hold a pause, so the change lands at a known
    /// step boundary. Without one this still never races a step: it waits for
    /// the step in flight to finish.
    pub fn with_galaxy<R>(&self, f: impl FnOnce(&mut Galaxy) -> R) -> R {
        f(&mut self.galaxy.lock())
    }

    /// Owned copy of the galaxy as of the last completed step.
    pub fn snapshot(&self) -> Galaxy {
        self.galaxy.lock().clone()
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("simulation ended with error: {e}");
        }
    }
}

/// Holds a pause until dropped.
pub struct PauseGuard<'a> {
    sim: &'a Simulator,
    id: RequesterId,
    acquired: bool,
}

impl PauseGuard<'_> {
    /// False when the pause was outranked or the simulation had stopped.
    pub fn acquired(&self) -> bool {
        self.acquired
    }
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        if self.acquired {
            self.sim.unpause(self.id);
        }
    }
}

/// Marks the simulation stopped when the loop exits, including by panic.
struct FinishOnDrop<'a>(&'a Handshake);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish();
    }
}

fn sim_loop(
    galaxy: &Mutex<Galaxy>,
    control: &Handshake,
    steps: &AtomicU64,
    pool: WorkerPool,
    params: &Parameters,
    mut observer: Option<Box<dyn StepObserver>>,
) -> Result<()> {
    // Declared before the pool so an unwinding loop joins the workers first
    let _finish = FinishOnDrop(control);
    let mut pool = pool;

    let result = loop {
        if control.boundary() == BoundaryAction::Stop {
            break Ok(());
        }

        let mut g = galaxy.lock();
        if let Err(e) = evaluate_forces(&mut g, &pool, params) {
            error!("simulation halted: {e}");
            break Err(e);
        }

        // A diverged step still moved every body, so it counts and is observed
        let integrated = integrate(&mut g, params.dt);
        let n = steps.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(obs) = observer.as_mut() {
            obs.on_step(n, &g);
        }
        if let Err(e) = integrated {
            error!("simulation halted: {e}");
            break Err(e);
        }
    };

    let joined = pool.shutdown();
    info!("simulation stopped after {} steps", steps.load(Ordering::Acquire));
    result.and(joined)
}

fn evaluate_forces(g: &mut Galaxy, pool: &WorkerPool, params: &Parameters) -> Result<()> {
    pool.rebuild(&g.bodies)?;
    pool.compute(&mut g.bodies, params)
}

/// One full step: tree, forces, integration.
pub fn step(g: &mut Galaxy, pool: &WorkerPool, params: &Parameters) -> Result<()> {
    evaluate_forces(g, pool, params)?;
    integrate(g, params.dt)
}
