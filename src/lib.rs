pub mod simulation;
pub mod configuration;
pub mod benchmark;
pub mod error;

pub use simulation::states::{Body, Galaxy, Vector, Rgb, WorldBounds, BoundsPolicy, BoundsCheck};
pub use simulation::params::{Parameters, TreeLimits};
pub use simulation::barnes_hut::{SpatialTree, QuadNode, Slot};
pub use simulation::forces::{softened_pull, direct_accelerations};
pub use simulation::integrator::{advance_body, integrate};
pub use simulation::sync::{Countdown, Handshake, PauseState, RequesterId, RunState};
pub use simulation::workers::WorkerPool;
pub use simulation::engine::{Engine, Simulator, PauseGuard, StepObserver};
pub use simulation::scenario::Scenario;

pub use configuration::config::{SimConfig, EngineConfig, ParametersConfig};
pub use configuration::ingest::{ingest_reader, ingest_str, Ingested, View};

pub use error::SimError;

pub use benchmark::benchmark::{bench_gravity, bench_workers, bench_gravity_curve};
