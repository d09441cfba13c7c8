use galaxysim::simulation::engine::step;
use galaxysim::{
    direct_accelerations, Body, BoundsPolicy, Engine, Galaxy, Parameters, RunState, SimError,
    Simulator, SpatialTree, TreeLimits, Vector, WorkerPool, WorldBounds,
};

use approx::assert_relative_eq;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Deterministic scatter of `n` bodies inside a 500-unit box, no rand needed
pub fn scattered_bodies(n: usize) -> Vec<Body> {
    (0..n)
        .map(|i| {
            let i_f = i as f64;
            let x = (i_f * 0.37).sin() * 480.0;
            let y = (i_f * 0.13 + 1.0).cos() * 480.0;
            Body::new(1.0 + (i % 7) as f64, Vector::new(x, y), Vector::zeros(), 2.0)
        })
        .collect()
}

/// Default physics parameters for tests
pub fn test_params() -> Parameters {
    Parameters {
        dt: 0.1,
        g: 1.0,
        eps: 500.0,
        theta: 1.0,
        world_extent: 1000.0,
        bounds: BoundsPolicy::Clamp,
    }
}

pub fn tree_forces(bodies: &[Body], params: &Parameters, limits: TreeLimits) -> Vec<Vector> {
    let mut tree = SpatialTree::new(params.world_extent, limits);
    tree.build(bodies).unwrap();
    (0..bodies.len()).map(|i| tree.force_on(i, params)).collect()
}

pub fn galaxy_of(bodies: Vec<Body>, params: &Parameters) -> Galaxy {
    let mut g = Galaxy::new(params.world_bounds());
    for b in bodies {
        g.push(b);
    }
    g
}

/// Spin until `cond` holds, failing the test after a generous timeout
pub fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < Duration::from_secs(20), "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}

fn engine(workers: usize) -> Engine {
    Engine { workers, ..Engine::default() }
}

// ==================================================================================
// Barnes-Hut tests
// ==================================================================================

#[test]
fn theta_zero_matches_direct_summation() {
    let bodies = scattered_bodies(120);
    let params = Parameters { theta: 0.0, ..test_params() };

    let exact = direct_accelerations(&bodies, params.g, params.eps);
    let approx = tree_forces(&bodies, &params, TreeLimits::default());

    for (a, b) in exact.iter().zip(approx.iter()) {
        assert!((a - b).norm() <= 1e-9 * a.norm().max(1e-12), "tree {:?} vs direct {:?}", b, a);
    }
}

#[test]
fn default_theta_stays_close_to_direct_summation() {
    let bodies = scattered_bodies(300);
    let params = Parameters { theta: 0.5, ..test_params() };

    let exact = direct_accelerations(&bodies, params.g, params.eps);
    let approx = tree_forces(&bodies, &params, TreeLimits::default());

    let err: f64 = exact.iter().zip(approx.iter()).map(|(a, b)| (a - b).norm()).sum();
    let scale: f64 = exact.iter().map(|a| a.norm()).sum();
    assert!(err / scale < 0.05, "mean relative error {}", err / scale);
}

#[test]
fn two_bodies_pull_equal_and_opposite_for_any_theta() {
    let bodies = vec![
        Body::new(2.0, Vector::new(-3.0, 1.0), Vector::zeros(), 1.0),
        Body::new(5.0, Vector::new(40.0, -7.0), Vector::zeros(), 1.0),
    ];
    for theta in [0.0, 0.5, 1.0, 5.0] {
        let params = Parameters { theta, eps: 10.0, ..test_params() };
        let acc = tree_forces(&bodies, &params, TreeLimits::default());

        let fa = acc[0] * bodies[0].mass;
        let fb = acc[1] * bodies[1].mass;
        assert_relative_eq!(fa.x, -fb.x, max_relative = 1e-12);
        assert_relative_eq!(fa.y, -fb.y, max_relative = 1e-12);
        assert!(acc[0].dot(&(bodies[1].position - bodies[0].position)) > 0.0, "not attractive");
    }
}

#[test]
fn rebuilding_from_the_same_bodies_is_deterministic() {
    let bodies = scattered_bodies(200);
    let params = test_params();
    let first = tree_forces(&bodies, &params, TreeLimits::default());
    let second = tree_forces(&bodies, &params, TreeLimits::default());
    assert_eq!(first, second);

    // reused tree gives the same answers as a fresh one
    let mut tree = SpatialTree::new(params.world_extent, TreeLimits::default());
    tree.build(&scattered_bodies(50)).unwrap();
    tree.build(&bodies).unwrap();
    let reused: Vec<Vector> = (0..bodies.len()).map(|i| tree.force_on(i, &params)).collect();
    assert_eq!(first, reused);
}

#[test]
fn pool_growth_does_not_lose_bodies() {
    let bodies = scattered_bodies(250);
    let params = test_params();

    let roomy = TreeLimits { initial_nodes: 8192, ..TreeLimits::default() };
    let tight = TreeLimits { initial_nodes: 1, ..TreeLimits::default() };

    let mut tree = SpatialTree::new(params.world_extent, tight);
    tree.build(&bodies).unwrap();
    assert!(tree.pool().times_grown() > 0);
    assert!(tree.pool().capacity() >= tree.pool().in_use());

    let grown: Vec<Vector> = (0..bodies.len()).map(|i| tree.force_on(i, &params)).collect();
    assert_eq!(grown, tree_forces(&bodies, &params, roomy));

    let total: f64 = bodies.iter().map(|b| b.mass).sum();
    assert_relative_eq!(tree.aggregate().0, total, max_relative = 1e-12);
}

#[test]
fn exhausting_the_pool_is_reported() {
    let params = test_params();
    let limits = TreeLimits { initial_nodes: 2, max_nodes: 4, max_depth: 48 };
    let mut tree = SpatialTree::new(params.world_extent, limits);
    let err = tree.build(&scattered_bodies(100)).unwrap_err();
    assert!(matches!(err, SimError::NodePoolExhausted { ceiling: 4 }));
}

#[test]
fn coincident_bodies_do_not_recurse_forever() {
    let params = test_params();
    let bodies: Vec<Body> = (0..10)
        .map(|_| Body::new(1.0, Vector::new(5.0, 5.0), Vector::zeros(), 1.0))
        .collect();
    let forces = tree_forces(&bodies, &params, TreeLimits::default());
    assert!(forces.iter().all(|a| a.norm() < 1e-12));
}

// ==================================================================================
// Square scenario
// ==================================================================================

fn square(params: &Parameters) -> Galaxy {
    let corners = [(-10.0, -10.0), (10.0, -10.0), (10.0, 10.0), (-10.0, 10.0)];
    galaxy_of(
        corners
            .iter()
            .map(|&(x, y)| Body::new(1.0, Vector::new(x, y), Vector::zeros(), 1.0))
            .collect(),
        params,
    )
}

#[test]
fn square_accelerates_toward_its_center() {
    let params = Parameters { theta: 1.0, eps: 0.0, ..test_params() };
    let mut g = square(&params);
    let tree = SpatialTree::new(params.world_extent, TreeLimits::default());
    let pool = WorkerPool::new(2, tree).unwrap();

    step(&mut g, &pool, &params).unwrap();

    let center = g.center();
    for b in &g.bodies {
        let to_center = (center - b.position).normalize();
        let dir = b.acceleration.normalize();
        assert!(b.acceleration.norm() > 0.0);
        assert!((dir - to_center).norm() < 1e-12, "{:?} does not point at {:?}", dir, to_center);
    }
}

#[test]
fn softening_monotonically_weakens_the_pull() {
    let mut last = f64::INFINITY;
    for eps in [0.0, 1.0, 100.0, 500.0, 1.0e4, 1.0e6] {
        let params = Parameters { theta: 1.0, eps, ..test_params() };
        let g = square(&params);
        let acc = tree_forces(&g.bodies, &params, TreeLimits::default());
        let mag = acc[0].norm();
        assert!(mag < last, "eps = {eps}: {mag} not below {last}");
        last = mag;
    }
}

// ==================================================================================
// Simulator tests
// ==================================================================================

fn quiet_sim(workers: usize) -> Simulator {
    let params = test_params();
    let g = galaxy_of(scattered_bodies(64), &params);
    Simulator::start(g, engine(workers), params).unwrap()
}

#[test]
fn pause_unpause_resumes_where_it_left_off() {
    let sim = quiet_sim(3);
    wait_until("first steps", || sim.steps() >= 3);

    assert!(sim.pause(1));
    assert_eq!(sim.state(), RunState::Paused);
    let frozen = sim.steps();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(sim.steps(), frozen, "steps advanced while paused");
    let t = sim.with_galaxy(|g| g.t);
    assert_relative_eq!(t, frozen as f64 * 0.1, max_relative = 1e-9);

    assert!(sim.unpause(1));
    assert_ne!(sim.state(), RunState::Paused);
    wait_until("more steps", || sim.steps() > frozen + 2);

    assert!(sim.pause(1));
    let n = sim.steps();
    let t = sim.with_galaxy(|g| g.t);
    assert_relative_eq!(t, n as f64 * 0.1, max_relative = 1e-9);
    assert!(sim.unpause(1));
    assert_eq!(sim.state(), RunState::Running);

    sim.stop().unwrap();
}

#[test]
fn lower_priority_pause_neither_blocks_nor_takes_ownership() {
    let sim = Arc::new(quiet_sim(2));
    assert!(sim.pause(0));

    let contender = {
        let sim = Arc::clone(&sim);
        thread::spawn(move || {
            let got = sim.pause(7);
            let released = sim.unpause(7);
            (got, released)
        })
    };
    let (got, released) = contender.join().unwrap();
    assert!(!got);
    assert!(!released);
    assert_eq!(sim.pause_state().owner(), Some(0));
    assert_eq!(sim.state(), RunState::Paused);

    assert!(sim.unpause(0));
    sim.stop().unwrap();
}

#[test]
fn higher_priority_pause_takes_over() {
    let sim = quiet_sim(1);
    assert!(sim.pause(5));
    assert!(sim.pause(2));
    assert_eq!(sim.pause_state().owner(), Some(2));

    // the displaced owner cannot resume it
    assert!(!sim.unpause(5));
    assert_eq!(sim.state(), RunState::Paused);

    assert!(sim.unpause(2));
    sim.stop().unwrap();
}

#[test]
fn pause_guard_releases_on_drop() {
    let sim = quiet_sim(2);
    {
        let guard = sim.pause_guard(3);
        assert!(guard.acquired());
        assert_eq!(sim.state(), RunState::Paused);
    }
    assert_eq!(sim.state(), RunState::Running);
    sim.stop().unwrap();
}

#[test]
fn bodies_added_while_paused_join_the_next_step() {
    let sim = quiet_sim(3);
    assert!(sim.pause(0));
    let before = sim.steps();
    sim.with_galaxy(|g| {
        g.push(Body::new(50.0, Vector::new(100.0, 100.0), Vector::zeros(), 3.0));
        g.push(Body::new(50.0, Vector::new(-100.0, 100.0), Vector::zeros(), 3.0));
    });
    assert!(sim.unpause(0));
    wait_until("a step with the new bodies", || sim.steps() > before);

    assert!(sim.pause(0));
    sim.with_galaxy(|g| {
        assert_eq!(g.bodies.len(), 66);
        assert!(g.bodies[65].acceleration.norm() > 0.0);
    });
    assert!(sim.unpause(0));
    sim.stop().unwrap();
}

#[test]
fn stop_is_terminal_and_idempotent() {
    let sim = quiet_sim(4);
    wait_until("a step", || sim.steps() > 0);

    sim.stop().unwrap();
    assert_eq!(sim.state(), RunState::Stopped);
    let n = sim.steps();

    assert!(!sim.pause(0), "pause after stop must not block or succeed");
    assert!(!sim.unpause(0));
    thread::sleep(Duration::from_millis(20));
    assert_eq!(sim.steps(), n);
    sim.stop().unwrap();
}

#[test]
fn stop_while_paused_terminates() {
    let sim = quiet_sim(2);
    assert!(sim.pause(1));
    sim.stop().unwrap();
    assert_eq!(sim.state(), RunState::Stopped);
}

#[test]
fn observer_sees_every_step_once() {
    let params = test_params();
    let g = galaxy_of(scattered_bodies(32), &params);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let last = Arc::new(AtomicU64::new(0));

    let sim = {
        let seen = Arc::clone(&seen);
        let last = Arc::clone(&last);
        Simulator::start_observed(g, engine(2), params, move |step: u64, g: &Galaxy| {
            seen.lock().unwrap().push((step, g.t));
            last.store(step, Ordering::Release);
        })
        .unwrap()
    };
    wait_until("ten steps", || last.load(Ordering::Acquire) >= 10);
    sim.stop().unwrap();

    let seen = seen.lock().unwrap();
    for (k, (step, t)) in seen.iter().enumerate() {
        assert_eq!(*step, k as u64 + 1);
        assert_relative_eq!(*t, *step as f64 * 0.1, max_relative = 1e-9);
    }
    assert_eq!(seen.len() as u64, sim.steps());
}

#[test]
fn node_pool_exhaustion_halts_the_simulation() {
    let params = test_params();
    let g = galaxy_of(scattered_bodies(200), &params);
    let tree = TreeLimits { initial_nodes: 2, max_nodes: 8, max_depth: 48 };
    let engine = Engine { workers: 2, tree };
    let sim = Simulator::start(g, engine, params).unwrap();

    wait_until("the simulation to halt", || sim.state() == RunState::Stopped);
    assert!(!sim.pause(0));
    let err = sim.stop().unwrap_err();
    assert!(matches!(err, SimError::NodePoolExhausted { ceiling: 8 }));
    assert_eq!(sim.steps(), 0);
}

#[test]
fn diverging_body_halts_the_simulation() {
    let params = Parameters { world_extent: 100.0, bounds: BoundsPolicy::Diverge, ..test_params() };
    let mut g = Galaxy::new(WorldBounds::new(100.0, BoundsPolicy::Diverge));
    g.push(Body::new(1.0, Vector::new(0.0, 0.0), Vector::zeros(), 1.0));
    g.push(Body::new(1.0, Vector::new(90.0, 0.0), Vector::new(500.0, 0.0), 1.0));

    let sim = Simulator::start(g, engine(1), params).unwrap();
    wait_until("the simulation to halt", || sim.state() == RunState::Stopped);

    let err = sim.stop().unwrap_err();
    assert!(matches!(err, SimError::Diverged { body: 1, .. }));

    // the diverged step moved every body, so it is counted
    assert_eq!(sim.steps(), 1);
    let g = sim.snapshot();
    assert_relative_eq!(g.t, 0.1, max_relative = 1e-12);
    assert!(!g.bounds.contains(&g.bodies[1].position));
}

#[test]
fn panicking_observer_stops_the_simulation() {
    let params = test_params();
    let g = galaxy_of(scattered_bodies(32), &params);
    let sim = Simulator::start_observed(g, engine(2), params, |step: u64, _: &Galaxy| {
        if step == 3 {
            panic!("observer failed at step {step}");
        }
    })
    .unwrap();

    wait_until("the simulation to halt", || sim.state() == RunState::Stopped);
    assert!(!sim.pause(0));

    let err = sim.stop().unwrap_err();
    assert!(matches!(err, SimError::SimulationPanicked));
    assert_eq!(sim.steps(), 3);
    sim.stop().unwrap();

    // the galaxy is still readable after the panic
    assert_eq!(sim.with_galaxy(|g| g.bodies.len()), 32);
}

#[test]
fn clamped_bodies_stay_inside_the_world() {
    let params = Parameters { world_extent: 100.0, ..test_params() };
    let mut g = galaxy_of(Vec::new(), &params);
    g.push(Body::new(1.0, Vector::new(90.0, -90.0), Vector::new(500.0, -500.0), 1.0));
    g.push(Body::new(1.0, Vector::zeros(), Vector::zeros(), 1.0));

    let sim = Simulator::start(g, engine(1), params).unwrap();
    wait_until("a few steps", || sim.steps() >= 5);
    sim.stop().unwrap();

    let g = sim.snapshot();
    assert!(g.bodies.iter().all(|b| g.bounds.contains(&b.position)));
}
