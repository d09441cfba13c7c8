use std::time::Instant;

use crate::simulation::barnes_hut::SpatialTree;
use crate::simulation::engine::{step, Engine};
use crate::simulation::forces::direct_accelerations;
use crate::simulation::params::Parameters;
use crate::simulation::scenario::disc_galaxy;
use crate::simulation::states::Galaxy;
use crate::simulation::workers::WorkerPool;

fn make_galaxy(n: usize, params: &Parameters) -> Galaxy {
    disc_galaxy(n, params.world_bounds(), params.g)
}

/// Time one direct O(n²) evaluation against one tree build + walk, single threaded.
pub fn bench_gravity() {
    let params = Parameters::default();
    let ns = [200, 400, 800, 1600, 3200, 6400];

    for n in ns {
        let galaxy = make_galaxy(n, &params);
        let mut tree = SpatialTree::new(params.world_extent, Engine::default().tree);

        // Warm up
        let _ = direct_accelerations(&galaxy.bodies, params.g, params.eps);

        let t0 = Instant::now();
        let _ = direct_accelerations(&galaxy.bodies, params.g, params.eps);
        let dt_direct = t0.elapsed().as_secs_f64();

        let t1 = Instant::now();
        if let Err(e) = tree.build(&galaxy.bodies) {
            println!("N = {n:5}, tree build failed: {e}");
            continue;
        }
        let _: Vec<_> = (0..galaxy.bodies.len()).map(|i| tree.force_on(i, &params)).collect();
        let dt_bh = t1.elapsed().as_secs_f64();

        println!("N = {n:5}, direct = {:8.6} s, BH = {:8.6} s", dt_direct, dt_bh);
    }
}

/// Full simulation steps per second for a range of worker counts.
pub fn bench_workers(n: usize, steps: usize) {
    let params = Parameters::default();
    let template = make_galaxy(n, &params);

    for workers in 0..=7 {
        let engine = Engine { workers, ..Engine::default() };
        let tree = SpatialTree::new(params.world_extent, engine.tree);
        let pool = match WorkerPool::new(workers, tree) {
            Ok(pool) => pool,
            Err(e) => {
                println!("workers = {workers}: {e}");
                return;
            }
        };
        let mut galaxy = template.clone();

        // Warm up
        if let Err(e) = step(&mut galaxy, &pool, &params) {
            println!("workers = {workers}: {e}");
            return;
        }

        let t0 = Instant::now();
        for _ in 0..steps {
            if let Err(e) = step(&mut galaxy, &pool, &params) {
                println!("workers = {workers}: {e}");
                return;
            }
        }
        let per_step = t0.elapsed().as_secs_f64() / steps.max(1) as f64;
        println!("N = {n}, workers = {workers}, step = {:8.6} s", per_step);
    }
}

/// Direct vs tree timing for a smooth range of n
/// Paste output directly into a spreadsheet to graph
pub fn bench_gravity_curve() {
    let params = Parameters::default();
    println!("N,direct_ms,bh_ms");

    for n in (200..=6400).step_by(200) {
        let galaxy = make_galaxy(n, &params);
        let mut tree = SpatialTree::new(params.world_extent, Engine::default().tree);

        let t0 = Instant::now();
        let _ = direct_accelerations(&galaxy.bodies, params.g, params.eps);
        let ms_direct = t0.elapsed().as_secs_f64() * 1000.0;

        let t1 = Instant::now();
        if tree.build(&galaxy.bodies).is_err() {
            break;
        }
        let _: Vec<_> = (0..galaxy.bodies.len()).map(|i| tree.force_on(i, &params)).collect();
        let ms_bh = t1.elapsed().as_secs_f64() * 1000.0;

        println!("{},{:.6},{:.6}", n, ms_direct, ms_bh);
    }
}
