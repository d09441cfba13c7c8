//! Initial-state ingestion from a YAML record stream.
//!
//! The input is a sequence of single-key records, read in order until the end
//! of the stream:
//!
//! ```yaml
//! - scale: 30.0                  # view scale, also the default body size unit
//! - dt: 0.1
//! - gravity: 1.0                 # gravitational constant
//! - origin: [320, 240]           # view origin
//! - body: { position: [0, 0], velocity: [0, 1], mass: 1.0e6, size: 60, color: [255, 220, 0] }
//! - body: { position: [900, 0] } # size defaults to 2*scale, mass to size³
//! ```
//!
//! Only `body` records create bodies. Records with an unknown key or a value
//! that does not parse are skipped.

use std::io::Read;

use log::debug;
use serde::Deserialize;
use serde_yaml::Value;

use crate::error::{Result, SimError};
use crate::simulation::params::Parameters;
use crate::simulation::states::{Body, Galaxy, Rgb, Vector, WorldBounds};

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
struct BodyRecord {
    position: [f64; 2],
    #[serde(default)]
    velocity: [f64; 2],
    mass: Option<f64>,
    size: Option<f64>,
    color: Option<[u8; 3]>,
}

/// View settings carried by the input. The simulator does not use them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub origin: Vector,
    pub scale: f64,
}

impl Default for View {
    fn default() -> Self {
        Self {
            origin: Vector::zeros(),
            scale: 30.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Ingested {
    pub bodies: Vec<Body>,
    pub dt: Option<f64>,
    pub gravity: Option<f64>,
    pub view: View,
    pub skipped: usize,
}

impl Ingested {
    /// Apply the parameter records over `params`.
    pub fn apply(&self, params: &mut Parameters) {
        if let Some(dt) = self.dt {
            params.dt = dt;
        }
        if let Some(g) = self.gravity {
            params.g = g;
        }
    }

    /// Build a galaxy from the bodies, centered on the origin.
    ///
    /// Bounds are enforced after centering, so input that only fits the
    /// world once centered is kept intact.
    pub fn into_galaxy(self, bounds: WorldBounds) -> Galaxy {
        let mut g = Galaxy::new(bounds);
        g.bodies = self.bodies;
        g.recenter();
        g
    }
}

pub fn ingest_str(s: &str) -> Result<Ingested> {
    if s.trim().is_empty() {
        return Ok(Ingested::default());
    }
    let doc: Value = serde_yaml::from_str(s)?;
    ingest_value(doc)
}

pub fn ingest_reader(mut r: impl Read) -> Result<Ingested> {
    let mut s = String::new();
    r.read_to_string(&mut s)?;
    ingest_str(&s)
}

fn ingest_value(doc: Value) -> Result<Ingested> {
    let records = match doc {
        Value::Null => Vec::new(),
        Value::Sequence(seq) => seq,
        _ => return Err(SimError::Config("input must be a sequence of records".into())),
    };

    let mut out = Ingested::default();
    for (n, record) in records.into_iter().enumerate() {
        if !read_record(record, &mut out) {
            debug!("skipping input record {n}");
            out.skipped += 1;
        }
    }
    Ok(out)
}

/// Apply one record. Returns false if it was not understood.
fn read_record(record: Value, out: &mut Ingested) -> bool {
    let Value::Mapping(map) = record else { return false };
    if map.len() != 1 {
        return false;
    }
    let Some((key, value)) = map.into_iter().next() else { return false };
    let Some(key) = key.as_str() else { return false };

    match key {
        "body" => match serde_yaml::from_value::<BodyRecord>(value) {
            Ok(rec) => match make_body(rec, out.view.scale) {
                Some(b) => {
                    out.bodies.push(b);
                    true
                }
                None => false,
            },
            Err(_) => false,
        },
        "dt" => positive(value).map(|v| out.dt = Some(v)).is_some(),
        "gravity" => number(value).map(|v| out.gravity = Some(v)).is_some(),
        "scale" => positive(value).map(|v| out.view.scale = v).is_some(),
        "origin" => match serde_yaml::from_value::<[f64; 2]>(value) {
            Ok([x, y]) => {
                out.view.origin = Vector::new(x, y);
                true
            }
            Err(_) => false,
        },
        _ => false,
    }
}

fn number(v: Value) -> Option<f64> {
    v.as_f64().filter(|x| x.is_finite())
}

fn positive(v: Value) -> Option<f64> {
    number(v).filter(|x| *x > 0.0)
}

fn make_body(rec: BodyRecord, scale: f64) -> Option<Body> {
    let position = Vector::new(rec.position[0], rec.position[1]);
    let mut b = Body::with_scale(scale, position);
    if let Some(size) = rec.size {
        b.size = size;
        b.mass = size * size * size;
    }
    if let Some(mass) = rec.mass {
        b.mass = mass;
    }
    b.velocity = Vector::new(rec.velocity[0], rec.velocity[1]);
    if let Some([r, g, bl]) = rec.color {
        b.color = Rgb(r, g, bl);
    }

    (b.size > 0.0 && b.mass >= 0.0).then_some(b)
}
