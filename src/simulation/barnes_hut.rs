//! # Barnes–Hut Quadtree (2D)
//!
//! This module implements a **2D Barnes–Hut quadtree** for approximating the
//! gravitational acceleration on every body of a [`Galaxy`](super::states::Galaxy).
//! The naive `O(N²)` all-pairs sum is replaced by an approximate `O(N log N)`
//! walk that treats distant clusters as single point masses.
//!
//! ## Core Concepts
//!
//! - The world is a fixed square centered on the origin. The root quadrant
//!   covers it; it is **not** recomputed from the bodies each step.
//! - Every quadrant is split into 4 children by halving its side.
//! - A child slot is one of [`Slot::Empty`], [`Slot::Body`] (a leaf holding one
//!   body) or [`Slot::Node`] (an internal [`QuadNode`]).
//! - Internal nodes carry the total mass and center of mass of their subtree.
//!   Both are updated **incrementally** on the way down during insertion, so no
//!   second bottom-up pass is needed.
//!
//! ## Storage
//!
//! Internal nodes live in a [`NodePool`]: a pre-sized arena addressed by
//! `NodeId` indices and filled by a cursor that resets on every rebuild. Nodes
//! refer to each other only by index, so growing the pool (doubling, up to a
//! ceiling) never invalidates a link that is already in the tree.
//!
//! ## Coincident bodies
//!
//! Two bodies at the same position would keep landing in the same child
//! quadrant forever. Insertion depth is capped at `max_depth`; a body that
//! reaches an occupied leaf at that depth is chained into it. The leaf then
//! stands for all chained bodies, which interact with each other exactly.

use log::warn;

use crate::error::{Result, SimError};
use crate::simulation::forces::softened_pull;
use crate::simulation::params::{Parameters, TreeLimits};
use crate::simulation::states::{Body, Vector};

pub type NodeId = usize;

/// Content of one child position of a quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Slot {
    #[default]
    Empty,
    /// Leaf: index of the (first) body stored here.
    Body(usize),
    /// Internal node in the pool.
    Node(NodeId),
}

/// An internal node of the quadtree.
#[derive(Debug, Clone, Default)]
pub struct QuadNode {
    pub com: Vector, // center of mass of everything below
    pub mass: f64,   // total mass of everything below
    pub children: [Slot; 4],
}

/// Snapshot of one inserted body: the tree never looks back at the galaxy.
#[derive(Debug, Clone, Copy)]
struct Entry {
    position: Vector,
    mass: f64,
    next: Option<usize>, // next body chained into the same leaf
}

/// Arena of [`QuadNode`]s with a reset-per-build cursor.
///
/// `capacity()` is the number of node slots currently allocated. When the
/// cursor reaches it the pool doubles, never past `ceiling`.
#[derive(Debug)]
pub struct NodePool {
    nodes: Vec<QuadNode>,
    cursor: usize,
    ceiling: usize,
    grown: usize,
}

impl NodePool {
    pub fn new(initial: usize, ceiling: usize) -> Self {
        let initial = initial.max(1);
        Self {
            nodes: vec![QuadNode::default(); initial],
            cursor: 0,
            ceiling: ceiling.max(initial),
            grown: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn in_use(&self) -> usize {
        self.cursor
    }

    /// How many times the pool has grown over its lifetime.
    pub fn times_grown(&self) -> usize {
        self.grown
    }

    fn reset(&mut self) {
        self.cursor = 0;
    }

    fn alloc(&mut self) -> Result<NodeId> {
        if self.cursor == self.nodes.len() {
            self.grow()?;
        }
        let id = self.cursor;
        self.nodes[id] = QuadNode::default();
        self.cursor += 1;
        Ok(id)
    }

    fn grow(&mut self) -> Result<()> {
        let len = self.nodes.len();
        if len >= self.ceiling {
            return Err(SimError::NodePoolExhausted {
                ceiling: self.ceiling,
            });
        }
        let new_len = (len * 2).min(self.ceiling);
        warn!("quadtree node pool growing from {len} to {new_len} nodes");
        self.nodes.resize(new_len, QuadNode::default());
        self.grown += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum SlotRef {
    Root,
    Child(NodeId, usize),
}

/// A 2D Barnes–Hut quadtree over a fixed square world.
///
/// Build it once per step with [`SpatialTree::build`] (or [`SpatialTree::clear`]
/// followed by [`SpatialTree::insert`]), then query it read-only from any
/// number of threads with [`SpatialTree::force_on`].
#[derive(Debug)]
pub struct SpatialTree {
    pool: NodePool,
    entries: Vec<Entry>,
    root: Slot,
    half_extent: f64,
    max_depth: usize,
}

impl SpatialTree {
    /// Create an empty tree whose root quadrant spans `[-half_extent, half_extent]²`.
    pub fn new(half_extent: f64, limits: TreeLimits) -> Self {
        Self {
            pool: NodePool::new(limits.initial_nodes, limits.max_nodes),
            entries: Vec::new(),
            root: Slot::Empty,
            half_extent,
            max_depth: limits.max_depth.max(1),
        }
    }

    /// Drop every body and node. Pool storage is kept and overwritten on reuse.
    pub fn clear(&mut self) {
        self.pool.reset();
        self.entries.clear();
        self.root = Slot::Empty;
    }

    /// Rebuild the tree from scratch over `bodies`.
    ///
    /// Body `i` of the slice becomes index `i` of the tree.
    ///
    /// # Errors
    /// [`SimError::NodePoolExhausted`] if the pool would have to grow past its
    /// ceiling. The tree is unusable afterwards until the next successful build.
    pub fn build(&mut self, bodies: &[Body]) -> Result<()> {
        self.clear();
        self.entries.reserve(bodies.len());
        for b in bodies {
            self.insert(b)?;
        }
        Ok(())
    }

    /// Insert one body and return the index it was given.
    ///
    /// Walks down from the root, picking the child quadrant by comparing the
    /// body's position with each quadrant's center and halving the quadrant
    /// side at every level:
    ///
    /// - **Empty slot**: the body becomes a leaf there.
    /// - **Leaf slot**: the resident body is pushed one level down into a new
    ///   internal node, then the walk continues through that node. At
    ///   `max_depth` the body is chained into the leaf instead.
    /// - **Internal node**: its mass and center of mass absorb the new body,
    ///   and the walk descends.
    pub fn insert(&mut self, body: &Body) -> Result<usize> {
        let id = self.entries.len();
        let pos = body.position;
        let mass = body.mass;
        self.entries.push(Entry {
            position: pos,
            mass,
            next: None,
        });

        let mut at = SlotRef::Root;
        let mut center = Vector::zeros();
        let mut half = self.half_extent;
        let mut depth = 0;

        loop {
            match self.slot(at) {
                Slot::Empty => {
                    self.set_slot(at, Slot::Body(id));
                    return Ok(id);
                }
                Slot::Body(resident) => {
                    if depth >= self.max_depth {
                        self.chain(resident, id);
                        return Ok(id);
                    }
                    // Leaves above max_depth never hold a chain, so the
                    // resident's own mass is the whole leaf's mass.
                    let r = self.entries[resident];
                    let n = self.pool.alloc()?;
                    let node = &mut self.pool.nodes[n];
                    node.com = r.position;
                    node.mass = r.mass;
                    node.children[quadrant(&r.position, &center)] = Slot::Body(resident);
                    self.set_slot(at, Slot::Node(n));
                }
                Slot::Node(n) => {
                    let node = &mut self.pool.nodes[n];
                    let total = node.mass + mass;
                    if total > 0.0 {
                        node.com = (node.com * node.mass + pos * mass) / total;
                    }
                    node.mass = total;

                    let q = quadrant(&pos, &center);
                    half *= 0.5;
                    center = child_center(&center, q, half);
                    at = SlotRef::Child(n, q);
                    depth += 1;
                }
            }
        }
    }

    /// Acceleration on inserted body `i` from every other body in the tree.
    ///
    /// Walks the tree from the root. An internal node whose side `s` and
    /// distance `d` to its center of mass satisfy `s / d < theta` is used as a
    /// single point mass, unless the body itself lies inside that node's
    /// quadrant. Otherwise every non-empty child is visited. Leaves are always
    /// exact, and body `i` never pulls on itself.
    ///
    /// With `theta == 0` every node is opened and the result equals the direct
    /// pairwise sum.
    pub fn force_on(&self, i: usize, params: &Parameters) -> Vector {
        self.acceleration_at(self.entries[i].position, Some(i), params)
    }

    /// Acceleration at an arbitrary position, optionally skipping one body.
    pub fn acceleration_at(&self, pos: Vector, skip: Option<usize>, params: &Parameters) -> Vector {
        let mut acc = Vector::zeros();
        self.accumulate(
            self.root,
            Vector::zeros(),
            self.half_extent,
            pos,
            skip,
            params,
            &mut acc,
        );
        acc
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate(
        &self,
        slot: Slot,
        center: Vector,
        half: f64,
        pos: Vector,
        skip: Option<usize>,
        p: &Parameters,
        acc: &mut Vector,
    ) {
        match slot {
            Slot::Empty => {}
            Slot::Body(head) => {
                let mut cur = Some(head);
                while let Some(j) = cur {
                    let e = &self.entries[j];
                    if Some(j) != skip {
                        *acc += softened_pull(pos, e.position, e.mass, p.g, p.eps);
                    }
                    cur = e.next;
                }
            }
            Slot::Node(n) => {
                let node = &self.pool.nodes[n];
                if node.mass == 0.0 {
                    return;
                }

                let side = 2.0 * half;
                let d = (node.com - pos).norm();
                let inside = (pos.x - center.x).abs() <= half && (pos.y - center.y).abs() <= half;
                if !inside && d > 0.0 && side / d < p.theta {
                    // Far enough away: the whole node acts as one mass
                    *acc += softened_pull(pos, node.com, node.mass, p.g, p.eps);
                    return;
                }

                let child_half = 0.5 * half;
                for (q, child) in node.children.iter().enumerate() {
                    if *child != Slot::Empty {
                        let c = child_center(&center, q, child_half);
                        self.accumulate(*child, c, child_half, pos, skip, p, acc);
                    }
                }
            }
        }
    }

    // accessors =============================================================================

    /// Number of bodies inserted since the last clear.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn half_extent(&self) -> f64 {
        self.half_extent
    }

    pub fn root(&self) -> Slot {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &QuadNode {
        &self.pool.nodes[id]
    }

    pub fn pool(&self) -> &NodePool {
        &self.pool
    }

    /// Total mass and center of mass of everything in the tree.
    pub fn aggregate(&self) -> (f64, Vector) {
        match self.root {
            Slot::Empty => (0.0, Vector::zeros()),
            Slot::Body(head) => {
                let mut mass = 0.0;
                let mut weighted = Vector::zeros();
                let mut cur = Some(head);
                while let Some(j) = cur {
                    let e = &self.entries[j];
                    mass += e.mass;
                    weighted += e.position * e.mass;
                    cur = e.next;
                }
                if mass > 0.0 {
                    (mass, weighted / mass)
                } else {
                    (mass, self.entries[head].position)
                }
            }
            Slot::Node(n) => (self.pool.nodes[n].mass, self.pool.nodes[n].com),
        }
    }

    // helpers ===============================================================================

    fn slot(&self, at: SlotRef) -> Slot {
        match at {
            SlotRef::Root => self.root,
            SlotRef::Child(n, q) => self.pool.nodes[n].children[q],
        }
    }

    fn set_slot(&mut self, at: SlotRef, slot: Slot) {
        match at {
            SlotRef::Root => self.root = slot,
            SlotRef::Child(n, q) => self.pool.nodes[n].children[q] = slot,
        }
    }

    /// Append body `id` to the end of the chain starting at `head`.
    fn chain(&mut self, head: usize, id: usize) {
        let mut tail = head;
        while let Some(next) = self.entries[tail].next {
            tail = next;
        }
        self.entries[tail].next = Some(id);
    }
}

/// Child quadrant of `p` relative to a quadrant centered at `center`.
///
/// - Bit 0 (value 1): x >= center.x
/// - Bit 1 (value 2): y >= center.y
fn quadrant(p: &Vector, center: &Vector) -> usize {
    let mut q = 0;
    if p.x >= center.x {
        q |= 1;
    }
    if p.y >= center.y {
        q |= 2;
    }
    q
}

/// Center of child quadrant `q`, given the parent center and the child's half side.
fn child_center(center: &Vector, q: usize, child_half: f64) -> Vector {
    let dx = if q & 1 == 0 { -child_half } else { child_half };
    let dy = if q & 2 == 0 { -child_half } else { child_half };
    Vector::new(center.x + dx, center.y + dy)
}
