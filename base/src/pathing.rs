use std::cell::{Cell, RefCell};
use std::cmp::max;

use log::{debug, trace};
use rand::Rng;

use crate::base::{Matrix, Point, RNG, dirs, grid_distance};
use crate::config::Config;
use crate::dex::Intelligence;
use crate::entity::{Capabilities, Entity};
use crate::terrain::WorldView;
use crate::traverse::{ModeFlags, TraversalPolicy};
use crate::traverse::{can_go_straight, can_go_straight_generic, is_traversable, step_cost};

//////////////////////////////////////////////////////////////////////////////

// Constants

const INFINITE_DISTANCE: i32 = i32::MAX;
const MAX_POOLED_STATES: usize = 4;

// Diagonals first, then orthogonals, as indices into dirs::COMPASS. When a
// diagonal and an orthogonal step tie, the orthogonal lands later in its
// bucket and is popped first, which cuts down on zig-zagging.
const VISIT_ORDER: [usize; 8] = [1, 3, 5, 7, 0, 2, 4, 6];

//////////////////////////////////////////////////////////////////////////////

// Tracking range

pub fn tracking_range(entity: &Entity, config: &Config) -> i32 {
    if entity.friendly() { return config.friendly_tracking_range; }

    let mut range = match entity.species.intel {
        Intelligence::Brainless => config.brainless_range,
        Intelligence::Animal => config.animal_range,
        Intelligence::Human => config.los_radius,
    };
    if entity.native { range += config.native_bonus; }
    if entity.tracking_bonus { range *= config.tracking_multiplier; }
    range
}

//////////////////////////////////////////////////////////////////////////////

// Search state, pooled per thread so that repeated searches reuse the
// dense arrays instead of reallocating them every turn.

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
enum Passability { #[default] Unknown, Passable, Impassable }

#[derive(Default)]
struct SearchState {
    dist: Matrix<i32>,
    prev: Matrix<u8>,
    cache: Matrix<Passability>,
    buckets: Vec<Vec<Point>>,
}

impl SearchState {
    fn reset(&mut self, size: Point) {
        if self.dist.size != size {
            self.dist = Matrix::new(size, INFINITE_DISTANCE);
            self.prev = Matrix::new(size, 0);
            self.cache = Matrix::new(size, Passability::Unknown);
        } else {
            self.dist.fill(INFINITE_DISTANCE);
            self.cache.fill(Passability::Unknown);
        }
        self.buckets.iter_mut().for_each(|x| x.clear());
    }
}

thread_local! {
    static POOL: RefCell<Vec<SearchState>> = const { RefCell::new(vec![]) };
    static SEARCHES: Cell<usize> = const { Cell::new(0) };
}

// The number of searches started on this thread so far.
pub fn searches_run() -> usize { SEARCHES.with(|x| x.get()) }

//////////////////////////////////////////////////////////////////////////////

// Pathfinder

pub struct Pathfinder<'a, V: WorldView + ?Sized> {
    view: &'a V,
    config: &'a Config,
    policy: TraversalPolicy,
    flags: ModeFlags,
    limit: Option<i32>,
    range: Option<i32>,

    start: Point,
    target: Point,
    pos: Point,
    fill: bool,
    found: bool,
    rotate: usize,
    min_length: i32,
    max_length: i32,
    state: SearchState,
}

impl<'a, V: WorldView + ?Sized> Pathfinder<'a, V> {
    pub fn new(view: &'a V, config: &'a Config) -> Self {
        let state = POOL.with_borrow_mut(|x| x.pop()).unwrap_or_default();
        Self {
            view,
            config,
            policy: TraversalPolicy::Generic { doors: false },
            flags: ModeFlags::default(),
            limit: None,
            range: None,

            start: Point::default(),
            target: Point::default(),
            pos: Point::default(),
            fill: false,
            found: false,
            rotate: 0,
            min_length: 0,
            max_length: 0,
            state,
        }
    }

    // Configuration

    pub fn set_policy(&mut self, policy: TraversalPolicy) { self.policy = policy; }

    pub fn set_flags(&mut self, flags: ModeFlags) { self.flags = flags; }

    pub fn set_range(&mut self, range: i32) {
        if range >= 0 { self.limit = Some(range); }
    }

    // Getters

    pub fn distance(&self, p: Point) -> Option<i32> {
        let distance = self.state.dist.get(p);
        if distance == INFINITE_DISTANCE { None } else { Some(distance) }
    }

    // Searches

    pub fn init_pathfind(&mut self, start: Point, target: Point, rng: &mut RNG) -> bool {
        self.range = self.limit;
        self.pathfind(start, target, rng)
    }

    // Uses the actor's position and movement profile. The range is the
    // actor's own tracking range unless set_range was called first.
    pub fn init_pathfind_for_actor(
            &mut self, actor: &Entity, target: Point, rng: &mut RNG) -> bool {
        self.policy = TraversalPolicy::ForActor(Capabilities::of(actor));
        self.range = Some(self.limit.unwrap_or_else(|| tracking_range(actor, self.config)));
        self.pathfind(actor.pos, target, rng)
    }

    fn pathfind(&mut self, start: Point, target: Point, rng: &mut RNG) -> bool {
        self.prepare(start, target, false, rng);
        if start == target {
            self.found = true;
            return true;
        }

        self.min_length = grid_distance(start, target);
        self.max_length = self.min_length;
        self.found = self.search();
        if !self.found {
            debug!("No path from {:?} to {:?} (range: {:?})", start, target, self.range);
        }
        self.found
    }

    // Explores every cell the actor could reach at a cost of at most
    // `radius`. Query the result with is_reachable.
    pub fn fill_traversability(&mut self, actor: &Entity, radius: i32, rng: &mut RNG) {
        self.policy = TraversalPolicy::ForActor(Capabilities::of(actor));
        self.range = Some(max(radius, 0));
        self.prepare(actor.pos, actor.pos, true, rng);

        self.min_length = 0;
        self.max_length = max(radius, 0);
        self.search();
        self.found = false;
    }

    pub fn is_reachable(&self, p: Point) -> bool {
        debug_assert!(self.fill, "is_reachable needs fill_traversability");
        let range = self.range.unwrap_or(0);
        self.state.cache.get(p) == Passability::Passable && self.state.dist.get(p) <= range
    }

    // Results

    // The cells from start to target, both inclusive.
    pub fn backtrack(&self) -> Vec<Point> {
        debug_assert!(self.found, "backtrack needs a successful search");
        if !self.found { return vec![]; }

        let mut pos = self.target;
        let mut path = vec![pos];
        while pos != self.start {
            pos = pos + dirs::COMPASS[self.state.prev.get(pos) as usize];
            debug_assert!(self.view.in_bounds(pos));
            path.push(pos);
        }
        path.reverse();
        path
    }

    // Reduces the path to the cells where it bends out of a straight,
    // safe line. The target is always the last waypoint, unless the path
    // is trivial, in which case there are no waypoints at all. A target
    // the searcher can't enter keeps the cell before it as a waypoint.
    pub fn calc_waypoints(&self) -> Vec<Point> {
        let path = self.backtrack();
        let Some(&last) = path.last() else { return vec![]; };

        let mut waypoints = vec![];
        let mut pos = path[0];
        for i in 1..path.len() {
            let next = path[i];
            let open = is_traversable(self.view, &self.policy, &self.flags, next);
            if open && self.can_go_straight(pos, next) { continue; }
            if path[i - 1] == pos { continue; }
            pos = path[i - 1];
            waypoints.push(pos);
        }
        if pos != last { waypoints.push(last); }
        waypoints
    }

    pub fn can_go_straight(&self, from: Point, to: Point) -> bool {
        match &self.policy {
            TraversalPolicy::ForActor(caps) => can_go_straight(self.view, caps, from, to),
            TraversalPolicy::Generic { .. } => can_go_straight_generic(self.view, from, to),
        }
    }

    // Private helpers

    fn prepare(&mut self, start: Point, target: Point, fill: bool, rng: &mut RNG) {
        debug_assert!(self.view.in_bounds(start));
        SEARCHES.with(|x| x.set(x.get() + 1));

        self.start = start;
        self.target = target;
        self.pos = start;
        self.fill = fill;
        self.found = false;
        self.rotate = 2 * rng.gen_range(0..4);

        self.state.reset(self.view.size());
        self.state.dist.set(start, 0);
        self.state.cache.set(start, Passability::Passable);
        trace!("Search from {:?} to {:?} (range: {:?}, fill: {})", start, target, self.range, fill);
    }

    fn search(&mut self) -> bool {
        loop {
            if self.expand() { return true; }
            if !self.select() { return false; }
        }
    }

    fn estimate(&self, p: Point) -> i32 {
        if self.fill { grid_distance(p, self.start) } else { grid_distance(p, self.target) }
    }

    fn over_range(&self, distance: i32, p: Point) -> bool {
        let Some(range) = self.range else { return false; };
        if self.fill { return distance > range; }
        distance + grid_distance(p, self.target) > range
    }

    fn traversable(&mut self, p: Point) -> bool {
        match self.state.cache.get(p) {
            Passability::Passable => true,
            Passability::Impassable => false,
            Passability::Unknown => {
                let result = is_traversable(self.view, &self.policy, &self.flags, p);
                let value = if result { Passability::Passable } else { Passability::Impassable };
                self.state.cache.set(p, value);
                result
            }
        }
    }

    // Relaxes the neighbours of the current cell. Returns true as soon as
    // the target is reached.
    fn expand(&mut self) -> bool {
        let pos = self.pos;
        let base = self.state.dist.get(pos);

        for idir in VISIT_ORDER {
            if !self.flags.diagonals && idir % 2 == 1 { continue; }

            let dir = (idir + self.rotate) % 8;
            let npos = pos + dirs::COMPASS[dir];
            if !self.view.in_bounds(npos) { continue; }

            // Every step costs at least 1, so this prunes before the oracle.
            if self.over_range(base + 1, npos) { continue; }

            // The target is always enterable, so that a path can end next
            // to a foe standing somewhere the searcher can't go.
            let is_target = !self.fill && npos == self.target;
            if !is_target && !self.traversable(npos) { continue; }

            let distance = base + step_cost(self.view, &self.policy, pos, npos);
            if self.over_range(distance, npos) { continue; }

            let old = self.state.dist.get(npos);
            if distance >= old { continue; }

            let estimate = self.estimate(npos);
            let total = distance + estimate;
            if old == INFINITE_DISTANCE {
                self.add_new_pos(npos, total);
                self.max_length = max(self.max_length, total);
            } else {
                self.update_pos(npos, old + estimate, total);
            }

            self.state.dist.set(npos, distance);
            self.state.prev.set(npos, dirs::reverse(dir) as u8);

            if is_target { return true; }
        }
        false
    }

    // Pops the most recently added cell of the cheapest non-empty bucket.
    fn select(&mut self) -> bool {
        let buckets = &mut self.state.buckets;
        for i in self.min_length..=self.max_length {
            let Some(bucket) = buckets.get_mut(i as usize) else { break; };
            let Some(pos) = bucket.pop() else { continue; };
            self.min_length = i;
            self.pos = pos;
            return true;
        }
        false
    }

    fn add_new_pos(&mut self, p: Point, total: i32) {
        let index = total as usize;
        let buckets = &mut self.state.buckets;
        if buckets.len() <= index { buckets.resize_with(index + 1, Vec::new); }
        buckets[index].push(p);
    }

    fn update_pos(&mut self, p: Point, old_total: i32, total: i32) {
        if let Some(bucket) = self.state.buckets.get_mut(old_total as usize) {
            if let Some(i) = bucket.iter().position(|&x| x == p) { bucket.remove(i); }
        }
        self.add_new_pos(p, total);
    }
}

impl<'a, V: WorldView + ?Sized> Drop for Pathfinder<'a, V> {
    fn drop(&mut self) {
        let state = std::mem::take(&mut self.state);
        POOL.with_borrow_mut(|x| if x.len() < MAX_POOLED_STATES { x.push(state) });
    }
}

//////////////////////////////////////////////////////////////////////////////
