use crate::base::{LOS, Point, dirs, grid_distance};
use crate::dex::{Habitat, Intelligence};
use crate::entity::Capabilities;
use crate::terrain::{Feature, Opacity, TrapKind, WorldView, is_opaque};

//////////////////////////////////////////////////////////////////////////////

// Policy and mode flags

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TraversalPolicy {
    ForActor(Capabilities),
    Generic { doors: bool },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModeFlags {
    pub diagonals: bool,
    pub unmapped_passable: bool,
    pub ignore_actors: bool,
}

impl Default for ModeFlags {
    fn default() -> Self {
        Self { diagonals: true, unmapped_passable: false, ignore_actors: true }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Habitat rules

fn next_to_wall<V: WorldView + ?Sized>(view: &V, p: Point) -> bool {
    dirs::COMPASS.iter().any(|&d| {
        let q = p + d;
        view.in_bounds(q) && view.feature_at(q) == Feature::Wall
    })
}

pub fn can_cling_at<V: WorldView + ?Sized>(view: &V, caps: &Capabilities, p: Point) -> bool {
    caps.clings && next_to_wall(view, p)
}

pub fn is_habitable<V: WorldView + ?Sized>(view: &V, caps: &Capabilities, p: Point) -> bool {
    let land = caps.habitat.lives_on_land() || caps.flies;
    match view.feature_at(p) {
        Feature::Floor | Feature::OpenDoor | Feature::StairsDown | Feature::StairsUp => land,
        Feature::ShallowWater => land || caps.habitat.swims(),
        Feature::DeepWater => {
            caps.habitat.swims() || caps.flies || can_cling_at(view, caps, p)
        }
        Feature::Lava => {
            matches!(caps.habitat, Habitat::Lava | Habitat::AmphibiousLava) ||
            caps.flies || can_cling_at(view, caps, p)
        }
        // Only reachable when unmapped cells are assumed passable.
        Feature::Unseen => true,
        Feature::Wall | Feature::Statue | Feature::ClosedDoor => false,
    }
}

// Wading through shallow water without being built for it.
pub fn floundering_at<V: WorldView + ?Sized>(view: &V, caps: &Capabilities, p: Point) -> bool {
    view.feature_at(p) == Feature::ShallowWater && !caps.habitat.swims() &&
    !caps.flies && !can_cling_at(view, caps, p)
}

fn opens_door(caps: &Capabilities) -> bool {
    caps.opens_doors && (caps.habitat.lives_on_land() || caps.flies)
}

pub fn can_pass_through<V: WorldView + ?Sized>(view: &V, caps: &Capabilities, p: Point) -> bool {
    if view.feature_at(p).is_closed_door() { return opens_door(caps); }
    is_habitable(view, caps, p)
}

// A cell a monster may pick as a destination without coming to harm.
pub fn is_location_safe<V: WorldView + ?Sized>(view: &V, caps: &Capabilities, p: Point) -> bool {
    if !view.in_bounds(p) || !is_habitable(view, caps, p) { return false; }
    match view.trap_at(p) {
        Some(trap) if trap.kind == TrapKind::Teleport => false,
        Some(trap) => !trap.known || trap.kind == TrapKind::Alarm,
        None => true,
    }
}

//////////////////////////////////////////////////////////////////////////////

// Oracle

pub fn is_traversable<V: WorldView + ?Sized>(
        view: &V, policy: &TraversalPolicy, flags: &ModeFlags, p: Point) -> bool {
    if !view.in_bounds(p) { return false; }

    let feature = view.feature_at(p);
    let unmapped = feature == Feature::Unseen || !view.is_observed(p);
    if unmapped && !flags.unmapped_passable { return false; }
    if !flags.ignore_actors && view.actor_at(p).is_some() { return false; }
    if view.is_immobile_at(p) { return false; }

    // Whatever is really there, an unmapped cell is assumed open.
    if unmapped { return true; }

    if feature.is_closed_door() {
        return match policy {
            TraversalPolicy::ForActor(caps) => opens_door(caps),
            TraversalPolicy::Generic { doors } => *doors,
        };
    }
    if feature.is_solid() { return false; }

    let caps = match policy {
        TraversalPolicy::ForActor(caps) => caps,
        TraversalPolicy::Generic { .. } => {
            return feature.has_solid_floor() || feature == Feature::Unseen;
        }
    };
    if !is_habitable(view, caps, p) { return false; }

    match view.trap_at(p) {
        Some(trap) if trap.kind == TrapKind::Teleport => false,
        Some(trap) => !(trap.kind == TrapKind::Zot && trap.known && caps.friendly),
        None => true,
    }
}

// Cost of the single step from `from` into the adjacent cell `to`. Assumes
// `to` already passed is_traversable (or is the search target).
pub fn step_cost<V: WorldView + ?Sized>(
        view: &V, policy: &TraversalPolicy, from: Point, to: Point) -> i32 {
    debug_assert!(grid_distance(from, to) <= 1);

    let feature = view.feature_at(to);
    if feature.is_closed_door() { return 2; }

    let TraversalPolicy::ForActor(caps) = policy else { return 1; };

    let wading = |p: Point| view.feature_at(p) == Feature::ShallowWater;
    if !caps.flies && !caps.habitat.swims() && (wading(from) || wading(to)) {
        return 2;
    }

    if let Some(trap) = view.trap_at(to) {
        match trap.kind {
            TrapKind::Alarm | TrapKind::Zot => {
                return if trap.known && caps.friendly { 3 } else { 1 };
            }
            _ => if trap.known && !caps.flies { return 2; }
        }
    }
    1
}

//////////////////////////////////////////////////////////////////////////////

// Straight lines

pub fn can_safely_go_through<V: WorldView + ?Sized>(
        view: &V, caps: &Capabilities, p: Point) -> bool {
    debug_assert!(view.in_bounds(p));
    if !view.in_bounds(p) || !is_habitable(view, caps, p) { return false; }

    // Smart monsters and clingers route around shallow water.
    let careful = caps.intel >= Intelligence::Human || caps.clings;
    !(careful && floundering_at(view, caps, p))
}

fn straight_line<V: WorldView + ?Sized, F: Fn(Point) -> bool>(
        view: &V, from: Point, to: Point, radius: i32, safe: F) -> bool {
    if from == to { return true; }
    if grid_distance(from, to) > radius { return false; }

    let line = LOS(from, to);
    let interior = &line[1..line.len() - 1];
    interior.iter().all(|&p| !is_opaque(view, p, Opacity::Immobile) && safe(p))
}

// Conservative: a true result means the monster can walk the Bresenham line
// from `from` to `to` without leaving safe terrain. Not symmetric.
pub fn can_go_straight<V: WorldView + ?Sized>(
        view: &V, caps: &Capabilities, from: Point, to: Point) -> bool {
    straight_line(view, from, to, view.los_radius(),
                  |p| can_safely_go_through(view, caps, p))
}

pub fn can_go_straight_generic<V: WorldView + ?Sized>(view: &V, from: Point, to: Point) -> bool {
    straight_line(view, from, to, view.los_radius(), |p| {
        let feature = view.feature_at(p);
        feature.has_solid_floor() || feature == Feature::Unseen
    })
}

// Sight as far as movement is concerned: cells the monster cannot pass
// through block the view.
pub fn can_see_for_movement<V: WorldView + ?Sized>(
        view: &V, caps: &Capabilities, from: Point, to: Point, radius: i32) -> bool {
    if !view.in_bounds(to) { return false; }
    straight_line(view, from, to, radius, |p| can_pass_through(view, caps, p))
}

//////////////////////////////////////////////////////////////////////////////
