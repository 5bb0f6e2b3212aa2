use std::cmp::max;
use std::collections::BTreeMap;

use log::debug;
use rand::Rng;
use thin_vec::ThinVec;

use crate::base::{Point, RNG, cells_by_distance, coinflip, dirs, grid_distance, one_chance_in};
use crate::dex::Intelligence;
use crate::entity::{Capabilities, EID, Entity, TravelTarget};
use crate::game::Board;
use crate::pathing::{Pathfinder, tracking_range};
use crate::terrain::{Feature, TrapKind, WorldView};
use crate::traverse::{self, ModeFlags};

// Band members and pacified monsters will walk a long way to regroup or leave.
const LONG_TRAVEL_RANGE: i32 = 1000;

//////////////////////////////////////////////////////////////////////////////

// Shared helpers

pub fn target_is_unreachable(entity: &Entity) -> bool {
    matches!(entity.travel.mode, TravelTarget::Unreachable | TravelTarget::KnownUnreachable)
}

pub fn can_go_straight(board: &Board, eid: EID, from: Point, to: Point) -> bool {
    let Some(entity) = board.entities.get(eid) else { return false; };
    traverse::can_go_straight(board, &Capabilities::of(entity), from, to)
}

// Some(waypoints) if a path exists; the waypoints are empty when the
// monster is already standing on `target`.
fn find_waypoints(board: &Board, eid: EID, target: Point,
                  range: Option<i32>, rng: &mut RNG) -> Option<ThinVec<Point>> {
    let mut pathfinder = Pathfinder::new(board, &board.config);
    if let Some(range) = range { pathfinder.set_range(range); }
    if !pathfinder.init_pathfind_for_actor(&board.entities[eid], target, rng) { return None; }
    Some(pathfinder.calc_waypoints().into_iter().collect())
}

// Drops the head waypoint once reached and aims for the next one.
pub fn follow_waypoints(board: &mut Board, eid: EID) {
    let entity = &mut board.entities[eid];
    let travel = &mut entity.travel;
    if travel.path.first() == Some(&entity.pos) { travel.path.remove(0); }
    if let Some(&next) = travel.path.first() { travel.target = next; }
}

fn summon_can_go(board: &Board, entity: &Entity, p: Point) -> bool {
    !(entity.summoned && entity.friendly()) || board.player_sees(p)
}

//////////////////////////////////////////////////////////////////////////////

// Chasing a foe

// Returns true if the monster should follow its stored path this turn,
// with travel.target set to the next waypoint.
pub fn try_pathfind(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    let Some(entity) = board.entities.get(eid) else { return false; };
    let Some(foe) = entity.foe.and_then(|x| board.entities.get(x)) else { return false; };

    let (pos, foe_pos) = (entity.pos, foe.pos);
    let caps = Capabilities::of(entity);
    let species = entity.species;
    let friendly = entity.friendly();
    let range = tracking_range(entity, &board.config);

    let mut need_pathfind = !traverse::can_go_straight(board, &caps, pos, foe_pos);

    // Monsters that can strike at anything in sight don't need to walk.
    if need_pathfind && !friendly && species.los_ability() && board.see_cell(pos, foe_pos) {
        need_pathfind = false;
    }
    if need_pathfind && !friendly && species.ranged() && board.see_cell(pos, foe_pos) {
        need_pathfind = false;
    }

    if !need_pathfind {
        let travel = &mut board.entities[eid].travel;
        if !matches!(travel.mode, TravelTarget::Patrol | TravelTarget::None) {
            travel.clear_path();
            travel.mode = TravelTarget::None;
        }
        return false;
    }

    if target_is_unreachable(entity) && !entity.retreating {
        let config = &board.config;
        let retry = one_chance_in(config.unreachable_retry_chance, rng) ||
                    (caps.clings && one_chance_in(config.cling_retry_chance, rng));
        if !retry { return false; }
    }

    // Keep the old path while it still leads somewhere the foe can be
    // reached from in a straight line.
    let travel = &entity.travel;
    if travel.mode == TravelTarget::Foe && travel.is_travelling() {
        let (first, last) = (travel.path[0], travel.path[travel.path.len() - 1]);
        if traverse::can_go_straight(board, &caps, last, foe_pos) {
            if pos == first {
                let travel = &mut board.entities[eid].travel;
                travel.path.remove(0);
                if let Some(&next) = travel.path.first() {
                    travel.target = next;
                    return true;
                }
            } else if traverse::can_go_straight(board, &caps, pos, first) {
                board.entities[eid].travel.target = first;
                return true;
            }
        }
    }

    if grid_distance(pos, foe_pos) > range {
        debug!("{:?} at {:?} lost track of its foe", species, pos);
        board.entities[eid].travel.mode = TravelTarget::Unreachable;
        return false;
    }

    match find_waypoints(board, eid, foe_pos, Some(range), rng) {
        Some(path) if !path.is_empty() => {
            let travel = &mut board.entities[eid].travel;
            travel.target = path[0];
            travel.path = path;
            travel.mode = TravelTarget::Foe;
            true
        }
        _ => {
            set_no_path_found(board, eid);
            false
        }
    }
}

pub fn set_no_path_found(board: &mut Board, eid: EID) {
    let Some(entity) = board.entities.get_mut(eid) else { return; };
    debug!("{:?} at {:?} can't reach its foe", entity.species, entity.pos);
    entity.travel.mode = TravelTarget::Unreachable;

    let candidates = nearby_candidates(board, eid);
    propagate_unreachable(board, eid, &candidates);
}

// Non-player actors near the monster that it can see and that can see it.
pub fn nearby_candidates(board: &Board, eid: EID) -> Vec<EID> {
    let Some(entity) = board.entities.get(eid) else { return vec![]; };
    let pos = entity.pos;
    cells_by_distance(pos, board.config.propagation_radius, false).into_iter()
        .filter(|&p| board.in_bounds(p))
        .filter_map(|p| board.actor_at(p))
        .filter(|&x| x != eid && !board.entities[x].player)
        .filter(|&x| {
            let other = board.entities[x].pos;
            board.see_cell(pos, other) && board.see_cell(other, pos)
        })
        .collect()
}

// Shares a failed search with peers that would fail the same way: no
// smarter, same habitat, same clinging and flight, and chasing the same foe
// with no plan of their own.
pub fn propagate_unreachable(board: &mut Board, originator: EID, candidates: &[EID]) {
    let Some(source) = board.entities.get(originator) else { return; };
    let (species, foe) = (source.species, source.foe);

    for &eid in candidates {
        if eid == originator { continue; }
        let Some(other) = board.entities.get_mut(eid) else { continue; };
        let peer = other.species;
        if peer.intel > species.intel { continue; }
        if peer.habitat != species.habitat { continue; }
        if peer.clings() != species.clings() || peer.flies() != species.flies() { continue; }

        let travel = &mut other.travel;
        if travel.mode == TravelTarget::None && !travel.is_travelling() && other.foe == foe {
            debug!("{:?} at {:?} gives up on its foe too", peer, other.pos);
            travel.mode = TravelTarget::Unreachable;
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Wandering

pub fn check_wander_target(board: &mut Board, eid: EID, is_pacified: bool, rng: &mut RNG) {
    let Some(entity) = board.entities.get(eid) else { return; };
    let species = entity.species;

    let retarget = entity.pos == entity.travel.target ||
                   species.batty() ||
                   (!is_pacified && !species.avatar() &&
                    one_chance_in(board.config.wander_retarget_chance, rng)) ||
                   (species.herd() && !herd_ok(board, eid)) ||
                   !band_ok(board, eid);
    if !retarget { return; }

    let mut need_target = true;
    if board.entities[eid].travel.is_travelling() {
        need_target = handle_monster_travelling(board, eid, rng);
    }
    if need_target && board.entities[eid].travel.is_patrolling() {
        need_target = handle_monster_patrolling(board, eid, rng);
    }
    if need_target && species.herd() {
        need_target = herd_wander_target(board, eid, rng);
    }
    if need_target && active_band_leader(board, eid).is_some() {
        need_target = band_wander_target(board, eid, rng);
    }
    if need_target { set_random_target(board, eid, rng); }
}

// Returns true if the monster needs a fresh target.
fn handle_monster_travelling(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    let entity = &board.entities[eid];
    let pos = entity.pos;
    let path = entity.travel.path.clone();
    let Some(&first) = path.first() else { return true; };

    if pos == first {
        let travel = &mut board.entities[eid].travel;
        travel.path.remove(0);
        return match travel.path.first() {
            Some(&next) => {
                travel.target = next;
                false
            }
            None => {
                travel.mode = TravelTarget::None;
                true
            }
        };
    }

    if can_go_straight(board, eid, pos, first) { return false; }

    // Skip ahead to the furthest waypoint still in a straight line.
    let skip = (1..path.len()).rev().find(|&i| can_go_straight(board, eid, pos, path[i]));
    if let Some(i) = skip {
        let travel = &mut board.entities[eid].travel;
        travel.target = path[i];
        travel.path.drain(..i);
        return false;
    }

    let last = path[path.len() - 1];
    let result = find_waypoints(board, eid, last, None, rng);
    let entity = &mut board.entities[eid];
    let travel = &mut entity.travel;
    match result {
        Some(path) if !path.is_empty() => {
            debug!("{:?} at {:?} recomputed its path to {:?}", entity.species, pos, last);
            travel.target = path[0];
            travel.path = path;
            false
        }
        _ => {
            debug!("{:?} at {:?} abandons its path to {:?}", entity.species, pos, last);
            travel.clear_path();
            travel.mode = TravelTarget::None;
            true
        }
    }
}

fn choose_random_patrol_target(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    let entity = &board.entities[eid];
    let Some(patrol) = entity.travel.patrol_point else { return false; };
    let caps = Capabilities::of(entity);
    let pos = entity.pos;
    let intel = caps.intel;
    let los = board.config.los_radius;

    if intel == Intelligence::Brainless && coinflip(rng) { return true; }
    if grid_distance(pos, patrol) > 2 * los { return false; }

    let patrol_seen = board.see_cell(pos, patrol);
    if intel == Intelligence::Brainless && !patrol_seen { return false; }

    // Brainless patrollers in sight of their post stay close to it.
    let radius = if intel > Intelligence::Brainless || !patrol_seen { los } else { 4 };
    let smart = intel >= Intelligence::Human;
    let use_own_sight = smart || !patrol_seen;

    let patrol_sees = |p| traverse::can_see_for_movement(board, &caps, patrol, p, radius);
    let mon_sees = |p| use_own_sight && traverse::can_see_for_movement(board, &caps, pos, p, los);

    let mut count = 0;
    let mut choice = None;
    for p in cells_by_distance(patrol, los, true) {
        if !board.in_bounds(p) || board.actor_at(p).is_some() { continue; }
        if !traverse::can_pass_through(board, &caps, p) { continue; }

        let visible = if patrol_seen {
            patrol_sees(p) || (smart && mon_sees(p))
        } else {
            patrol_sees(p) && mon_sees(p)
        };
        if !visible { continue; }

        let pick = if intel == Intelligence::Brainless && p == patrol {
            count += 3;
            rng.gen_range(0..count) < 3
        } else {
            count += 1;
            one_chance_in(count, rng)
        };
        if pick { choice = Some(p); }
    }

    if let Some(p) = choice { board.entities[eid].travel.target = p; }
    count > 0
}

// Returns true if the monster needs a fresh target.
fn handle_monster_patrolling(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    if choose_random_patrol_target(board, eid, rng) { return false; }
    let Some(patrol) = board.entities[eid].travel.patrol_point else { return true; };

    let result = find_waypoints(board, eid, patrol, None, rng);
    let entity = &mut board.entities[eid];
    let travel = &mut entity.travel;
    match result {
        Some(path) if !path.is_empty() => {
            travel.target = path[0];
            travel.path = path;
            travel.mode = TravelTarget::Patrol;
        }
        Some(_) => travel.target = patrol,
        None => {
            debug!("{:?} at {:?} stops patrolling", entity.species, entity.pos);
            travel.patrol_point = None;
            travel.mode = TravelTarget::None;
            return true;
        }
    }
    false
}

pub fn set_random_target(board: &mut Board, eid: EID, rng: &mut RNG) {
    let entity = &board.entities[eid];
    let caps = Capabilities::of(entity);
    let pos = entity.pos;
    let offset = board.config.wander_offset;

    let mut target = board.random_in_bounds(rng);
    for _ in 0..board.config.wander_tries {
        let dx = rng.gen_range(0..=2 * offset) - offset;
        let dy = rng.gen_range(0..=2 * offset) - offset;
        let delta = Point(dx, dy);
        if delta.is_origin() { continue; }

        let p = pos + delta;
        if !board.in_bounds(p) || !summon_can_go(board, entity, p) { continue; }
        if !traverse::is_location_safe(board, &caps, p) { continue; }
        if board.actor_at(p).is_some() { continue; }

        target = p;
        break;
    }
    board.entities[eid].travel.target = target;
}

//////////////////////////////////////////////////////////////////////////////

// Herds and bands

fn comfort_ranges(board: &Board) -> (i32, i32) {
    let comfort = board.config.herd_comfort_range;
    (comfort, board.config.los_radius + comfort)
}

fn active_band_leader(board: &Board, eid: EID) -> Option<&Entity> {
    let leader = board.entities.get(eid)?.band_leader?;
    board.entities.get(leader).filter(|x| x.eid != eid)
}

// A herd animal is content when a herd-mate is close and in sight, or when
// none is anywhere near.
fn herd_ok(board: &Board, eid: EID) -> bool {
    let entity = &board.entities[eid];
    let (comfort, threshold) = comfort_ranges(board);

    let mut intermediate = false;
    for (other_eid, other) in &board.entities {
        if other_eid == eid || other.player { continue; }
        if other.species.genus != entity.species.genus { continue; }

        let distance = grid_distance(other.pos, entity.pos);
        if distance < comfort && board.see_cell(entity.pos, other.pos) { return true; }
        if distance < threshold { intermediate = true; }
    }
    !intermediate
}

// Returns true if the monster still needs a target.
fn herd_wander_target(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    let entity = &board.entities[eid];
    let (pos, caps) = (entity.pos, Capabilities::of(entity));
    let (comfort, threshold) = comfort_ranges(board);

    let friends: Vec<_> = board.entities.iter()
        .filter(|(x, y)| *x != eid && !y.player && y.species.genus == entity.species.genus)
        .map(|(_, y)| y.pos)
        .filter(|&p| grid_distance(p, pos) <= threshold)
        .collect();
    if friends.is_empty() { return true; }

    let mut by_count: BTreeMap<usize, Vec<Point>> = BTreeMap::new();
    for p in cells_by_distance(pos, board.config.los_radius, true) {
        if !board.in_bounds(p) || !board.see_cell(pos, p) { continue; }
        if !traverse::is_location_safe(board, &caps, p) { continue; }

        let count = friends.iter()
            .filter(|&&f| grid_distance(f, p) < comfort && board.see_cell(f, p))
            .count();
        if count > 0 { by_count.entry(count).or_default().push(p); }
    }

    let Some((_, best)) = by_count.iter().next_back() else { return true; };
    let target = best[rng.gen_range(0..best.len())];
    board.entities[eid].travel.target = target;
    false
}

fn band_ok(board: &Board, eid: EID) -> bool {
    let Some(leader) = active_band_leader(board, eid) else { return true; };
    let pos = board.entities[eid].pos;
    let (comfort, threshold) = comfort_ranges(board);
    let distance = grid_distance(pos, leader.pos);
    (distance < comfort && board.see_cell(pos, leader.pos)) || distance >= threshold
}

// Returns true if the monster still needs a target.
fn band_wander_target(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    let Some(leader) = active_band_leader(board, eid) else { return true; };
    let (leader_pos, leader_caps) = (leader.pos, Capabilities::of(leader));
    let pos = board.entities[eid].pos;
    let (comfort, threshold) = comfort_ranges(board);

    if grid_distance(pos, leader_pos) > threshold {
        let Some(path) = find_waypoints(board, eid, leader_pos, Some(LONG_TRAVEL_RANGE), rng)
            .filter(|x| !x.is_empty()) else { return true; };
        let travel = &mut board.entities[eid].travel;
        travel.target = path[0];
        travel.path = path;
        travel.mode = TravelTarget::Patrol;
        return false;
    }

    let positions: Vec<_> = cells_by_distance(pos, board.config.los_radius, true).into_iter()
        .filter(|&p| board.in_bounds(p) && board.see_cell(pos, p))
        .filter(|&p| grid_distance(p, leader_pos) < comfort)
        .filter(|&p| traverse::is_location_safe(board, &leader_caps, p))
        .collect();
    if positions.is_empty() { return true; }

    board.entities[eid].travel.target = positions[rng.gen_range(0..positions.len())];
    false
}

//////////////////////////////////////////////////////////////////////////////

// Slimes

// Heads for the nearest visible item, or wanders if there isn't one.
pub fn set_random_slime_target(board: &mut Board, eid: EID, rng: &mut RNG) {
    let pos = board.entities[eid].pos;
    let item = cells_by_distance(pos, board.config.los_radius, true).into_iter()
        .find(|&p| board.in_bounds(p) && board.has_item_at(p) && board.see_cell(pos, p));
    if let Some(p) = item { board.entities[eid].travel.target = p; }

    let target = board.entities[eid].travel.target;
    if target == pos || target == board.player_pos() { set_random_target(board, eid, rng); }
}

//////////////////////////////////////////////////////////////////////////////

// Merfolk avatars

// Scores a cell by the water around it. Also returns whether any deep water
// neighbours it.
fn water_score(board: &Board, p: Point) -> (i32, bool) {
    let (mut shallow, mut deep, mut near_floor) = (0, 0, false);
    for dir in dirs::COMPASS {
        let q = p + dir;
        if !board.in_bounds(q) { continue; }
        match board.feature_at(q) {
            Feature::ShallowWater => {
                shallow += 1;
                near_floor = true;
            }
            Feature::DeepWater => deep += 1,
            x if x.has_solid_floor() => near_floor = true,
            _ => {}
        }
    }

    // Cells with no land or shallows next to them score nothing.
    if !near_floor { return (0, deep > 0); }

    let mut score = shallow + deep;
    if deep > 0 { score += 6; }
    if board.feature_at(p) == Feature::DeepWater { score += 1; }
    (score, deep > 0)
}

// Seeks a cell surrounded by water to sing from. Returns true if the avatar
// has a firing position to move to or hold.
pub fn find_merfolk_avatar_water_target(board: &mut Board, eid: EID, rng: &mut RNG) -> bool {
    let entity = &board.entities[eid];
    debug_assert!(entity.species.avatar());
    let pos = entity.pos;
    let player = board.player_pos();

    if grid_distance(pos, player) >= 5 {
        board.entities[eid].travel.firing_pos = None;
        return false;
    }

    let (score, deep) = water_score(board, pos);
    if score >= 12 && deep && board.feature_at(pos) == Feature::DeepWater {
        board.entities[eid].travel.firing_pos = Some(pos);
        return true;
    }

    // Already headed somewhere good.
    let travel = &entity.travel;
    if travel.mode == TravelTarget::MerfolkAvatar {
        if let Some(&last) = travel.path.last() {
            if grid_distance(pos, last) > 2 { return true; }
        }
    }

    let mut best: Option<Point> = None;
    let mut best_score = 0;
    let mut best_deep = false;

    // The first pass only considers cells no closer to the player than to
    // the avatar.
    for pass in 0..2 {
        if best_deep { break; }
        let mut count = 0;
        for p in cells_by_distance(pos, board.config.los_radius, true) {
            if !board.in_bounds(p) || !board.feature_at(p).is_water() { continue; }
            if !board.see_cell(pos, p) { continue; }

            let distance = grid_distance(pos, p);
            if pass == 0 && distance > grid_distance(player, p) { continue; }

            let (score, deep) = water_score(board, p);
            if score > best_score {
                (best, best_score, best_deep, count) = (Some(p), score, deep, 1);
            } else if score == best_score && score > 0 {
                let old = best.map_or(i32::MAX, |b| grid_distance(pos, b));
                if distance < old {
                    (best, best_deep, count) = (Some(p), deep, 1);
                } else if distance == old {
                    count += 1;
                    if one_chance_in(count, rng) { (best, best_deep) = (Some(p), deep); }
                }
            }
        }
    }

    let Some(best) = best else { return false; };
    if best == pos {
        board.entities[eid].travel.firing_pos = Some(pos);
        return true;
    }

    let Some(path) = find_waypoints(board, eid, best, None, rng)
        .filter(|x| !x.is_empty()) else { return false; };
    let travel = &mut board.entities[eid].travel;
    travel.firing_pos = Some(path[0]);
    travel.target = path[0];
    travel.path = path;
    travel.mode = TravelTarget::MerfolkAvatar;
    true
}

//////////////////////////////////////////////////////////////////////////////

// Leaving the level

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LevelExit {
    pub target: Point,
    pub unreachable: bool,
}

pub fn is_level_exit<V: WorldView + ?Sized>(view: &V, p: Point) -> bool {
    if view.feature_at(p).is_stair() { return true; }
    view.trap_at(p).is_some_and(|x| matches!(x.kind, TrapKind::Shaft | TrapKind::Teleport))
}

pub fn find_all_level_exits(board: &Board) -> Vec<LevelExit> {
    let Point(w, h) = board.size();
    let mut result = vec![];
    for y in 0..h {
        for x in 0..w {
            let p = Point(x, y);
            if is_level_exit(board, p) { result.push(LevelExit { target: p, unreachable: false }); }
        }
    }
    result
}

// Refreshes `exits` when empty or on `reset`, then returns the index of the
// nearest exit not yet marked unreachable.
pub fn find_nearest_level_exit(board: &Board, eid: EID, exits: &mut Vec<LevelExit>,
                               reset: bool) -> Option<usize> {
    if exits.is_empty() || reset { *exits = find_all_level_exits(board); }
    let entity = board.entities.get(eid)?;

    let mut result = None;
    let mut best = i32::MAX;
    for (i, exit) in exits.iter().enumerate() {
        if exit.unreachable { continue; }
        let distance = grid_distance(entity.pos, exit.target);
        if distance > best { continue; }

        // Only natives know where the hidden traps are.
        let hidden = board.trap_at(exit.target).is_some_and(|x| !x.known);
        if hidden && !entity.native { continue; }

        result = Some(i);
        best = distance;
    }
    result
}

// Moves the monster along toward an exit, marking the exit unreachable if
// there's no way there.
pub fn head_for_level_exit(board: &mut Board, eid: EID, exits: &mut [LevelExit],
                           index: usize, rng: &mut RNG) {
    let target = exits[index].target;
    if board.entities[eid].travel.path.last() == Some(&target) {
        follow_waypoints(board, eid);
        return;
    }

    let result = find_waypoints(board, eid, target, Some(LONG_TRAVEL_RANGE), rng);
    let travel = &mut board.entities[eid].travel;
    match result {
        Some(path) if !path.is_empty() => {
            travel.target = path[0];
            travel.path = path;
            travel.mode = TravelTarget::Patrol;
        }
        Some(_) => travel.target = target,
        None => exits[index].unreachable = true,
    }
}

// A pacified monster leaves once it reaches an exit or wanders far enough
// from the player. Returns true if it left.
pub fn pacified_leave_level(board: &mut Board, eid: EID, exits: &[LevelExit],
                            index: Option<usize>) -> bool {
    let Some(entity) = board.entities.get(eid) else { return false; };
    let pos = entity.pos;

    let at_exit = is_level_exit(board, pos) ||
                  index.and_then(|i| exits.get(i)).is_some_and(|x| x.target == pos);
    let far = grid_distance(pos, board.player_pos()) >= 3 * board.config.los_radius;
    if !at_exit && !far { return false; }

    debug!("{:?} at {:?} leaves the level", entity.species, pos);
    board.remove_entity(eid);
    true
}

//////////////////////////////////////////////////////////////////////////////

// Danger checks

// Whether the monster could plausibly get to the player, assuming unmapped
// cells are open. A failure is remembered until the player sees it anew.
pub fn can_reach_player(board: &mut Board, eid: EID, want_move: bool, rng: &mut RNG) -> bool {
    let Some(entity) = board.entities.get(eid) else { return false; };
    let player = board.player_pos();
    let distance = grid_distance(entity.pos, player);

    if entity.species.stationary() {
        let reach = if want_move { distance - 1 } else { distance };
        return reach < 2;
    }
    if distance <= 1 { return true; }
    match entity.travel.mode {
        TravelTarget::Foe => return true,
        TravelTarget::KnownUnreachable => return false,
        _ => {}
    }

    let range = max(board.config.los_radius, 2 * tracking_range(entity, &board.config));
    let found = {
        let mut pathfinder = Pathfinder::new(&*board, &board.config);
        pathfinder.set_range(range);
        pathfinder.set_flags(ModeFlags { unmapped_passable: true, ..ModeFlags::default() });
        pathfinder.init_pathfind_for_actor(entity, player, rng)
    };
    if found { return true; }

    debug!("{:?} at {:?} can't reach the player", entity.species, entity.pos);
    board.entities[eid].travel.mode = TravelTarget::KnownUnreachable;
    false
}

// Forgets KnownUnreachable for monsters the player has just caught sight of.
pub fn revalidate_known_unreachable(board: &mut Board) {
    for eid in board.monsters() {
        let visible = board.player_sees(board.entities[eid].pos);
        let entity = &mut board.entities[eid];
        if visible && !entity.seen_by_player &&
           entity.travel.mode == TravelTarget::KnownUnreachable {
            entity.travel.mode = TravelTarget::None;
        }
        entity.seen_by_player = visible;
    }
}

//////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use crate::config::Config;
    use crate::entity::Attitude;
    use crate::pathing::searches_run;
    use crate::terrain::Trap;

    fn board(map: &str) -> Board { Board::parse(map, Config::default()).unwrap() }

    fn rng() -> RNG { RNG::seed_from_u64(17) }

    fn at(board: &Board, x: i32, y: i32) -> EID { board.actor_at(Point(x, y)).unwrap() }

    fn mode(board: &Board, eid: EID) -> TravelTarget { board.entities[eid].travel.mode }

    #[test]
    fn test_no_pathfind_in_open_room() {
        let mut board = board("\
            #########\n\
            #g......#\n\
            #......@#\n\
            #########\n");
        let goblin = at(&board, 1, 1);
        board.entities[goblin].travel.mode = TravelTarget::Unreachable;

        let before = searches_run();
        assert!(!try_pathfind(&mut board, goblin, &mut rng()));
        assert!(mode(&board, goblin) == TravelTarget::None);
        assert!(searches_run() == before);
    }

    #[test]
    fn test_pathfind_around_wall() {
        let mut board = board("\
            #########\n\
            #g..#...#\n\
            #...#.@.#\n\
            #.......#\n\
            #########\n");
        let goblin = at(&board, 1, 1);
        let mut rng = rng();

        assert!(try_pathfind(&mut board, goblin, &mut rng));
        let travel = &board.entities[goblin].travel;
        assert!(travel.mode == TravelTarget::Foe);
        assert!(travel.path.last() == Some(&Point(6, 2)));
        assert!(travel.target == travel.path[0]);
        assert!(can_go_straight(&board, goblin, Point(1, 1), travel.target));

        // A second call reuses the stored path.
        let before = searches_run();
        let path = board.entities[goblin].travel.path.clone();
        assert!(try_pathfind(&mut board, goblin, &mut rng));
        assert!(searches_run() == before);
        assert!(board.entities[goblin].travel.path == path);
    }

    #[test]
    fn test_out_of_tracking_range() {
        let mut board = board("\
            ################\n\
            #r............@#\n\
            ################\n");
        let rat = at(&board, 1, 1);

        let before = searches_run();
        assert!(!try_pathfind(&mut board, rat, &mut rng()));
        assert!(mode(&board, rat) == TravelTarget::Unreachable);
        assert!(searches_run() == before);
    }

    #[test]
    fn test_unreachable_spreads_without_new_searches() {
        let config = Config { unreachable_retry_chance: 1_000_000, ..Config::default() };
        let mut board = Board::parse("\
            ###########\n\
            #.........#\n\
            #.gg.www..#\n\
            #....w@w..#\n\
            #....www..#\n\
            #.........#\n\
            ###########\n", config).unwrap();
        let (a, b) = (at(&board, 2, 2), at(&board, 3, 2));
        let mut rng = rng();

        let before = searches_run();
        assert!(!try_pathfind(&mut board, a, &mut rng));
        assert!(mode(&board, a) == TravelTarget::Unreachable);
        assert!(mode(&board, b) == TravelTarget::Unreachable);

        assert!(!try_pathfind(&mut board, b, &mut rng));
        assert!(mode(&board, b) == TravelTarget::Unreachable);
        assert!(searches_run() == before + 1);
    }

    #[test]
    fn test_ranged_attacker_holds_position() {
        let map = "\
            #########\n\
            #o..8..@#\n\
            #########\n";
        let mut board = board(map);
        let archer = at(&board, 1, 1);

        let before = searches_run();
        assert!(!try_pathfind(&mut board, archer, &mut rng()));
        assert!(mode(&board, archer) == TravelTarget::None);
        assert!(searches_run() == before);

        // A melee monster in the same spot has to look for a way around.
        let mut melee = Board::parse(&map.replace('o', "g"), Config::default()).unwrap();
        let goblin = at(&melee, 1, 1);
        assert!(!try_pathfind(&mut melee, goblin, &mut rng()));
        assert!(mode(&melee, goblin) == TravelTarget::Unreachable);
        assert!(searches_run() == before + 1);
    }

    #[test]
    fn test_gazer_holds_position() {
        let mut board = board("\
            #########\n\
            #E..8..@#\n\
            #########\n");
        let eye = at(&board, 1, 1);
        board.entities[eye].travel.mode = TravelTarget::Unreachable;

        let before = searches_run();
        assert!(!try_pathfind(&mut board, eye, &mut rng()));
        assert!(mode(&board, eye) == TravelTarget::None);
        assert!(searches_run() == before);
    }

    #[test]
    fn test_retreating_monster_always_searches() {
        let config = Config { unreachable_retry_chance: 1_000_000, ..Config::default() };
        let mut board = Board::parse("\
            ########\n\
            #g..8.@#\n\
            ########\n", config).unwrap();
        let goblin = at(&board, 1, 1);
        board.entities[goblin].travel.mode = TravelTarget::Unreachable;
        board.entities[goblin].retreating = true;
        let mut rng = rng();

        let before = searches_run();
        assert!(!try_pathfind(&mut board, goblin, &mut rng));
        assert!(mode(&board, goblin) == TravelTarget::Unreachable);
        assert!(searches_run() == before + 1);

        board.entities[goblin].retreating = false;
        assert!(!try_pathfind(&mut board, goblin, &mut rng));
        assert!(searches_run() == before + 1);
    }

    #[test]
    fn test_clinger_retries_more_often() {
        let config = Config {
            unreachable_retry_chance: 1_000_000,
            cling_retry_chance: 1,
            ..Config::default()
        };
        let map = "\
            ########\n\
            #s..8.@#\n\
            ########\n";

        let mut board = Board::parse(map, config.clone()).unwrap();
        let spider = at(&board, 1, 1);
        board.entities[spider].travel.mode = TravelTarget::Unreachable;
        let before = searches_run();
        assert!(!try_pathfind(&mut board, spider, &mut rng()));
        assert!(searches_run() == before + 1);

        let mut board = Board::parse(&map.replace('s', "r"), config).unwrap();
        let rat = at(&board, 1, 1);
        board.entities[rat].travel.mode = TravelTarget::Unreachable;
        assert!(!try_pathfind(&mut board, rat, &mut rng()));
        assert!(mode(&board, rat) == TravelTarget::Unreachable);
        assert!(searches_run() == before + 1);
    }

    #[test]
    fn test_set_no_path_found_is_idempotent() {
        let mut board = board("\
            #######\n\
            #.rrr.#\n\
            #.....#\n\
            #....@#\n\
            #######\n");
        let rat = at(&board, 3, 1);
        let modes = |board: &Board| -> Vec<_> {
            board.monsters().into_iter().map(|x| mode(board, x)).collect()
        };

        set_no_path_found(&mut board, rat);
        let once = modes(&board);
        assert!(once.iter().all(|&x| x == TravelTarget::Unreachable));
        set_no_path_found(&mut board, rat);
        assert!(modes(&board) == once);
    }

    #[test]
    fn test_propagation_scope() {
        let mut board = board("\
            #########\n\
            #......@#\n\
            #.gzrb..#\n\
            #..sj#..#\n\
            #...e.r.#\n\
            #########\n");
        let rat = at(&board, 4, 2);
        let marked = |board: &Board, x, y| mode(board, at(board, x, y)) == TravelTarget::Unreachable;

        set_no_path_found(&mut board, rat);
        assert!(marked(&board, 4, 2));
        assert!(marked(&board, 3, 2));  // zombie
        assert!(marked(&board, 4, 3));  // jackal
        assert!(!marked(&board, 2, 2)); // goblin: smarter
        assert!(!marked(&board, 5, 2)); // bat: flies
        assert!(!marked(&board, 3, 3)); // spider: clings
        assert!(!marked(&board, 4, 4)); // eel: lives in water
        assert!(!marked(&board, 6, 4)); // rat: out of sight
    }

    #[test]
    fn test_propagation_needs_same_foe_and_no_plan() {
        let mut board = board("\
            #######\n\
            #.rrr.#\n\
            #....@#\n\
            #######\n");
        let (a, b, c) = (at(&board, 2, 1), at(&board, 3, 1), at(&board, 4, 1));
        board.entities[a].foe = None;
        board.entities[c].travel.mode = TravelTarget::Patrol;

        set_no_path_found(&mut board, b);
        assert!(mode(&board, a) == TravelTarget::None);
        assert!(mode(&board, c) == TravelTarget::Patrol);
    }

    #[test]
    fn test_handle_travelling() {
        let mut board = board("\
            #########\n\
            #..r....#\n\
            #......@#\n\
            #########\n");
        let rat = at(&board, 3, 1);
        let mut rng = rng();

        board.entities[rat].travel.path = [Point(3, 1), Point(5, 1)].into_iter().collect();
        assert!(!handle_monster_travelling(&mut board, rat, &mut rng));
        assert!(board.entities[rat].travel.target == Point(5, 1));
        assert!(board.entities[rat].travel.path.len() == 1);

        board.move_entity(rat, Point(5, 1));
        board.entities[rat].travel.mode = TravelTarget::Patrol;
        assert!(handle_monster_travelling(&mut board, rat, &mut rng));
        assert!(!board.entities[rat].travel.is_travelling());
        assert!(mode(&board, rat) == TravelTarget::None);
    }

    #[test]
    fn test_handle_travelling_skips_ahead() {
        let mut board = board("\
            #########\n\
            #r......#\n\
            #......@#\n\
            #########\n");
        let rat = at(&board, 1, 1);
        let mut rng = rng();

        // The first waypoint is behind a wall; the second is in reach.
        board.level.set_feature(Point(2, 1), Feature::Wall);
        let path = [Point(3, 1), Point(1, 2), Point(6, 2)];
        board.entities[rat].travel.path = path.into_iter().collect();
        assert!(!handle_monster_travelling(&mut board, rat, &mut rng));
        let travel = &board.entities[rat].travel;
        assert!(travel.target == Point(1, 2));
        assert!(travel.path.len() == 2);

        // With nothing in reach, the path to the last waypoint is rebuilt.
        board.entities[rat].travel.path = [Point(3, 1), Point(4, 1)].into_iter().collect();
        assert!(!handle_monster_travelling(&mut board, rat, &mut rng));
        let travel = &board.entities[rat].travel;
        assert!(travel.path.last() == Some(&Point(4, 1)));
        assert!(travel.target == travel.path[0]);
        assert!(can_go_straight(&board, rat, Point(1, 1), travel.target));
    }

    #[test]
    fn test_patrol_target_near_post() {
        let mut board = board("\
            ###########\n\
            #.........#\n\
            #....g....#\n\
            #.........#\n\
            #........@#\n\
            ###########\n");
        let goblin = at(&board, 5, 2);
        board.entities[goblin].travel.patrol_point = Some(Point(5, 2));

        assert!(!handle_monster_patrolling(&mut board, goblin, &mut rng()));
        let target = board.entities[goblin].travel.target;
        assert!(grid_distance(target, Point(5, 2)) <= board.config.los_radius);
        assert!(board.actor_at(target).is_none());
        assert!(board.feature_at(target) == Feature::Floor);
    }

    #[test]
    fn test_patrol_abandoned_when_post_is_too_far() {
        let mut board = board("\
            ######################\n\
            #g..................@#\n\
            ######################\n");
        let goblin = at(&board, 1, 1);
        board.entities[goblin].travel.patrol_point = Some(Point(19, 1));

        assert!(handle_monster_patrolling(&mut board, goblin, &mut rng()));
        assert!(!board.entities[goblin].travel.is_patrolling());
        assert!(mode(&board, goblin) == TravelTarget::None);
    }

    #[test]
    fn test_random_target() {
        let mut board = board("\
            ###############\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #......r......#\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #.............#\n\
            #............@#\n\
            ###############\n");
        let rat = at(&board, 7, 7);
        let mut rng = rng();

        for _ in 0..20 {
            set_random_target(&mut board, rat, &mut rng);
            let target = board.entities[rat].travel.target;
            assert!(target != Point(7, 7));
            assert!(grid_distance(target, Point(7, 7)) <= board.config.wander_offset);
            assert!(board.feature_at(target) == Feature::Floor);
            assert!(board.actor_at(target).is_none());
        }
    }

    #[test]
    fn test_friendly_summons_stay_in_view() {
        let config = Config { wander_offset: 2, ..Config::default() };
        let mut board = Board::parse("\
            ###########\n\
            #....#....#\n\
            #.@r.#....#\n\
            #....#....#\n\
            ###########\n", config).unwrap();
        let rat = at(&board, 3, 2);
        board.entities[rat].attitude = Attitude::Friendly;
        board.entities[rat].summoned = true;
        let mut rng = rng();

        for _ in 0..20 {
            set_random_target(&mut board, rat, &mut rng);
            assert!(board.entities[rat].travel.target.0 < 5);
        }
    }

    #[test]
    fn test_check_wander_target_retargets_on_arrival() {
        let mut board = board("\
            ###########\n\
            #.........#\n\
            #....r....#\n\
            #.........#\n\
            #........@#\n\
            ###########\n");
        let rat = at(&board, 5, 2);
        board.entities[rat].foe = None;

        check_wander_target(&mut board, rat, false, &mut rng());
        assert!(board.entities[rat].travel.target != Point(5, 2));
    }

    #[test]
    fn test_herd_regroups() {
        let mut board = board("\
            ###########\n\
            #j.......j#\n\
            #.........#\n\
            #........@#\n\
            ###########\n");
        let (a, b) = (at(&board, 1, 1), at(&board, 9, 1));
        assert!(!herd_ok(&board, a));

        assert!(!herd_wander_target(&mut board, a, &mut rng()));
        let target = board.entities[a].travel.target;
        let comfort = board.config.herd_comfort_range;
        assert!(grid_distance(target, board.entities[b].pos) < comfort);

        board.move_entity(a, Point(6, 1));
        assert!(herd_ok(&board, a));
    }

    #[test]
    fn test_band_follows_leader() {
        let mut board = board("\
            #######################\n\
            #g...................g#\n\
            #.....................#\n\
            #....................@#\n\
            #######################\n");
        let (follower, leader) = (at(&board, 1, 1), at(&board, 21, 1));
        board.entities[follower].band_leader = Some(leader);
        assert!(band_ok(&board, follower));

        assert!(!band_wander_target(&mut board, follower, &mut rng()));
        let travel = &board.entities[follower].travel;
        assert!(travel.mode == TravelTarget::Patrol);
        assert!(travel.path.last() == Some(&Point(21, 1)));

        board.move_entity(follower, Point(12, 1));
        assert!(!band_ok(&board, follower));
        assert!(!band_wander_target(&mut board, follower, &mut rng()));
        let target = board.entities[follower].travel.target;
        assert!(grid_distance(target, Point(21, 1)) < board.config.herd_comfort_range);
    }

    #[test]
    fn test_slime_target() {
        let mut board = board("\
            #########\n\
            #J...$..#\n\
            #......@#\n\
            #########\n");
        let jelly = at(&board, 1, 1);

        set_random_slime_target(&mut board, jelly, &mut rng());
        assert!(board.entities[jelly].travel.target == Point(5, 1));

        board.level.items.clear();
        board.entities[jelly].travel.target = Point(1, 1);
        set_random_slime_target(&mut board, jelly, &mut rng());
        assert!(board.entities[jelly].travel.target != Point(1, 1));
    }

    #[test]
    fn test_merfolk_avatar_seeks_deep_water() {
        let mut board = board("\
            ##########\n\
            #........#\n\
            #..~~~...#\n\
            #..~ww~..#\n\
            #..~ww~..#\n\
            #M.......#\n\
            #.@......#\n\
            ##########\n");
        let avatar = at(&board, 1, 5);
        let mut rng = rng();

        assert!(find_merfolk_avatar_water_target(&mut board, avatar, &mut rng));
        let travel = &board.entities[avatar].travel;
        assert!(travel.mode == TravelTarget::MerfolkAvatar);
        assert!(travel.path.last() == Some(&Point(4, 3)));
        assert!(travel.firing_pos == travel.path.first().copied());

        board.move_entity(avatar, Point(4, 3));
        assert!(find_merfolk_avatar_water_target(&mut board, avatar, &mut rng));
        assert!(board.entities[avatar].travel.firing_pos == Some(Point(4, 3)));
    }

    #[test]
    fn test_merfolk_avatar_gives_up_when_far() {
        let mut board = board("\
            ##########\n\
            #M..ww..@#\n\
            ##########\n");
        let avatar = at(&board, 1, 1);
        board.entities[avatar].travel.firing_pos = Some(Point(4, 1));

        assert!(!find_merfolk_avatar_water_target(&mut board, avatar, &mut rng()));
        assert!(board.entities[avatar].travel.firing_pos.is_none());
    }

    #[test]
    fn test_level_exits() {
        let mut board = board("\
            ##########\n\
            #@..r...>#\n\
            #........#\n\
            ##########\n");
        let rat = at(&board, 4, 1);
        board.add_trap(Point(3, 2), Trap { kind: TrapKind::Teleport, known: false });
        board.add_trap(Point(1, 2), Trap { kind: TrapKind::Alarm, known: true });

        let mut exits = vec![];
        let index = find_nearest_level_exit(&board, rat, &mut exits, false).unwrap();
        assert!(exits.len() == 2);
        assert!(exits[index].target == Point(8, 1));

        board.entities[rat].native = true;
        let index = find_nearest_level_exit(&board, rat, &mut exits, false).unwrap();
        assert!(exits[index].target == Point(3, 2));

        exits[index].unreachable = true;
        let index = find_nearest_level_exit(&board, rat, &mut exits, false).unwrap();
        assert!(exits[index].target == Point(8, 1));
        let index = find_nearest_level_exit(&board, rat, &mut exits, true).unwrap();
        assert!(exits[index].target == Point(3, 2));
    }

    #[test]
    fn test_pacified_leave_level() {
        let mut board = board("\
            ##########\n\
            #@.....r>#\n\
            ##########\n");
        let rat = at(&board, 7, 1);
        let mut exits = vec![];
        let index = find_nearest_level_exit(&board, rat, &mut exits, false);

        assert!(!pacified_leave_level(&mut board, rat, &exits, index));
        board.move_entity(rat, Point(8, 1));
        assert!(pacified_leave_level(&mut board, rat, &exits, index));
        assert!(!board.entities.has(rat));
    }

    #[test]
    fn test_can_reach_player() {
        let mut board = board("\
            ###########\n\
            #@........#\n\
            #.....###.#\n\
            #.....#r#.#\n\
            #.....###.#\n\
            ###########\n");
        let rat = at(&board, 7, 3);
        let mut rng = rng();
        assert!(!board.entities[rat].seen_by_player);

        assert!(!can_reach_player(&mut board, rat, true, &mut rng));
        assert!(mode(&board, rat) == TravelTarget::KnownUnreachable);
        let before = searches_run();
        assert!(!can_reach_player(&mut board, rat, true, &mut rng));
        assert!(searches_run() == before);

        revalidate_known_unreachable(&mut board);
        assert!(mode(&board, rat) == TravelTarget::KnownUnreachable);

        board.level.set_feature(Point(6, 2), Feature::Floor);
        board.level.set_feature(Point(6, 3), Feature::Floor);
        revalidate_known_unreachable(&mut board);
        assert!(board.entities[rat].seen_by_player);
        assert!(mode(&board, rat) == TravelTarget::None);
        assert!(can_reach_player(&mut board, rat, true, &mut rng));
    }

    #[test]
    fn test_unmapped_cells_count_as_open() {
        let mut board = board("\
            ###########\n\
            #@....#r..#\n\
            ###########\n");
        let rat = at(&board, 7, 1);
        board.level.forget(Point(6, 1));
        assert!(can_reach_player(&mut board, rat, true, &mut rng()));
    }
}
