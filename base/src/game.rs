use std::mem::{replace, take};

use log::{debug, trace};
use rand::Rng;

use crate::base::{Matrix, Point, RNG, dirs, grid_distance};
use crate::config::Config;
use crate::dex::Species;
use crate::entity::{Capabilities, EID, Entity, EntityArgs, EntityMap};
use crate::error::{Error, Result};
use crate::movetarget::{LevelExit, check_wander_target, find_merfolk_avatar_water_target};
use crate::movetarget::{find_nearest_level_exit, follow_waypoints, head_for_level_exit};
use crate::movetarget::{pacified_leave_level, revalidate_known_unreachable};
use crate::movetarget::{set_random_slime_target, target_is_unreachable, try_pathfind};
use crate::terrain::{Feature, Level, Trap, WorldView, see_cell};
use crate::traverse::{ModeFlags, TraversalPolicy, is_traversable};

//////////////////////////////////////////////////////////////////////////////

// Board

pub struct Board {
    pub config: Config,
    pub level: Level,
    pub entities: EntityMap,
    occupancy: Matrix<Option<EID>>,
    player: EID,
    exits: Vec<LevelExit>,
    turn: usize,
}

impl Board {
    // Reads terrain plus '@' for the player and species glyphs for monsters.
    // Every monster starts out hostile, hunting the player.
    pub fn parse(map: &str, config: Config) -> Result<Self> {
        config.validate()?;

        let mut spawns: Vec<(Point, &'static Species)> = vec![];
        let level = Level::parse_with(map, |ch, p| {
            let Some(species) = Species::by_glyph(ch) else { return false; };
            spawns.push((p, species));
            true
        })?;

        let size = level.size();
        let mut board = Self {
            config,
            level,
            entities: EntityMap::default(),
            occupancy: Matrix::new(size, None),
            player: EID::default(),
            exits: vec![],
            turn: 0,
        };

        let mut player = None;
        for (pos, species) in spawns {
            let is_player = species.glyph == '@';
            if is_player && player.is_some() {
                return Err(Error::DuplicatePlayer { x: pos.0, y: pos.1 });
            }
            let eid = board.add_entity(&EntityArgs { pos, species, player: is_player });
            if is_player { player = Some(eid); }
        }
        let Some(player) = player else { return Err(Error::MissingPlayer); };
        board.player = player;

        for eid in board.monsters() {
            let visible = board.player_sees(board.entities[eid].pos);
            let entity = &mut board.entities[eid];
            entity.foe = Some(player);
            entity.seen_by_player = visible;
        }
        Ok(board)
    }

    // Getters

    pub fn player(&self) -> EID { self.player }

    pub fn player_pos(&self) -> Point { self.entities[self.player].pos }

    pub fn turn(&self) -> usize { self.turn }

    // All non-player entities, in a stable order.
    pub fn monsters(&self) -> Vec<EID> {
        self.entities.iter().filter(|(_, x)| !x.player).map(|(eid, _)| eid).collect()
    }

    pub fn see_cell(&self, from: Point, to: Point) -> bool { see_cell(self, from, to) }

    pub fn player_sees(&self, p: Point) -> bool { self.see_cell(self.player_pos(), p) }

    pub fn random_in_bounds(&self, rng: &mut RNG) -> Point {
        let Point(x, y) = self.level.size();
        Point(rng.gen_range(0..x), rng.gen_range(0..y))
    }

    // Setters

    pub fn add_entity(&mut self, args: &EntityArgs) -> EID {
        let eid = self.entities.add(args);
        let prev = replace(self.occupancy.entry_mut(args.pos).unwrap(), Some(eid));
        assert!(prev.is_none());
        eid
    }

    pub fn add_trap(&mut self, p: Point, trap: Trap) { self.level.add_trap(p, trap); }

    pub fn move_entity(&mut self, eid: EID, target: Point) {
        let entity = &mut self.entities[eid];
        let source = replace(&mut entity.pos, target);

        let old = replace(self.occupancy.entry_mut(source).unwrap(), None);
        assert!(old == Some(eid));
        let new = replace(self.occupancy.entry_mut(target).unwrap(), old);
        assert!(new.is_none());
    }

    pub fn remove_entity(&mut self, eid: EID) {
        // The player entity is never removed.
        let Some(&Entity { pos, player, .. }) = self.entities.get(eid) else { return; };
        if player { return; }

        let old = replace(self.occupancy.entry_mut(pos).unwrap(), None);
        assert!(old == Some(eid));
        self.entities.remove(eid);
    }

    // Rendering

    pub fn render(&self) -> String {
        let Point(x, y) = self.level.size();
        let mut result = String::with_capacity(((x + 1) * y) as usize);
        for row in 0..y {
            for col in 0..x {
                let p = Point(col, row);
                let glyph = match self.actor_at(p) {
                    Some(eid) => self.entities[eid].species.glyph,
                    None => self.level.glyph_at(p),
                };
                result.push(glyph);
            }
            result.push('\n');
        }
        result
    }

    // Update

    pub fn update(&mut self, rng: &mut RNG) {
        revalidate_known_unreachable(self);
        for eid in self.monsters() {
            if !self.entities.has(eid) { continue; }
            self.take_turn(eid, rng);
        }
        self.turn += 1;
    }

    fn take_turn(&mut self, eid: EID, rng: &mut RNG) {
        let entity = &self.entities[eid];
        if entity.species.stationary() { return; }

        if entity.pacified {
            if !self.leave_level(eid, rng) { self.step(eid); }
            return;
        }

        let foe_pos = entity.foe.and_then(|x| self.entities.get(x)).map(|x| x.pos);
        let avatar = entity.species.avatar();
        let slime = entity.species.eats_items() && entity.neutral();

        match foe_pos {
            Some(_) if avatar => {
                if find_merfolk_avatar_water_target(self, eid, rng) {
                    follow_waypoints(self, eid);
                    let travel = &mut self.entities[eid].travel;
                    if !travel.is_travelling() {
                        travel.target = travel.firing_pos.unwrap_or(travel.target);
                    }
                } else {
                    check_wander_target(self, eid, false, rng);
                }
            }
            Some(foe) => {
                if !try_pathfind(self, eid, rng) {
                    if target_is_unreachable(&self.entities[eid]) {
                        check_wander_target(self, eid, false, rng);
                    } else {
                        self.entities[eid].travel.target = foe;
                    }
                }
            }
            None if slime => {
                let entity = &self.entities[eid];
                if entity.pos == entity.travel.target { set_random_slime_target(self, eid, rng); }
            }
            None => check_wander_target(self, eid, false, rng),
        }
        self.step(eid);
    }

    // Returns true if the monster left the level.
    fn leave_level(&mut self, eid: EID, rng: &mut RNG) -> bool {
        let mut exits = take(&mut self.exits);
        let index = find_nearest_level_exit(self, eid, &mut exits, false);
        let left = pacified_leave_level(self, eid, &exits, index);
        if !left {
            match index {
                Some(index) => head_for_level_exit(self, eid, &mut exits, index, rng),
                None => check_wander_target(self, eid, true, rng),
            }
        }
        self.exits = exits;
        left
    }

    // One greedy step toward the current target, through cells the monster
    // may enter right now. Closed doors take a turn to open.
    fn step(&mut self, eid: EID) {
        let entity = &self.entities[eid];
        let (pos, target) = (entity.pos, entity.travel.target);
        if pos == target { return; }

        let policy = TraversalPolicy::ForActor(Capabilities::of(entity));
        let flags = ModeFlags { ignore_actors: false, ..ModeFlags::default() };
        let eats_items = entity.species.eats_items();

        let mut best: Option<(i32, Point)> = None;
        let current = grid_distance(pos, target);
        for dir in dirs::COMPASS {
            let next = pos + dir;
            let distance = grid_distance(next, target);
            if distance >= current { continue; }
            if !is_traversable(self, &policy, &flags, next) { continue; }
            if best.is_none_or(|(x, _)| distance < x) { best = Some((distance, next)); }
        }
        let Some((_, next)) = best else { return; };

        if self.level.feature_at(next).is_closed_door() {
            trace!("{:?} opens the door at {:?}", self.entities[eid].species, next);
            self.level.set_feature(next, Feature::OpenDoor);
            return;
        }
        self.move_entity(eid, next);
        if eats_items && self.level.items.remove(&next) {
            debug!("{:?} eats the item at {:?}", self.entities[eid].species, next);
        }
    }
}

impl WorldView for Board {
    fn size(&self) -> Point { self.level.size() }

    fn feature_at(&self, p: Point) -> Feature { self.level.feature_at(p) }

    fn actor_at(&self, p: Point) -> Option<EID> { self.occupancy.get(p) }

    fn is_observed(&self, p: Point) -> bool { self.level.is_known(p) }

    fn trap_at(&self, p: Point) -> Option<Trap> { self.level.trap_at(p) }

    fn is_immobile_at(&self, p: Point) -> bool {
        let Some(eid) = self.actor_at(p) else { return false; };
        self.entities.get(eid).is_some_and(|x| x.species.stationary())
    }

    fn has_item_at(&self, p: Point) -> bool { self.level.items.contains(&p) }

    fn los_radius(&self) -> i32 { self.config.los_radius }
}

//////////////////////////////////////////////////////////////////////////////
