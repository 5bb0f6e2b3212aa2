use std::iter::FusedIterator;
use std::num::NonZeroU64;
use std::ops::{Index, IndexMut};

use slotmap::{DefaultKey, Key, KeyData};
use slotmap::hop::HopSlotMap;
use thin_vec::ThinVec;

use crate::static_assert_size;
use crate::base::Point;
use crate::dex::{Habitat, Intelligence, Species};

//////////////////////////////////////////////////////////////////////////////

// Travel state

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum TravelTarget {
    #[default]
    None,
    Foe,
    Patrol,
    MerfolkAvatar,
    Unreachable,
    KnownUnreachable,
}

// Persisted across turns. `path` holds the waypoints still to visit and
// `target` is the cell the monster is stepping toward right now.
#[derive(Clone, Debug, Default)]
pub struct TravelState {
    pub mode: TravelTarget,
    pub path: ThinVec<Point>,
    pub target: Point,
    pub patrol_point: Option<Point>,
    pub firing_pos: Option<Point>,
}

impl TravelState {
    pub fn is_travelling(&self) -> bool { !self.path.is_empty() }

    pub fn is_patrolling(&self) -> bool { self.patrol_point.is_some() }

    pub fn clear_path(&mut self) { self.path.clear(); }
}

//////////////////////////////////////////////////////////////////////////////

// Entity

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Attitude {
    #[default]
    Hostile,
    Neutral,
    Friendly,
}

pub struct EntityArgs {
    pub pos: Point,
    pub species: &'static Species,
    pub player: bool,
}

pub struct Entity {
    pub eid: EID,
    pub pos: Point,
    pub species: &'static Species,
    pub attitude: Attitude,
    pub foe: Option<EID>,
    pub band_leader: Option<EID>,
    pub travel: TravelState,

    // Flags:
    pub native: bool,
    pub pacified: bool,
    pub player: bool,
    pub retreating: bool,
    pub summoned: bool,
    pub tracking_bonus: bool,

    // Whether the player could see this entity at the end of the last turn.
    pub seen_by_player: bool,
}

impl Entity {
    fn new(eid: EID, args: &EntityArgs) -> Self {
        Self {
            eid,
            pos: args.pos,
            species: args.species,
            attitude: Attitude::default(),
            foe: None,
            band_leader: None,
            travel: TravelState { target: args.pos, ..Default::default() },

            // Flags:
            native: false,
            pacified: false,
            player: args.player,
            retreating: false,
            summoned: false,
            tracking_bonus: false,

            seen_by_player: false,
        }
    }

    pub fn friendly(&self) -> bool { self.attitude == Attitude::Friendly }

    pub fn neutral(&self) -> bool { self.attitude == Attitude::Neutral }
}

//////////////////////////////////////////////////////////////////////////////

// Capabilities: the movement profile the traversal rules are keyed on.

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    pub habitat: Habitat,
    pub intel: Intelligence,
    pub flies: bool,
    pub clings: bool,
    pub opens_doors: bool,
    pub friendly: bool,
    pub native: bool,
}

impl Capabilities {
    pub fn of(entity: &Entity) -> Self {
        let species = entity.species;
        Self {
            habitat: species.habitat,
            intel: species.intel,
            flies: species.flies(),
            clings: species.clings(),
            // Item eaters slither under doors.
            opens_doors: species.opens_doors() || species.eats_items(),
            friendly: entity.friendly(),
            native: entity.native,
        }
    }

    // A plain walker with no special abilities, for synthetic probes.
    pub fn walker(intel: Intelligence) -> Self {
        Self {
            habitat: Habitat::Land,
            intel,
            flies: false,
            clings: false,
            opens_doors: false,
            friendly: false,
            native: false,
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// EID

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct EID(NonZeroU64);
static_assert_size!(Option<EID>, 8);

impl Default for EID {
    fn default() -> Self {
        to_eid(DefaultKey::null())
    }
}

fn to_key(eid: EID) -> DefaultKey {
    KeyData::from_ffi(eid.0.get()).into()
}

// The ffi form of a slotmap key, even the null key, is never zero.
fn to_eid(key: DefaultKey) -> EID {
    EID(NonZeroU64::new(key.data().as_ffi()).unwrap())
}

//////////////////////////////////////////////////////////////////////////////

// EntityMap

type BaseMap = HopSlotMap<DefaultKey, Entity>;

#[derive(Default)]
pub struct EntityMap(BaseMap);

impl EntityMap {
    pub fn add(&mut self, args: &EntityArgs) -> EID {
        to_eid(self.0.insert_with_key(|x| Entity::new(to_eid(x), args)))
    }

    pub fn get(&self, eid: EID) -> Option<&Entity> { self.0.get(to_key(eid)) }

    pub fn get_mut(&mut self, eid: EID) -> Option<&mut Entity> { self.0.get_mut(to_key(eid)) }

    pub fn has(&self, eid: EID) -> bool { self.0.contains_key(to_key(eid)) }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn remove(&mut self, eid: EID) -> Option<Entity> { self.0.remove(to_key(eid)) }

    pub fn iter(&self) -> Iter<'_> { Iter(self.0.iter()) }
}

impl Index<EID> for EntityMap {
    type Output = Entity;
    fn index(&self, eid: EID) -> &Self::Output {
        self.get(eid).unwrap()
    }
}

impl IndexMut<EID> for EntityMap {
    fn index_mut(&mut self, eid: EID) -> &mut Self::Output {
        self.get_mut(eid).unwrap()
    }
}

impl<'a> IntoIterator for &'a EntityMap {
    type Item = (EID, &'a Entity);
    type IntoIter = Iter<'a>;
    fn into_iter(self) -> Self::IntoIter { self.iter() }
}

pub struct Iter<'a>(slotmap::hop::Iter<'a, DefaultKey, Entity>);

impl<'a> FusedIterator for Iter<'a> {}

impl<'a> Iterator for Iter<'a> {
    type Item = (EID, &'a Entity);
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, v)| (to_eid(k), v))
    }
}

//////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn args(x: i32, species: &str) -> EntityArgs {
        EntityArgs { pos: Point(x, 0), species: Species::get(species), player: false }
    }

    #[test]
    fn test_add_and_remove() {
        let mut map = EntityMap::default();
        let a = map.add(&args(1, "goblin"));
        let b = map.add(&args(2, "rat"));
        assert!(map.len() == 2);
        assert!(map[a].eid == a);
        assert!(map[b].travel.target == Point(2, 0));

        assert!(map.remove(a).is_some());
        assert!(!map.has(a));
        assert!(map.get(a).is_none());
        assert!(map.iter().map(|(eid, _)| eid).collect::<Vec<_>>() == vec![b]);
    }

    #[test]
    fn test_capabilities() {
        let mut map = EntityMap::default();
        let jelly = map.add(&args(0, "jelly"));
        map[jelly].attitude = Attitude::Friendly;
        let caps = Capabilities::of(&map[jelly]);
        assert!(caps.opens_doors);
        assert!(caps.friendly);
        assert!(caps.intel == Intelligence::Brainless);
    }
}
