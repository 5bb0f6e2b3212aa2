use lazy_static::lazy_static;

use crate::base::{HashMap, HashSet, LOS, Matrix, Point};
use crate::entity::EID;
use crate::error::{Error, Result};

//////////////////////////////////////////////////////////////////////////////

// Constants

pub const LOS_RADIUS: i32 = 7;

//////////////////////////////////////////////////////////////////////////////

// Feature

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum Feature {
    Unseen,
    #[default]
    Wall,
    Statue,
    ClosedDoor,
    OpenDoor,
    Floor,
    ShallowWater,
    DeepWater,
    Lava,
    StairsDown,
    StairsUp,
}

impl Feature {
    // Solid features block movement for everyone, closed doors included.
    pub fn is_solid(&self) -> bool {
        matches!(self, Feature::Wall | Feature::Statue | Feature::ClosedDoor)
    }

    pub fn blocks_sight(&self) -> bool {
        matches!(self, Feature::Unseen | Feature::Wall | Feature::ClosedDoor)
    }

    pub fn is_closed_door(&self) -> bool { *self == Feature::ClosedDoor }

    pub fn is_stair(&self) -> bool {
        matches!(self, Feature::StairsDown | Feature::StairsUp)
    }

    pub fn is_water(&self) -> bool {
        matches!(self, Feature::ShallowWater | Feature::DeepWater)
    }

    // Terrain a land-bound walker can stand on, possibly wading.
    pub fn has_solid_floor(&self) -> bool {
        matches!(self, Feature::Floor | Feature::OpenDoor | Feature::ShallowWater |
                       Feature::StairsDown | Feature::StairsUp)
    }

    pub fn glyph(&self) -> char {
        match self {
            Feature::Unseen => ' ',
            Feature::Wall => '#',
            Feature::Statue => '8',
            Feature::ClosedDoor => '+',
            Feature::OpenDoor => '\'',
            Feature::Floor => '.',
            Feature::ShallowWater => '~',
            Feature::DeepWater => 'w',
            Feature::Lava => 'l',
            Feature::StairsDown => '>',
            Feature::StairsUp => '<',
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Traps

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TrapKind { Mechanical, Shaft, Alarm, Zot, Teleport }

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Trap {
    pub kind: TrapKind,
    pub known: bool,
}

impl Trap {
    pub fn glyph(&self) -> char {
        match self.kind {
            TrapKind::Mechanical => '^',
            TrapKind::Shaft => ':',
            TrapKind::Alarm => '*',
            TrapKind::Zot => '!',
            TrapKind::Teleport => '=',
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Map glyphs

#[derive(Clone, Copy, Debug)]
enum Cell {
    Terrain(Feature),
    Trap(TrapKind),
    Item,
}

lazy_static! {
    static ref CELLS: HashMap<char, Cell> = {
        let features = [
            Feature::Unseen, Feature::Wall, Feature::Statue, Feature::ClosedDoor,
            Feature::OpenDoor, Feature::Floor, Feature::ShallowWater,
            Feature::DeepWater, Feature::Lava, Feature::StairsDown, Feature::StairsUp,
        ];
        let traps = [
            TrapKind::Mechanical, TrapKind::Shaft, TrapKind::Alarm,
            TrapKind::Zot, TrapKind::Teleport,
        ];
        let mut result = HashMap::default();
        for feature in features {
            result.insert(feature.glyph(), Cell::Terrain(feature));
        }
        for kind in traps {
            result.insert(Trap { kind, known: true }.glyph(), Cell::Trap(kind));
        }
        result.insert('$', Cell::Item);
        result
    };
}

//////////////////////////////////////////////////////////////////////////////

// Level

#[derive(Clone)]
pub struct Level {
    pub features: Matrix<Feature>,
    pub known: Matrix<bool>,
    pub traps: HashMap<Point, Trap>,
    pub items: HashSet<Point>,
}

impl Level {
    pub fn new(size: Point, fill: Feature) -> Self {
        let mut features = Matrix::new(size, fill);
        features.default = Feature::Wall;
        Self {
            features,
            known: Matrix::new(size, true),
            traps: HashMap::default(),
            items: HashSet::default(),
        }
    }

    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, |_, _| false)
    }

    // Glyphs that are not terrain are offered to `claim`; claimed cells
    // become floor, unclaimed ones are a parse error.
    pub fn parse_with<F: FnMut(char, Point) -> bool>(text: &str, mut claim: F) -> Result<Self> {
        let rows: Vec<&str> = text.lines().filter(|x| !x.is_empty()).collect();
        let Some(first) = rows.first() else { return Err(Error::EmptyMap); };

        let expected = first.chars().count();
        for (row, line) in rows.iter().enumerate() {
            let width = line.chars().count();
            if width != expected { return Err(Error::RaggedMap { row, width, expected }); }
        }

        let size = Point(expected as i32, rows.len() as i32);
        let mut level = Level::new(size, Feature::Floor);

        for (y, line) in rows.iter().enumerate() {
            for (x, ch) in line.chars().enumerate() {
                let point = Point(x as i32, y as i32);
                match CELLS.get(&ch).copied() {
                    Some(Cell::Terrain(feature)) => level.features.set(point, feature),
                    Some(Cell::Trap(kind)) => level.add_trap(point, Trap { kind, known: true }),
                    Some(Cell::Item) => { level.items.insert(point); },
                    None => {
                        if !claim(ch, point) {
                            return Err(Error::UnknownGlyph { ch, x: point.0, y: point.1 });
                        }
                    }
                }
            }
        }
        Ok(level)
    }

    pub fn size(&self) -> Point { self.features.size }

    pub fn in_bounds(&self, p: Point) -> bool { self.features.contains(p) }

    pub fn feature_at(&self, p: Point) -> Feature { self.features.get(p) }

    pub fn set_feature(&mut self, p: Point, feature: Feature) {
        self.features.set(p, feature);
    }

    pub fn add_trap(&mut self, p: Point, trap: Trap) {
        self.traps.insert(p, trap);
    }

    pub fn trap_at(&self, p: Point) -> Option<Trap> { self.traps.get(&p).copied() }

    pub fn forget(&mut self, p: Point) { self.known.set(p, false); }

    pub fn is_known(&self, p: Point) -> bool { self.known.get(p) }

    pub fn glyph_at(&self, p: Point) -> char {
        if let Some(trap) = self.trap_at(p) { return trap.glyph(); }
        if self.items.contains(&p) { return '$'; }
        self.feature_at(p).glyph()
    }
}

//////////////////////////////////////////////////////////////////////////////

// WorldView: everything the pathfinder and the oracle may read.

pub trait WorldView {
    fn size(&self) -> Point;

    fn feature_at(&self, p: Point) -> Feature;

    fn actor_at(&self, p: Point) -> Option<EID>;

    // Whether the cell has ever been observed by the relevant viewer.
    fn is_observed(&self, p: Point) -> bool;

    fn trap_at(&self, _: Point) -> Option<Trap> { None }

    // Cells holding actors that never move (plants, statues come alive...).
    fn is_immobile_at(&self, _: Point) -> bool { false }

    fn has_item_at(&self, _: Point) -> bool { false }

    fn los_radius(&self) -> i32 { LOS_RADIUS }

    fn in_bounds(&self, p: Point) -> bool {
        let Point(sx, sy) = self.size();
        0 <= p.0 && p.0 < sx && 0 <= p.1 && p.1 < sy
    }
}

impl WorldView for Level {
    fn size(&self) -> Point { Level::size(self) }

    fn feature_at(&self, p: Point) -> Feature { Level::feature_at(self, p) }

    fn actor_at(&self, _: Point) -> Option<EID> { None }

    fn is_observed(&self, p: Point) -> bool { self.is_known(p) }

    fn trap_at(&self, p: Point) -> Option<Trap> { Level::trap_at(self, p) }

    fn has_item_at(&self, p: Point) -> bool { self.items.contains(&p) }
}

//////////////////////////////////////////////////////////////////////////////

// Ray casting

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opacity {
    // Only terrain that blocks sight.
    Solid,
    // Solid terrain (walls, statues, closed doors) and immobile actors.
    Immobile,
    // Sight-blocking terrain plus any actor at all.
    Movers,
}

pub fn is_opaque<V: WorldView + ?Sized>(view: &V, p: Point, opacity: Opacity) -> bool {
    if !view.in_bounds(p) { return true; }
    let feature = view.feature_at(p);
    match opacity {
        Opacity::Solid => feature.blocks_sight(),
        Opacity::Immobile => feature.is_solid() || view.is_immobile_at(p),
        Opacity::Movers => feature.blocks_sight() || view.actor_at(p).is_some(),
    }
}

// True if no cell strictly between the endpoints is opaque under `opacity`.
pub fn direct_visibility<V: WorldView + ?Sized>(
        view: &V, from: Point, to: Point, opacity: Opacity) -> bool {
    if !view.in_bounds(from) || !view.in_bounds(to) { return false; }
    let line = LOS(from, to);
    let interior = line.len().saturating_sub(1);
    line[..interior].iter().skip(1).all(|&p| !is_opaque(view, p, opacity))
}

// Sight within the LOS radius, as used for "can this actor see that cell".
pub fn see_cell<V: WorldView + ?Sized>(view: &V, from: Point, to: Point) -> bool {
    (to - from).len_l1() <= view.los_radius() && direct_visibility(view, from, to, Opacity::Solid)
}

//////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_terrain() {
        let level = Level::parse("
            #####
            #.+~#
            #w^l#
            #####
        ".replace(' ', "").as_str()).unwrap();
        assert!(level.size() == Point(5, 4));
        assert!(level.feature_at(Point(2, 1)) == Feature::ClosedDoor);
        assert!(level.feature_at(Point(3, 1)) == Feature::ShallowWater);
        assert!(level.feature_at(Point(1, 2)) == Feature::DeepWater);
        assert!(level.feature_at(Point(2, 2)) == Feature::Floor);
        assert!(level.trap_at(Point(2, 2)) == Some(Trap { kind: TrapKind::Mechanical, known: true }));
        assert!(level.feature_at(Point(-1, 0)) == Feature::Wall);
    }

    #[test]
    fn test_parse_unseen_row() {
        let level = Level::parse("###\n   \n#.#\n").unwrap();
        assert!(level.size() == Point(3, 3));
        assert!(level.feature_at(Point(1, 1)) == Feature::Unseen);
        assert!(level.feature_at(Point(1, 2)) == Feature::Floor);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Level::parse(""), Err(Error::EmptyMap)));
        assert!(matches!(Level::parse("###\n##\n"), Err(Error::RaggedMap { row: 1, .. })));
        assert!(matches!(Level::parse("#Q#\n"), Err(Error::UnknownGlyph { ch: 'Q', x: 1, y: 0 })));
    }

    #[test]
    fn test_direct_visibility() {
        let level = Level::parse("\
            .......\n\
            ...#...\n\
            .......\n").unwrap();
        assert!(!direct_visibility(&level, Point(0, 1), Point(6, 1), Opacity::Solid));
        assert!(direct_visibility(&level, Point(0, 0), Point(6, 0), Opacity::Solid));
        // The endpoints themselves never block.
        assert!(direct_visibility(&level, Point(3, 1), Point(6, 1), Opacity::Solid));
    }

    #[test]
    fn test_statue_blocks_movement_not_sight() {
        let level = Level::parse(".8.\n").unwrap();
        assert!(direct_visibility(&level, Point(0, 0), Point(2, 0), Opacity::Solid));
        assert!(!direct_visibility(&level, Point(0, 0), Point(2, 0), Opacity::Immobile));
    }
}
