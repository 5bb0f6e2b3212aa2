use lazy_static::lazy_static;

use crate::base::HashMap;

//////////////////////////////////////////////////////////////////////////////

// Habitat and intelligence

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Habitat { Land, Water, Lava, Amphibious, AmphibiousLava }

impl Habitat {
    pub fn lives_on_land(&self) -> bool {
        matches!(self, Habitat::Land | Habitat::Amphibious | Habitat::AmphibiousLava)
    }

    pub fn swims(&self) -> bool {
        matches!(self, Habitat::Water | Habitat::Amphibious)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Intelligence { Brainless, Animal, Human }

//////////////////////////////////////////////////////////////////////////////

// Species flags

const FLAG_FLIES: u32       = 1 << 0;
const FLAG_CLINGS: u32      = 1 << 1;
const FLAG_OPENS_DOORS: u32 = 1 << 2;
const FLAG_RANGED: u32      = 1 << 3;
const FLAG_LOS_ABILITY: u32 = 1 << 4;
const FLAG_STATIONARY: u32  = 1 << 5;
const FLAG_HERD: u32        = 1 << 6;
const FLAG_BATTY: u32       = 1 << 7;
const FLAG_EATS_ITEMS: u32  = 1 << 8;
const FLAG_AVATAR: u32      = 1 << 9;

//////////////////////////////////////////////////////////////////////////////

// Species

pub struct Species {
    pub name: &'static str,
    pub genus: &'static str,
    pub glyph: char,
    pub habitat: Habitat,
    pub intel: Intelligence,
    flags: u32,
}

impl Species {
    pub fn get(name: &str) -> &'static Species {
        SPECIES.get(name).unwrap_or_else(|| panic!("Unknown species: {}", name))
    }

    pub fn by_glyph(ch: char) -> Option<&'static Species> {
        GLYPHS.get(&ch).copied()
    }

    pub fn flies(&self) -> bool { self.flags & FLAG_FLIES != 0 }
    pub fn clings(&self) -> bool { self.flags & FLAG_CLINGS != 0 }
    pub fn opens_doors(&self) -> bool { self.flags & FLAG_OPENS_DOORS != 0 }
    pub fn ranged(&self) -> bool { self.flags & FLAG_RANGED != 0 }
    pub fn los_ability(&self) -> bool { self.flags & FLAG_LOS_ABILITY != 0 }
    pub fn stationary(&self) -> bool { self.flags & FLAG_STATIONARY != 0 }
    pub fn herd(&self) -> bool { self.flags & FLAG_HERD != 0 }
    pub fn batty(&self) -> bool { self.flags & FLAG_BATTY != 0 }
    pub fn eats_items(&self) -> bool { self.flags & FLAG_EATS_ITEMS != 0 }
    pub fn avatar(&self) -> bool { self.flags & FLAG_AVATAR != 0 }
}

impl std::fmt::Debug for Species {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl Eq for &'static Species {}

impl PartialEq for &'static Species {
    fn eq(&self, next: &&'static Species) -> bool {
        *self as *const Species == *next as *const Species
    }
}

lazy_static! {
    static ref SPECIES: HashMap<&'static str, Species> = {
        use Habitat::*;
        use Intelligence::*;
        let items = vec![
            ("human",          "human",      '@', Land,           Human,     FLAG_OPENS_DOORS),
            ("goblin",         "goblin",     'g', Land,           Human,     FLAG_OPENS_DOORS),
            ("orc archer",     "orc",        'o', Land,           Human,     FLAG_OPENS_DOORS | FLAG_RANGED),
            ("centaur",        "centaur",    'c', Land,           Human,     FLAG_RANGED),
            ("rat",            "rat",        'r', Land,           Animal,    0),
            ("jackal",         "jackal",     'j', Land,           Animal,    FLAG_HERD),
            ("bat",            "bat",        'b', Land,           Animal,    FLAG_FLIES | FLAG_BATTY),
            ("spider",         "spider",     's', Land,           Animal,    FLAG_CLINGS),
            ("electric eel",   "eel",        'e', Water,          Animal,    0),
            ("merfolk",        "merfolk",    'm', Amphibious,     Human,     FLAG_OPENS_DOORS),
            ("merfolk avatar", "merfolk",    'M', Amphibious,     Human,     FLAG_AVATAR),
            ("salamander",     "salamander", 'S', AmphibiousLava, Human,     FLAG_OPENS_DOORS),
            ("fire vortex",    "vortex",     'v', Lava,           Brainless, 0),
            ("zombie",         "zombie",     'z', Land,           Brainless, 0),
            ("jelly",          "jelly",      'J', Land,           Brainless, FLAG_EATS_ITEMS),
            ("shining eye",    "eye",        'E', Land,           Brainless, FLAG_FLIES | FLAG_LOS_ABILITY),
            ("oklob plant",    "plant",      'P', Land,           Brainless, FLAG_STATIONARY | FLAG_RANGED),
        ];
        let mut result = HashMap::default();
        for (name, genus, glyph, habitat, intel, flags) in items {
            result.insert(name, Species { name, genus, glyph, habitat, intel, flags });
        }
        result
    };

    static ref GLYPHS: HashMap<char, &'static Species> = {
        SPECIES.values().map(|x| (x.glyph, x)).collect()
    };
}

//////////////////////////////////////////////////////////////////////////////
