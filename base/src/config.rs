use serde::Deserialize;

use crate::error::{Error, Result};

//////////////////////////////////////////////////////////////////////////////

// Tuning knobs for the movement-target policies. The defaults reproduce the
// classic behaviour; a TOML file may override any subset of them.

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub los_radius: i32,
    pub herd_comfort_range: i32,
    pub propagation_radius: i32,

    // One-in-N odds.
    pub unreachable_retry_chance: i32,
    pub cling_retry_chance: i32,
    pub wander_retarget_chance: i32,

    pub wander_offset: i32,
    pub wander_tries: i32,

    // Tracking range.
    pub brainless_range: i32,
    pub animal_range: i32,
    pub native_bonus: i32,
    pub tracking_multiplier: i32,
    pub friendly_tracking_range: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            los_radius: 7,
            herd_comfort_range: 6,
            propagation_radius: 2,

            unreachable_retry_chance: 12,
            cling_retry_chance: 4,
            wander_retarget_chance: 20,

            wander_offset: 6,
            wander_tries: 150,

            brainless_range: 3,
            animal_range: 5,
            native_bonus: 3,
            tracking_multiplier: 5,
            friendly_tracking_range: 1000,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("los_radius", self.los_radius),
            ("herd_comfort_range", self.herd_comfort_range),
            ("propagation_radius", self.propagation_radius),
            ("unreachable_retry_chance", self.unreachable_retry_chance),
            ("cling_retry_chance", self.cling_retry_chance),
            ("wander_retarget_chance", self.wander_retarget_chance),
            ("wander_offset", self.wander_offset),
            ("wander_tries", self.wander_tries),
            ("brainless_range", self.brainless_range),
            ("animal_range", self.animal_range),
            ("tracking_multiplier", self.tracking_multiplier),
            ("friendly_tracking_range", self.friendly_tracking_range),
        ];
        for (field, value) in positive {
            if value <= 0 {
                let reason = format!("must be positive, got {}", value);
                return Err(Error::InvalidConfig { field, reason });
            }
        }
        if self.native_bonus < 0 {
            let reason = format!("must not be negative, got {}", self.native_bonus);
            return Err(Error::InvalidConfig { field: "native_bonus", reason });
        }
        if self.wander_offset > 2 * self.los_radius {
            let reason = format!("{} exceeds twice the LOS radius", self.wander_offset);
            return Err(Error::InvalidConfig { field: "wander_offset", reason });
        }
        Ok(())
    }
}

//////////////////////////////////////////////////////////////////////////////
