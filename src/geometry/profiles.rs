use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use super::Direction;

pub const DEFAULT_OFFSET: [i32; 3] = [4, 0, 4];
pub const DEFAULT_SCAN_RADIUS: i32 = 10;
pub const DEFAULT_SCAN_Y_OFFSET: i32 = -1;
/// Key used in override files for the wildcard profile.
pub const WILDCARD_KEY: &str = "*";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CenterProfile {
    pub corners: u8,
    pub edges: u8,
}

impl Default for CenterProfile {
    fn default() -> Self {
        Self {
            corners: 2,
            edges: 1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VantageStrategy {
    #[default]
    Centered,
    TorchRow,
}

/// Signed offsets from the absolute center, one triple per direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VantageOffsets([[i32; 3]; 4]);

impl VantageOffsets {
    /// North/south move along z, east/west along x; y applies to all four.
    pub fn uniform([ox, oy, oz]: [i32; 3]) -> Self {
        let mut table = [[0; 3]; 4];
        table[Direction::North.index()] = [0, oy, -oz];
        table[Direction::East.index()] = [ox, oy, 0];
        table[Direction::South.index()] = [0, oy, oz];
        table[Direction::West.index()] = [-ox, oy, 0];
        Self(table)
    }

    pub fn with(mut self, direction: Direction, offset: [i32; 3]) -> Self {
        self.0[direction.index()] = offset;
        self
    }

    pub fn get(&self, direction: Direction) -> [i32; 3] {
        self.0[direction.index()]
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MapProfile {
    pub name: String,
    pub offsets: VantageOffsets,
    pub center: CenterProfile,
    pub scan_radius: i32,
    pub scan_y_offset: i32,
    pub strategy: VantageStrategy,
}

impl MapProfile {
    pub fn fallback() -> Self {
        Self {
            name: WILDCARD_KEY.to_string(),
            offsets: VantageOffsets::uniform(DEFAULT_OFFSET),
            center: CenterProfile::default(),
            scan_radius: DEFAULT_SCAN_RADIUS,
            scan_y_offset: DEFAULT_SCAN_Y_OFFSET,
            strategy: VantageStrategy::Centered,
        }
    }

    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::fallback()
        }
    }

    /// The pathfinder treats goals below a ledge differently; vantage points with
    /// a negative y offset are approached one block higher.
    pub fn raised_goal(&self, direction: Direction) -> bool {
        self.offsets.get(direction)[1] < 0
    }
}

/// Per-map profile table with a required wildcard entry.
#[derive(Clone, Debug)]
pub struct MapProfiles {
    fallback: MapProfile,
    maps: HashMap<String, MapProfile>,
}

impl MapProfiles {
    pub fn builtin() -> Self {
        let mut maps = HashMap::new();
        let mut add = |profile: MapProfile| {
            maps.insert(profile.name.clone(), profile);
        };

        for (name, offset) in [
            ("Revolve", [2, 0, 2]),
            ("Microscope", [3, 0, 3]),
            ("Launch_Zone", [3, 0, 3]),
            ("Fly_Trap", [5, 0, 5]),
            ("Nightlife", [3, 0, 3]),
            ("Drainage", [5, 0, 5]),
        ] {
            add(MapProfile {
                offsets: VantageOffsets::uniform(offset),
                ..MapProfile::named(name)
            });
        }

        let rest = VantageOffsets::uniform(DEFAULT_OFFSET);
        for (name, direction, offset) in [
            ("Time", Direction::North, [0, 0, -5]),
            ("Warp", Direction::South, [0, -1, 2]),
            ("Iris", Direction::South, [0, 0, 5]),
        ] {
            add(MapProfile {
                offsets: rest.with(direction, offset),
                ..MapProfile::named(name)
            });
        }

        for name in ["Warportal", "Bird_Cage"] {
            add(MapProfile {
                center: CenterProfile {
                    corners: 0,
                    edges: 0,
                },
                scan_radius: 5,
                ..MapProfile::named(name)
            });
        }

        add(MapProfile {
            scan_radius: 15,
            strategy: VantageStrategy::TorchRow,
            ..MapProfile::named("Castle")
        });

        Self {
            fallback: MapProfile::fallback(),
            maps,
        }
    }

    pub fn get(&self, map: &str) -> &MapProfile {
        self.maps.get(map).unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &MapProfile {
        &self.fallback
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Merges a JSON object of per-map overrides into the table. Returns how many
    /// entries were applied.
    pub fn load_overrides(&mut self, path: &Path) -> Result<usize> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading map profiles {}", path.display()))?;
        let overrides: BTreeMap<String, ProfileOverride> = serde_json::from_str(&raw)
            .with_context(|| format!("invalid map profiles {}", path.display()))?;

        let mut applied = 0;
        for (name, entry) in overrides {
            if name.trim().is_empty() {
                return Err(anyhow!("map profile with empty name in {}", path.display()));
            }
            if name == WILDCARD_KEY {
                let merged = entry.apply(self.fallback.clone(), DEFAULT_OFFSET);
                self.fallback = merged;
            } else {
                let base = self
                    .maps
                    .remove(&name)
                    .unwrap_or_else(|| MapProfile::named(&name));
                let merged = entry.apply(base, DEFAULT_OFFSET);
                self.maps.insert(name, merged);
            }
            applied += 1;
        }
        Ok(applied)
    }
}

impl Default for MapProfiles {
    fn default() -> Self {
        Self::builtin()
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum OffsetSpec {
    Uniform([i32; 3]),
    PerDirection(BTreeMap<Direction, [i32; 3]>),
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileOverride {
    #[serde(default)]
    offsets: Option<OffsetSpec>,
    #[serde(default)]
    center: Option<CenterProfile>,
    #[serde(default)]
    scan_radius: Option<i32>,
    #[serde(default)]
    scan_y_offset: Option<i32>,
    #[serde(default)]
    strategy: Option<VantageStrategy>,
}

impl ProfileOverride {
    fn apply(self, mut base: MapProfile, rest: [i32; 3]) -> MapProfile {
        match self.offsets {
            Some(OffsetSpec::Uniform(offset)) => base.offsets = VantageOffsets::uniform(offset),
            Some(OffsetSpec::PerDirection(table)) => {
                base.offsets = table
                    .into_iter()
                    .fold(VantageOffsets::uniform(rest), |offsets, (direction, offset)| {
                        offsets.with(direction, offset)
                    });
            }
            None => {}
        }
        if let Some(center) = self.center {
            base.center = center;
        }
        if let Some(radius) = self.scan_radius.filter(|radius| *radius > 0) {
            base.scan_radius = radius;
        }
        if let Some(offset) = self.scan_y_offset {
            base.scan_y_offset = offset;
        }
        if let Some(strategy) = self.strategy {
            base.strategy = strategy;
        }
        base
    }
}
