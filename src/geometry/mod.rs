//! Drop-hole geometry: locating a map's absolute center and the vantage points
//! around it.
//!
//! Map placement differs between sessions, so nothing here is cached. Every query
//! rescans the world around the player and recomputes the points from the active
//! map's profile.

pub mod profiles;


use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::host::World;

pub use profiles::{CenterProfile, MapProfile, MapProfiles, VantageOffsets, VantageStrategy};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Feet position of a player standing in the middle of this block.
    pub fn center(self) -> Vec3 {
        Vec3::new(self.x as f64 + 0.5, self.y as f64, self.z as f64 + 0.5)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn floor(self) -> BlockPos {
        BlockPos::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    pub fn distance_to(self, pos: BlockPos) -> f64 {
        let dx = pos.x as f64 - self.x;
        let dy = pos.y as f64 - self.y;
        let dz = pos.z as f64 - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Look {
    pub yaw: f32,
    pub pitch: f32,
}

impl Look {
    pub const fn new(yaw: f32, pitch: f32) -> Self {
        Self { yaw, pitch }
    }
}

/// Compass side of the drop hole. Declaration order is the canonical iteration
/// order and breaks distance ties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::East => "east",
            Self::South => "south",
            Self::West => "west",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::North => 0,
            Self::East => 1,
            Self::South => 2,
            Self::West => 3,
        }
    }

    /// Fixed orientation a macro recorded from this vantage point starts with.
    /// Every vantage point looks across the hole, so this never depends on the map.
    pub fn vantage_look(self) -> Look {
        match self {
            Self::North => Look::new(0.0, 0.0),
            Self::East => Look::new(90.0, 0.0),
            Self::South => Look::new(-180.0, 0.0),
            Self::West => Look::new(-90.0, 0.0),
        }
    }

    /// Orientation that walks the player toward this compass direction.
    pub fn facing_look(self) -> Look {
        match self {
            Self::South => Look::new(0.0, 0.0),
            Self::West => Look::new(90.0, 0.0),
            Self::North => Look::new(-180.0, 0.0),
            Self::East => Look::new(-90.0, 0.0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "north" => Ok(Self::North),
            "east" => Ok(Self::East),
            "south" => Ok(Self::South),
            "west" => Ok(Self::West),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Block {
    Air,
    Solid,
    Torch,
    Portal,
}

pub type VantagePoints = BTreeMap<Direction, BlockPos>;

const CORNER_OFFSETS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];
const EDGE_OFFSETS: [(i32, i32); 4] = [(1, 0), (0, 1), (-1, 0), (0, -1)];

/// Locates the drop hole's center cell near the player.
///
/// Scans `profile.scan_y_offset` blocks below the feet first, then one lower, then
/// one higher (the player may be on a slab or mid-jump). Within a level the last
/// matching cell in scan order (x outer, z inner) wins. The returned position is
/// one block above the scanned cell, level with a player standing at the rim.
pub fn resolve_center<W: World + ?Sized>(
    world: &W,
    player: Vec3,
    profile: &MapProfile,
) -> Option<BlockPos> {
    let origin = player.floor();
    let base = profile.scan_y_offset;
    [base, base - 1, base + 1].into_iter().find_map(|dy| {
        scan_level(world, origin.offset(0, dy, 0), profile).map(|cell| cell.offset(0, 1, 0))
    })
}

fn scan_level<W: World + ?Sized>(
    world: &W,
    plane: BlockPos,
    profile: &MapProfile,
) -> Option<BlockPos> {
    let radius = profile.scan_radius;
    let mut candidate = None;
    for x in plane.x - radius..=plane.x + radius {
        for z in plane.z - radius..=plane.z + radius {
            let cell = BlockPos::new(x, plane.y, z);
            if world.block_at(cell) == Block::Air && is_hole_center(world, cell, profile.center) {
                candidate = Some(cell);
            }
        }
    }
    candidate
}

fn is_hole_center<W: World + ?Sized>(world: &W, cell: BlockPos, required: CenterProfile) -> bool {
    let ring_matches = |offsets: &[(i32, i32); 4], count: u8| {
        offsets
            .iter()
            .all(|&(dx, dz)| non_air_neighbours(world, cell.offset(dx, 0, dz)) == count)
    };
    ring_matches(&CORNER_OFFSETS, required.corners) && ring_matches(&EDGE_OFFSETS, required.edges)
}

fn non_air_neighbours<W: World + ?Sized>(world: &W, cell: BlockPos) -> u8 {
    EDGE_OFFSETS
        .iter()
        .filter(|&&(dx, dz)| world.block_at(cell.offset(dx, 0, dz)) != Block::Air)
        .count() as u8
}

pub fn resolve_vantage_points<W: World + ?Sized>(
    world: &W,
    player: Vec3,
    profile: &MapProfile,
) -> Option<VantagePoints> {
    match profile.strategy {
        VantageStrategy::Centered => {
            let center = resolve_center(world, player, profile)?;
            Some(points_around(center, &profile.offsets))
        }
        VantageStrategy::TorchRow => torch_row_points(world, player, profile),
    }
}

pub fn points_around(center: BlockPos, offsets: &VantageOffsets) -> VantagePoints {
    Direction::ALL
        .into_iter()
        .map(|direction| {
            let [dx, dy, dz] = offsets.get(direction);
            (direction, center.offset(dx, dy, dz))
        })
        .collect()
}

/// Irregular maps mark their take-off ledges with a row of torches instead of a
/// symmetric hole. The ledges sit two blocks in front of the easternmost torch
/// column, one near the player and one far from them.
fn torch_row_points<W: World + ?Sized>(
    world: &W,
    player: Vec3,
    profile: &MapProfile,
) -> Option<VantagePoints> {
    let origin = player.floor();
    let torches = [0, 1, -1, -2].into_iter().find_map(|dy| {
        let found = collect_blocks(
            world,
            origin.offset(0, dy, 0),
            profile.scan_radius,
            Block::Torch,
        );
        (!found.is_empty()).then_some(found)
    })?;

    let column_x = torches.iter().map(|pos| pos.x).max()?;
    let row_y = torches[0].y;
    let mut rows: Vec<i32> = torches.iter().map(|pos| pos.z).collect();
    rows.sort_unstable();
    rows.dedup();
    let southmost = *rows.last()?;

    let distance = |z: &i32| (player.z - *z as f64).abs();
    let near = rows.iter().copied().min_by(|a, b| distance(a).total_cmp(&distance(b)))?;
    let far = rows.iter().copied().max_by(|a, b| distance(a).total_cmp(&distance(b)))?;

    let mut points = VantagePoints::new();
    for z in [near, far] {
        let direction = if z == southmost {
            Direction::South
        } else {
            Direction::North
        };
        points.insert(direction, BlockPos::new(column_x - 2, row_y, z));
    }
    Some(points)
}

fn collect_blocks<W: World + ?Sized>(
    world: &W,
    plane: BlockPos,
    radius: i32,
    wanted: Block,
) -> Vec<BlockPos> {
    let mut found = Vec::new();
    for x in plane.x - radius..=plane.x + radius {
        for z in plane.z - radius..=plane.z + radius {
            let pos = BlockPos::new(x, plane.y, z);
            if world.block_at(pos) == wanted {
                found.push(pos);
            }
        }
    }
    found
}

/// Direction whose vantage coordinate equals the player's floored position.
pub fn vantage_point_of(points: &VantagePoints, player: Vec3) -> Option<Direction> {
    let floored = player.floor();
    points
        .iter()
        .find(|(_, pos)| **pos == floored)
        .map(|(direction, _)| *direction)
}

/// Closest accepted vantage point by straight-line distance. Ties go to the
/// earlier direction in canonical order.
pub fn nearest(
    points: &VantagePoints,
    player: Vec3,
    mut accept: impl FnMut(Direction) -> bool,
) -> Option<(Direction, BlockPos)> {
    points
        .iter()
        .filter(|(direction, _)| accept(**direction))
        .min_by(|a, b| player.distance_to(*a.1).total_cmp(&player.distance_to(*b.1)))
        .map(|(direction, pos)| (*direction, *pos))
}
