//! Seams to the game client and its companions. The autopilot never talks to the
//! game directly; everything it observes or injects goes through these traits.

use serde::{Deserialize, Serialize};

use crate::geometry::{Block, BlockPos, Look, Vec3};
use crate::status::StatusLine;
use crate::trace::{KeySet, MovementKey};

/// Per-tick block queries.
pub trait World {
    fn block_at(&self, pos: BlockPos) -> Block;

    fn is_chunk_loaded(&self, _pos: BlockPos) -> bool {
        true
    }
}

pub trait PlayerControl {
    fn position(&self) -> Vec3;
    fn look(&self) -> Look;
    fn set_look(&mut self, look: Look);
    fn held_keys(&self) -> KeySet;
    fn set_key(&mut self, key: MovementKey, pressed: bool);
    /// Item id in the main hand, e.g. `minecraft:redstone`.
    fn main_hand_item(&self) -> Option<String>;
    /// Locks out mouse look while a macro owns the camera.
    fn set_look_input_locked(&mut self, _locked: bool) {}
    /// Sends a chat line or slash command to the server.
    fn send_chat(&mut self, message: &str);
    fn show_status(&mut self, line: &StatusLine);

    fn release_all_keys(&mut self) {
        for key in MovementKey::ALL {
            self.set_key(key, false);
        }
    }
}

/// Goal-directed pathfinding collaborator.
pub trait Pathfinder {
    fn set_goal(&mut self, goal: BlockPos);
    fn clear_goal(&mut self);
    fn is_in_goal(&self, pos: BlockPos) -> bool;
    fn apply_settings(&mut self, settings: &PathfinderSettings);
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapInfo {
    pub active: Option<String>,
    pub others: Vec<String>,
    pub next: Option<String>,
    pub is_first_map: bool,
}

pub trait GameStateFeed {
    fn map_info(&self) -> MapInfo;
    fn is_target_game(&self) -> bool;
}

/// Everything the orchestrator needs from the client in one bound.
pub trait Host: World + PlayerControl + Pathfinder + GameStateFeed {}

impl<T: World + PlayerControl + Pathfinder + GameStateFeed> Host for T {}

/// One-shot pathfinder behaviour the automation depends on: no block breaking,
/// sprinting allowed, hazard avoidance on, command echo off.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathfinderSettings {
    pub allow_break: bool,
    pub allow_sprint: bool,
    pub avoidance: bool,
    pub echo_commands: bool,
}

impl PathfinderSettings {
    pub const AUTOPILOT: PathfinderSettings = PathfinderSettings {
        allow_break: false,
        allow_sprint: true,
        avoidance: true,
        echo_commands: false,
    };
}

/// True when any horizontal neighbour of the player's block is a portal.
pub fn near_portal<W: World + ?Sized>(world: &W, player: Vec3) -> bool {
    let pos = player.floor();
    [(1, 0), (-1, 0), (0, 1), (0, -1)]
        .into_iter()
        .any(|(dx, dz)| world.block_at(pos.offset(dx, 0, dz)) == Block::Portal)
}

/// Chunk-load probe over the player's block and the corners of a square around it.
pub fn area_loaded<W: World + ?Sized>(world: &W, player: Vec3, radius: i32) -> bool {
    let pos = player.floor();
    [(0, 0), (radius, radius), (radius, -radius), (-radius, radius), (-radius, -radius)]
        .into_iter()
        .all(|(dx, dz)| world.is_chunk_loaded(pos.offset(dx, 0, dz)))
}
