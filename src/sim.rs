//! Deterministic in-memory stand-in for the game client, its pathfinder and its
//! scoreboard. Used by the test suite and the `simulate` command.
//!
//! Call order per tick mirrors the real client: the autopilot handles the tick
//! event, then [`SimHost::step`] applies pathing and key physics.

use std::collections::HashMap;

use crate::geometry::{Block, BlockPos, Look, Vec3};
use crate::host::{GameStateFeed, MapInfo, Pathfinder, PathfinderSettings, PlayerControl, World};
use crate::navigation::MIN_MOVEMENT_PER_TICK;
use crate::scoreboard;
use crate::status::StatusLine;
use crate::trace::{KeySet, MovementKey};

const MAX_FALL: i32 = 4;
const DROPPER_TITLE: &str = "§e§lDROPPER";
const LOBBY_TITLE: &str = "§b§lLOBBY";
/// Listed as already completed whenever the active map is not the first.
const CLEARED_MAP: &str = "Cleared Map";

#[derive(Clone, Debug)]
pub struct SimHost {
    blocks: HashMap<BlockPos, Block>,
    position: Vec3,
    look: Look,
    keys: KeySet,
    main_hand: Option<String>,
    look_locked: bool,
    goal: Option<BlockPos>,
    goals_set: Vec<BlockPos>,
    path_speed: f64,
    arrival_offset: (f64, f64),
    reachable: bool,
    sidebar_title: String,
    sidebar: Vec<String>,
    chunks_ready_at: u64,
    tick: u64,
    chat_sent: Vec<String>,
    status: Vec<StatusLine>,
    pathfinder_settings: Option<PathfinderSettings>,
    key_presses: u64,
}

impl SimHost {
    pub fn new(position: Vec3) -> Self {
        Self {
            blocks: HashMap::new(),
            position,
            look: Look::new(0.0, 0.0),
            keys: KeySet::EMPTY,
            main_hand: None,
            look_locked: false,
            goal: None,
            goals_set: Vec::new(),
            path_speed: 1.0,
            arrival_offset: (0.5, 0.5),
            reachable: true,
            sidebar_title: DROPPER_TITLE.to_string(),
            sidebar: Vec::new(),
            chunks_ready_at: 0,
            tick: 0,
            chat_sent: Vec::new(),
            status: Vec::new(),
            pathfinder_settings: None,
            key_presses: 0,
        }
    }

    /// Solid square floor of `radius` around `center`, at `center.y`.
    pub fn with_floor(mut self, center: BlockPos, radius: i32) -> Self {
        for x in center.x - radius..=center.x + radius {
            for z in center.z - radius..=center.z + radius {
                self.blocks.insert(BlockPos::new(x, center.y, z), Block::Solid);
            }
        }
        self
    }

    /// Opens a 3x3 drop hole in the floor layer around `center`.
    pub fn with_hole(mut self, center: BlockPos) -> Self {
        for dx in -1..=1 {
            for dz in -1..=1 {
                self.blocks.insert(center.offset(dx, 0, dz), Block::Air);
            }
        }
        self
    }

    /// Floor at `rim.y - 1` with a drop hole centered under `rim`, the way
    /// [`crate::geometry::resolve_center`] reports it.
    pub fn drop_arena(rim: BlockPos, player: Vec3) -> Self {
        let floor = rim.offset(0, -1, 0);
        Self::new(player).with_floor(floor, 24).with_hole(floor)
    }

    pub fn set_block(&mut self, pos: BlockPos, block: Block) {
        self.blocks.insert(pos, block);
    }

    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_main_hand(&mut self, item: Option<&str>) {
        self.main_hand = item.map(str::to_string);
    }

    /// Renders a sidebar the way the server lists maps: finished maps ticked,
    /// the active one marked, upcoming ones after it.
    pub fn set_map(&mut self, active: Option<&str>, next: Option<&str>, is_first_map: bool) {
        let mut lines = vec!["§e§lMaps".to_string()];
        if let Some(active) = active {
            if !is_first_map {
                lines.push(format!("§a✔ §f{CLEARED_MAP}"));
            }
            lines.push(format!("§e» §f{} §e◀", display_name(active)));
            if let Some(next) = next {
                lines.push(format!("§7» §f{}", display_name(next)));
            }
        }
        self.sidebar = lines;
    }

    pub fn set_sidebar<S>(&mut self, title: &str, lines: impl IntoIterator<Item = S>)
    where
        S: Into<String>,
    {
        self.sidebar_title = title.to_string();
        self.sidebar = lines.into_iter().map(Into::into).collect();
    }

    pub fn set_target_game(&mut self, active: bool) {
        let title = if active { DROPPER_TITLE } else { LOBBY_TITLE };
        self.sidebar_title = title.to_string();
    }

    pub fn set_arrival_offset(&mut self, x: f64, z: f64) {
        self.arrival_offset = (x, z);
    }

    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Chunks report unloaded until `ticks` more steps have passed.
    pub fn delay_chunks(&mut self, ticks: u64) {
        self.chunks_ready_at = self.tick + ticks;
    }

    pub fn goal(&self) -> Option<BlockPos> {
        self.goal
    }

    pub fn goals_set(&self) -> &[BlockPos] {
        &self.goals_set
    }

    pub fn chat_sent(&self) -> &[String] {
        &self.chat_sent
    }

    pub fn status_lines(&self) -> &[StatusLine] {
        &self.status
    }

    pub fn has_status(&self, needle: &str) -> bool {
        self.status.iter().any(|line| line.text.contains(needle))
    }

    pub fn look_input_locked(&self) -> bool {
        self.look_locked
    }

    pub fn pathfinder_settings(&self) -> Option<PathfinderSettings> {
        self.pathfinder_settings
    }

    pub fn key_presses(&self) -> u64 {
        self.key_presses
    }

    /// Advances the world by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
        match self.goal {
            Some(goal) if self.reachable => self.walk_toward(goal),
            Some(_) => {}
            None => self.apply_keys(),
        }
    }

    fn walk_toward(&mut self, goal: BlockPos) {
        let target_x = goal.x as f64 + self.arrival_offset.0;
        let target_z = goal.z as f64 + self.arrival_offset.1;
        let dx = target_x - self.position.x;
        let dz = target_z - self.position.z;
        let distance = (dx * dx + dz * dz).sqrt();
        if distance <= self.path_speed {
            self.position.x = target_x;
            self.position.z = target_z;
        } else {
            self.position.x += dx / distance * self.path_speed;
            self.position.z += dz / distance * self.path_speed;
        }
        self.position.y = goal.y as f64;
        self.settle_onto_floor();
    }

    fn apply_keys(&mut self) {
        let mut stride = 0.0;
        if self.keys.contains(MovementKey::Forward) {
            stride += MIN_MOVEMENT_PER_TICK;
        }
        if self.keys.contains(MovementKey::Back) {
            stride -= MIN_MOVEMENT_PER_TICK;
        }
        if stride == 0.0 {
            return;
        }
        let yaw = (self.look.yaw as f64).to_radians();
        self.position.x += -yaw.sin() * stride;
        self.position.z += yaw.cos() * stride;
    }

    /// Only solid blocks hold the player up; torches and portals do not.
    fn settle_onto_floor(&mut self) {
        let mut feet = self.position.floor();
        for _ in 0..MAX_FALL {
            if self.block_at(feet.offset(0, -1, 0)) == Block::Solid {
                break;
            }
            feet = feet.offset(0, -1, 0);
        }
        self.position.y = feet.y as f64;
    }
}

impl World for SimHost {
    fn block_at(&self, pos: BlockPos) -> Block {
        self.blocks.get(&pos).copied().unwrap_or(Block::Air)
    }

    fn is_chunk_loaded(&self, _pos: BlockPos) -> bool {
        self.tick >= self.chunks_ready_at
    }
}

impl PlayerControl for SimHost {
    fn position(&self) -> Vec3 {
        self.position
    }

    fn look(&self) -> Look {
        self.look
    }

    fn set_look(&mut self, look: Look) {
        self.look = look;
    }

    fn held_keys(&self) -> KeySet {
        self.keys
    }

    fn set_key(&mut self, key: MovementKey, pressed: bool) {
        if pressed {
            if !self.keys.contains(key) {
                self.key_presses += 1;
            }
            self.keys.insert(key);
        } else {
            self.keys.remove(key);
        }
    }

    fn main_hand_item(&self) -> Option<String> {
        self.main_hand.clone()
    }

    fn set_look_input_locked(&mut self, locked: bool) {
        self.look_locked = locked;
    }

    fn send_chat(&mut self, message: &str) {
        self.chat_sent.push(message.to_string());
    }

    fn show_status(&mut self, line: &StatusLine) {
        self.status.push(line.clone());
    }
}

impl Pathfinder for SimHost {
    fn set_goal(&mut self, goal: BlockPos) {
        self.goal = Some(goal);
        self.goals_set.push(goal);
    }

    fn clear_goal(&mut self) {
        self.goal = None;
    }

    fn is_in_goal(&self, pos: BlockPos) -> bool {
        self.goal == Some(pos)
    }

    fn apply_settings(&mut self, settings: &PathfinderSettings) {
        self.pathfinder_settings = Some(*settings);
    }
}

impl GameStateFeed for SimHost {
    fn map_info(&self) -> MapInfo {
        scoreboard::parse_map_info(&self.sidebar)
    }

    fn is_target_game(&self) -> bool {
        scoreboard::is_target_title(&self.sidebar_title)
    }
}

fn display_name(map: &str) -> String {
    map.replace('_', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_feed_reads_back_through_the_sidebar() {
        let mut sim = SimHost::new(Vec3::new(0.5, 64.0, 0.5));
        sim.set_map(Some("Launch_Zone"), Some("Fly_Trap"), true);
        let info = sim.map_info();
        assert_eq!(info.active.as_deref(), Some("Launch_Zone"));
        assert_eq!(info.next.as_deref(), Some("Fly_Trap"));
        assert!(info.is_first_map);

        sim.set_map(Some("Castle"), None, false);
        let info = sim.map_info();
        assert_eq!(info.active.as_deref(), Some("Castle"));
        assert_eq!(info.next, None);
        assert!(!info.is_first_map);

        sim.set_map(None, None, false);
        assert_eq!(sim.map_info().active, None);

        assert!(sim.is_target_game());
        sim.set_sidebar("§b§lBEDWARS", ["Map: Lighthouse"]);
        assert!(!sim.is_target_game());
        assert_eq!(sim.map_info().active.as_deref(), Some("Lighthouse"));
    }

    #[test]
    fn forward_pulse_moves_along_facing() {
        let mut sim = SimHost::new(Vec3::new(0.5, 64.0, 0.5));
        sim.set_look(Look::new(-90.0, 0.0));
        sim.set_key(MovementKey::Forward, true);
        sim.step();
        assert!((sim.position().x - (0.5 + MIN_MOVEMENT_PER_TICK)).abs() < 1e-9);
        assert!((sim.position().z - 0.5).abs() < 1e-9);
    }

    #[test]
    fn pathing_walks_to_goal_and_lands_on_floor() {
        let mut sim =
            SimHost::new(Vec3::new(0.5, 64.0, 0.5)).with_floor(BlockPos::new(0, 63, 0), 8);
        sim.set_arrival_offset(0.8, 0.5);
        sim.set_goal(BlockPos::new(3, 64, 0));
        for _ in 0..5 {
            sim.step();
        }
        assert_eq!(sim.position().floor(), BlockPos::new(3, 64, 0));
        assert!((sim.position().x - 3.8).abs() < 1e-9);
        assert!(sim.is_in_goal(BlockPos::new(3, 64, 0)));
    }
}
