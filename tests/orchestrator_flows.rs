use anyhow::Result;
use droppy_autopilot::config::{RuntimeConfig, Setting, SettingsFile};
use droppy_autopilot::geometry::{Block, BlockPos, Direction, Look, MapProfiles, Vec3};
use droppy_autopilot::host::{PathfinderSettings, PlayerControl};
use droppy_autopilot::orchestrator::{Command, Event, JumpOrchestrator};
use droppy_autopilot::sim::SimHost;
use droppy_autopilot::trace::{Frame, InputTrace, KeySet, MovementKey};
use tempfile::TempDir;

const RIM: BlockPos = BlockPos::new(0, 64, 0);
/// Block center of Drainage's north vantage point around `RIM`.
const DRAINAGE_NORTH: Vec3 = Vec3::new(0.5, 64.0, -4.5);
/// Block center of Revolve's north vantage point around `RIM`.
const REVOLVE_NORTH: Vec3 = Vec3::new(0.5, 64.0, -1.5);

struct Rig {
    home: TempDir,
    host: SimHost,
    pilot: JumpOrchestrator,
}

impl Rig {
    fn new(map: &str, player: Vec3) -> Result<Self> {
        Self::with_config(map, player, |_| {})
    }

    fn with_config(
        map: &str,
        player: Vec3,
        tweak: impl FnOnce(&mut RuntimeConfig),
    ) -> Result<Self> {
        let home = tempfile::tempdir()?;
        let mut config = RuntimeConfig::with_home(home.path());
        tweak(&mut config);
        let mut host = SimHost::drop_arena(RIM, player);
        host.set_map(Some(map), None, false);
        let pilot = JumpOrchestrator::new(config, MapProfiles::builtin());
        Ok(Self { home, host, pilot })
    }

    fn save(&self, map: &str, direction: Direction, trace: &InputTrace) -> Result<()> {
        self.pilot.store().save(map, direction, trace)?;
        Ok(())
    }

    fn tick(&mut self) {
        self.pilot.handle(&mut self.host, Event::Tick);
        self.host.step();
    }

    fn ticks(&mut self, count: u64) {
        for _ in 0..count {
            self.tick();
        }
    }

    /// Ticks until `done` holds, returning how many ticks that took.
    fn tick_until(&mut self, limit: u64, done: impl Fn(&Self) -> bool) -> Option<u64> {
        for elapsed in 1..=limit {
            self.tick();
            if done(self) {
                return Some(elapsed);
            }
        }
        None
    }

    fn send(&mut self, event: Event) {
        self.pilot.handle(&mut self.host, event);
    }

    fn chat(&mut self, line: &str) {
        self.send(Event::Chat(line.to_string()));
    }

    fn command(&mut self, command: Command) {
        self.send(Event::Command(command));
    }

    fn running(&self) -> bool {
        self.pilot.engine().is_running()
    }
}

/// Frames that never move the simulated player, each with a distinct look.
fn stationary_trace(len: usize) -> InputTrace {
    let frames = (0..len)
        .map(|index| {
            let key = if index % 2 == 0 {
                MovementKey::Jump
            } else {
                MovementKey::Sprint
            };
            Frame::new([key].into_iter().collect(), Look::new(index as f32 * 10.0, 5.0))
        })
        .collect();
    InputTrace::from_frames(frames)
}

#[test]
fn drop_cue_runs_the_macro_in_place() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    let trace = stationary_trace(4);
    rig.save("Drainage", Direction::North, &trace)?;

    rig.tick();
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Drainage"));

    rig.chat("§c§lDROP!");
    assert!(rig.running());
    assert!(rig.host.goals_set().is_empty());
    assert!(rig.host.look_input_locked());

    for frame in trace.frames() {
        rig.tick();
        assert_eq!(rig.host.held_keys(), frame.keys);
        assert_eq!(rig.host.look(), frame.look);
    }
    rig.tick();
    assert!(!rig.running());
    assert!(rig.host.held_keys().is_empty());
    assert!(!rig.host.look_input_locked());
    Ok(())
}

#[test]
fn run_without_trace_paths_to_nearest_saved_vantage_point() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    // East is ~6.4 blocks away, south ~9.5.
    rig.save("Drainage", Direction::East, &stationary_trace(6))?;
    rig.save("Drainage", Direction::South, &stationary_trace(6))?;
    rig.tick();

    rig.command(Command::Run {
        map: None,
        direction: None,
    });
    assert!(!rig.running());
    assert_eq!(rig.host.goals_set(), &[BlockPos::new(5, 64, 0)]);
    assert!(rig.host.has_status("Pathing to closest vantage point"));

    let elapsed = rig.tick_until(40, Rig::running);
    assert!(elapsed.is_some(), "macro never started");
    assert_eq!(rig.host.position().floor(), BlockPos::new(5, 64, 0));
    assert!(rig.host.goal().is_none());
    Ok(())
}

#[test]
fn drop_cue_walks_to_a_saved_vantage_point_first() -> Result<()> {
    let mut rig = Rig::new("Drainage", Vec3::new(-8.5, 64.0, 3.5))?;
    rig.save("Drainage", Direction::West, &stationary_trace(6))?;
    rig.tick();

    rig.chat("DROP!");
    assert_eq!(rig.host.goals_set(), &[BlockPos::new(-5, 64, 0)]);
    assert!(rig.tick_until(60, Rig::running).is_some());
    assert_eq!(rig.host.position().floor(), BlockPos::new(-5, 64, 0));
    Ok(())
}

#[test]
fn missing_trace_without_fallback_reports_failure() -> Result<()> {
    let mut rig = Rig::with_config("Drainage", DRAINAGE_NORTH, |config| {
        config.fallback_to_nearest = false;
    })?;
    rig.save("Drainage", Direction::East, &stationary_trace(3))?;
    rig.tick();

    rig.command(Command::Run {
        map: None,
        direction: None,
    });
    assert!(!rig.running());
    assert!(rig.host.goals_set().is_empty());
    assert!(rig.host.has_status("no saved macro for Drainage/north"));
    Ok(())
}

#[test]
fn stop_and_manual_reset_release_every_key() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(10))?;
    rig.tick();

    rig.chat("DROP!");
    rig.ticks(3);
    rig.command(Command::JumpStop);
    rig.tick();
    assert!(!rig.running());
    assert!(rig.host.held_keys().is_empty());

    rig.chat("DROP!");
    rig.ticks(2);
    assert!(!rig.host.held_keys().is_empty());

    // The use key only counts as a reset with the reset item in hand.
    rig.send(Event::Key {
        name: "key.mouse.right".to_string(),
        pressed: true,
    });
    assert!(rig.running());

    rig.host.set_main_hand(Some("minecraft:redstone"));
    rig.send(Event::Key {
        name: "key.mouse.right".to_string(),
        pressed: true,
    });
    assert!(!rig.running());
    assert!(rig.host.held_keys().is_empty());
    assert!(rig.pilot.session().just_reset);

    // The reset's own resync is not a failed drop.
    rig.send(Event::PositionSync);
    assert!(!rig.pilot.session().just_reset);
    assert_eq!(rig.pilot.pending_tasks(), 0);
    Ok(())
}

#[test]
fn resyncs_inside_the_debounce_window_count_once() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(12))?;
    rig.tick();

    rig.send(Event::PositionSync);
    assert_eq!(rig.pilot.pending_tasks(), 1);
    rig.send(Event::PositionSync);
    assert_eq!(rig.pilot.pending_tasks(), 1);

    // The re-jump fires after the settle delay.
    rig.ticks(2);
    assert!(!rig.running());
    rig.ticks(2);
    assert!(rig.running());
    assert_eq!(rig.pilot.pending_tasks(), 0);

    // Five ticks after the first resync: evaluated on its own and treated as
    // another failed drop.
    rig.tick();
    rig.send(Event::PositionSync);
    assert!(!rig.running());
    assert!(rig.host.held_keys().is_empty());
    assert_eq!(rig.pilot.pending_tasks(), 1);
    Ok(())
}

#[test]
fn resync_without_known_map_or_auto_jump_is_ignored() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(3))?;
    rig.host.set_target_game(false);
    rig.tick();
    assert_eq!(rig.pilot.session().current_map, None);
    rig.send(Event::PositionSync);
    assert_eq!(rig.pilot.pending_tasks(), 0);

    rig.host.set_target_game(true);
    rig.ticks(10);
    rig.command(Command::Toggle(Setting::AutoJump));
    rig.send(Event::PositionSync);
    assert_eq!(rig.pilot.pending_tasks(), 0);
    Ok(())
}

#[test]
fn portal_next_to_player_suppresses_death_detection() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(3))?;
    rig.host.set_block(BlockPos::new(1, 64, -5), Block::Portal);

    rig.tick();
    assert!(rig.pilot.session().disregard_resync);
    rig.host.set_block(BlockPos::new(1, 64, -5), Block::Air);

    rig.send(Event::PositionSync);
    assert!(!rig.running());
    // Only the flag's own clear is queued.
    assert_eq!(rig.pilot.pending_tasks(), 1);

    rig.ticks(39);
    assert!(rig.pilot.session().disregard_resync);
    rig.tick();
    assert!(!rig.pilot.session().disregard_resync);
    Ok(())
}

#[test]
fn blind_jump_adopts_next_map_once_terrain_loads() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.host.set_map(Some("Drainage"), Some("Revolve"), false);
    rig.save("Revolve", Direction::North, &stationary_trace(12))?;
    rig.tick();

    rig.chat("Drop to the bottom of the map and avoid the walls!");
    assert!(rig.pilot.session().disregard_resync);

    rig.host.teleport(REVOLVE_NORTH);
    rig.host.delay_chunks(3);
    rig.send(Event::PositionSync);
    assert!(rig.pilot.session().blind_jump);
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Revolve"));
    assert!(!rig.running());

    assert_eq!(rig.tick_until(10, Rig::running), Some(4));
    assert!(!rig.pilot.session().blind_jump);
    // The feed still lags behind; the forced map holds.
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Revolve"));

    // Confirmation of the same map is not a map change.
    rig.host.set_map(Some("Revolve"), None, false);
    rig.tick();
    assert!(rig.running());
    Ok(())
}

#[test]
fn teleport_into_the_first_map_keeps_the_first_map() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.host.set_map(Some("Drainage"), Some("Revolve"), true);
    rig.save("Drainage", Direction::North, &stationary_trace(6))?;
    rig.tick();

    rig.chat("Drop to the bottom of the map and land in water!");
    rig.send(Event::PositionSync);
    assert!(!rig.pilot.session().blind_jump);
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Drainage"));
    // Only the disregard clear is queued.
    assert_eq!(rig.pilot.pending_tasks(), 1);

    rig.ticks(30);
    assert!(rig.host.goals_set().is_empty());
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Drainage"));

    rig.chat("DROP!");
    assert!(rig.running());
    assert!(rig.host.goals_set().is_empty());
    Ok(())
}

#[test]
fn resync_after_the_feed_moved_on_leaves_the_change_to_map_tracking() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.host.set_map(Some("Drainage"), Some("Revolve"), false);
    rig.tick();

    rig.chat("Drop to the bottom of the map and avoid the walls!");
    rig.host.set_map(Some("Revolve"), Some("Castle"), false);
    rig.send(Event::PositionSync);
    assert!(!rig.pilot.session().blind_jump);
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Drainage"));

    rig.tick();
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Revolve"));
    // Disregard clear plus the map-change jump.
    assert_eq!(rig.pilot.pending_tasks(), 2);
    Ok(())
}

#[test]
fn blind_jump_stops_waiting_for_terrain_after_bounded_polls() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.host.set_map(Some("Drainage"), Some("Revolve"), false);
    rig.save("Revolve", Direction::North, &stationary_trace(4))?;
    rig.tick();

    rig.chat("Drop to the bottom of the map and avoid the walls!");
    rig.host.teleport(REVOLVE_NORTH);
    rig.host.delay_chunks(1_000);
    rig.send(Event::PositionSync);

    rig.ticks(18);
    assert!(!rig.running());
    rig.tick();
    assert!(rig.running());
    Ok(())
}

#[test]
fn sunken_vantage_point_raises_the_goal_and_detects_arrival() -> Result<()> {
    let mut rig = Rig::new("Warp", Vec3::new(3.5, 64.0, 6.5))?;
    // Warp's south point sits a block down on a ledge; the torch keeps the
    // hole's outline intact for the center scan.
    let ledge = BlockPos::new(0, 63, 2);
    rig.host.set_block(ledge, Block::Torch);
    rig.host.set_block(ledge.offset(0, -1, 0), Block::Solid);
    rig.save("Warp", Direction::South, &stationary_trace(6))?;
    rig.tick();

    rig.chat("DROP!");
    assert_eq!(rig.host.goals_set(), &[BlockPos::new(0, 64, 2)]);

    assert!(rig.tick_until(30, Rig::running).is_some(), "macro never started");
    assert_eq!(rig.host.position().floor(), ledge);
    assert_eq!(rig.host.goal(), None);
    assert_eq!(rig.host.goals_set().len(), 1);
    Ok(())
}

#[test]
fn map_change_cancels_and_jumps_again() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(30))?;
    rig.tick();
    rig.chat("DROP!");
    rig.ticks(2);
    assert!(rig.running());

    rig.host.set_map(Some("Revolve"), None, false);
    rig.tick();
    assert!(!rig.running());
    assert!(rig.host.held_keys().is_empty());
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Revolve"));

    rig.ticks(9);
    assert!(rig.host.goals_set().is_empty());
    rig.tick();
    // No Revolve macros yet: heads for the nearest point regardless.
    assert_eq!(rig.host.goals_set(), &[BlockPos::new(0, 64, -2)]);
    Ok(())
}

#[test]
fn pre_jump_fires_ahead_of_the_doors_and_skips_the_drop() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    let trace = stationary_trace(6);
    rig.save("Drainage", Direction::North, &trace)?;
    rig.tick();

    rig.chat("The doors will open in 3 seconds!");
    assert_eq!(rig.pilot.pending_tasks(), 0);

    rig.chat("The doors will open in 1 second!");
    assert!(rig.pilot.session().pre_jump_scheduled);
    assert_eq!(rig.pilot.pending_tasks(), 1);

    rig.tick();
    assert!(rig.running());
    assert_eq!(rig.host.look(), trace.frames()[0].look);

    rig.chat("DROP!");
    assert!(!rig.pilot.session().pre_jump_scheduled);
    rig.tick();
    assert_eq!(rig.host.look(), trace.frames()[1].look);
    Ok(())
}

#[test]
fn pre_jump_defers_to_drop_when_close_to_the_hole() -> Result<()> {
    let mut rig = Rig::new("Revolve", REVOLVE_NORTH)?;
    rig.save("Revolve", Direction::North, &stationary_trace(6))?;
    rig.tick();

    rig.chat("The doors will open in 1 second!");
    assert!(rig.pilot.session().pre_jump_pending);
    assert!(!rig.pilot.session().pre_jump_scheduled);
    assert_eq!(rig.pilot.pending_tasks(), 0);

    rig.chat("DROP!");
    assert!(rig.running());
    assert!(!rig.pilot.session().pre_jump_pending);
    Ok(())
}

#[test]
fn finishing_all_maps_queues_a_new_session() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(20))?;
    rig.tick();
    rig.chat("DROP!");
    rig.tick();

    rig.chat("You finished all maps in 04:12.300!");
    assert!(!rig.running());
    assert_eq!(rig.host.chat_sent(), &["/play arcade_dropper".to_string()]);
    assert!(rig.pilot.session().disregard_resync);

    rig.send(Event::PositionSync);
    assert_eq!(rig.pilot.pending_tasks(), 1);

    rig.ticks(60);
    assert!(!rig.pilot.session().disregard_resync);

    rig.chat("Steve_01 has joined (2/8)!");
    assert_eq!(rig.pilot.session().current_map, None);
    rig.tick();
    assert_eq!(rig.pilot.session().current_map.as_deref(), Some("Drainage"));
    assert_eq!(rig.pilot.pending_tasks(), 0);
    Ok(())
}

#[test]
fn record_command_samples_until_the_menu_opens() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.tick();

    rig.command(Command::Record {
        map: None,
        direction: None,
    });
    assert!(rig.pilot.engine().is_recording());
    assert!(rig.host.has_status("Started recording macro"));

    rig.ticks(2);
    rig.host.set_key(MovementKey::Forward, true);
    rig.ticks(3);
    rig.host.set_key(MovementKey::Forward, false);
    rig.ticks(2);

    // Falling while recording is not a failed drop.
    rig.send(Event::PositionSync);
    assert_eq!(rig.pilot.pending_tasks(), 0);

    rig.send(Event::ScreenOpened("Inventory".to_string()));
    assert!(rig.pilot.engine().is_recording());
    rig.send(Event::ScreenOpened("Game Menu".to_string()));
    rig.tick();
    assert!(rig.pilot.engine().is_idle());
    assert!(rig.host.has_status("saved macro for Drainage/north (5 frames)"));

    let saved = rig
        .pilot
        .store()
        .load("Drainage", Direction::North)?
        .expect("saved macro");
    assert_eq!(saved.len(), 5);
    assert_eq!(saved.frames()[0].keys, KeySet::EMPTY);
    assert_eq!(saved.frames()[0].look, Direction::North.vantage_look());
    assert!(saved.frames()[1].keys.contains(MovementKey::Forward));
    Ok(())
}

#[test]
fn record_with_explicit_map_normalizes_the_name() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.tick();

    rig.command(Command::Record {
        map: Some("\"Launch Zone\"".to_string()),
        direction: Some(Direction::East),
    });
    rig.ticks(2);
    rig.send(Event::ScreenOpened("Game Menu".to_string()));
    rig.tick();

    let saved = rig.pilot.store().saved_directions("Launch_Zone")?;
    assert!(saved.contains(&Direction::East));
    Ok(())
}

#[test]
fn off_center_command_aligns_and_asks_again() -> Result<()> {
    let mut rig = Rig::new("Drainage", Vec3::new(0.9, 64.0, -4.5))?;
    rig.save("Drainage", Direction::North, &stationary_trace(4))?;
    rig.tick();

    rig.command(Command::Run {
        map: None,
        direction: None,
    });
    assert!(!rig.running());
    assert!(rig.pilot.is_navigating());
    assert!(rig.host.has_status("run the command again"));

    rig.ticks(5);
    assert!(!rig.pilot.is_navigating());
    assert!(!rig.running());
    assert!((rig.host.position().x - 0.69).abs() < 1e-9);
    assert_eq!(rig.host.look(), Direction::North.vantage_look());

    rig.command(Command::Run {
        map: None,
        direction: None,
    });
    assert!(rig.running());
    Ok(())
}

#[test]
fn unreachable_goal_is_abandoned_after_the_timeout() -> Result<()> {
    let mut rig = Rig::with_config("Drainage", Vec3::new(6.5, 64.0, 3.5), |config| {
        config.timings.nav_timeout_ticks = 10;
    })?;
    rig.host.set_reachable(false);
    rig.tick();

    rig.command(Command::Jump);
    assert_eq!(rig.host.goal(), Some(BlockPos::new(5, 64, 0)));

    rig.ticks(9);
    assert!(rig.pilot.is_navigating());
    rig.tick();
    assert!(!rig.pilot.is_navigating());
    assert_eq!(rig.host.goal(), None);
    assert!(rig.host.has_status("not reached after 10 ticks"));
    Ok(())
}

#[test]
fn jump_command_without_map_reports_it() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.host.set_map(None, None, false);
    rig.tick();

    rig.command(Command::Jump);
    assert!(rig.host.has_status("no active map detected"));
    assert!(rig.host.goals_set().is_empty());
    Ok(())
}

#[test]
fn toggles_persist_and_gate_automation() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.save("Drainage", Direction::North, &stationary_trace(4))?;
    rig.tick();

    rig.command(Command::Toggle(Setting::AutoJump));
    assert!(rig.host.has_status("autoJump toggled to false"));
    assert!(!rig.pilot.settings().auto_jump);

    rig.chat("DROP!");
    assert!(!rig.running());

    rig.command(Command::Query(Setting::AutoJump));
    assert!(rig.host.has_status("autoJump is false"));

    let persisted = SettingsFile::new(rig.home.path().join("droppy.json")).load()?;
    assert!(!persisted.auto_jump);
    assert!(persisted.auto_play);
    Ok(())
}

#[test]
fn play_and_pathfinder_commands_reach_the_client() -> Result<()> {
    let mut rig = Rig::new("Drainage", DRAINAGE_NORTH)?;
    rig.command(Command::Play);
    rig.command(Command::FixPathfinder);
    assert_eq!(rig.host.chat_sent(), &["/play arcade_dropper".to_string()]);
    assert_eq!(
        rig.host.pathfinder_settings(),
        Some(PathfinderSettings::AUTOPILOT)
    );
    Ok(())
}
