//! Top-level reactive state machine. Turns chat cues, position resyncs, key
//! presses, opened screens and commands into navigation, macro runs and
//! recordings.
//!
//! Everything happens on the host's tick: events are handled as they arrive,
//! deferred work waits in a [`TickScheduler`] and fires at the start of a later
//! tick. Suppression windows follow one pattern: set a flag, then clear it from
//! a deferred task.

use std::collections::BTreeSet;

use crate::chat::{self, ChatCue};
use crate::config::{RuntimeConfig, Setting, Settings, SettingsFile};
use crate::engine::{MacroEngine, MacroOutcome};
use crate::error::DroppyError;
use crate::geometry::{self, Direction, MapProfiles};
use crate::host::{self, Host, PathfinderSettings};
use crate::navigation::{self, Alignment, NavEvent, NavigationController};
use crate::scheduler::{TickScheduler, TICKS_PER_SECOND};
use crate::scoreboard::normalize_map_name;
use crate::status::StatusLine;
use crate::store::MacroStore;

/// Half-width of the square probed for loaded chunks before a blind jump.
const TERRAIN_PROBE_RADIUS: i32 = 16;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Tick,
    Chat(String),
    /// Server-forced position/look update.
    PositionSync,
    Key {
        name: String,
        pressed: bool,
    },
    ScreenOpened(String),
    Command(Command),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Play,
    Jump,
    JumpStop,
    FixPathfinder,
    Record {
        map: Option<String>,
        direction: Option<Direction>,
    },
    Run {
        map: Option<String>,
        direction: Option<Direction>,
    },
    Toggle(Setting),
    Query(Setting),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroAction {
    Record,
    Run,
}

/// Per-session flags. Every handler reads and writes these directly; the last
/// writer wins.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionContext {
    pub current_map: Option<String>,
    /// Resyncs are expected (teleport, map transition) and must not be read as
    /// a failed drop.
    pub disregard_resync: bool,
    pub blind_jump: bool,
    /// Cleared by the next resync.
    pub just_reset: bool,
    pub pre_jump_pending: bool,
    /// The next drop cue is already covered by a scheduled jump.
    pub pre_jump_scheduled: bool,
    pub last_resync_tick: Option<u64>,
    disregard_generation: u64,
    forced_map_since: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Deferred {
    Jump { via_command: bool, retry: bool },
    ClearDisregard { generation: u64 },
    PollTerrain { attempt: u32 },
}

/// What to do once navigation reports the player standing on a vantage point.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ArrivalAction {
    Jump {
        via_command: bool,
    },
    Execute {
        action: MacroAction,
        map: String,
        direction: Direction,
        via_command: bool,
        reissue: bool,
    },
    Face,
}

#[derive(Debug)]
pub struct JumpOrchestrator {
    config: RuntimeConfig,
    profiles: MapProfiles,
    settings_file: SettingsFile,
    settings: Settings,
    store: MacroStore,
    engine: MacroEngine,
    nav: NavigationController<ArrivalAction>,
    scheduler: TickScheduler<Deferred>,
    session: SessionContext,
    now: u64,
}

impl JumpOrchestrator {
    pub fn new(config: RuntimeConfig, profiles: MapProfiles) -> Self {
        let settings_file = SettingsFile::new(config.settings_path());
        let settings = match settings_file.load() {
            Ok(settings) => settings,
            Err(err) => {
                tracing::warn!("using default settings: {err:#}");
                Settings::default()
            }
        };
        Self {
            store: MacroStore::new(config.macro_dir()),
            engine: MacroEngine::new(config.suppress_look_input),
            nav: NavigationController::new(&config.timings),
            scheduler: TickScheduler::new(),
            session: SessionContext::default(),
            now: 0,
            settings_file,
            settings,
            profiles,
            config,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn engine(&self) -> &MacroEngine {
        &self.engine
    }

    pub fn store(&self) -> &MacroStore {
        &self.store
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn is_navigating(&self) -> bool {
        self.nav.is_busy()
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    /// Greets the player once the autopilot is attached to a client.
    pub fn announce<H: Host + ?Sized>(&mut self, host: &mut H) {
        tracing::info!(home = %self.config.home.display(), "autopilot enabled");
        host.show_status(&StatusLine::info(
            "Autopilot enabled. Run fix-pathfinder once to make sure pathing behaves.",
        ));
    }

    pub fn handle<H: Host + ?Sized>(&mut self, host: &mut H, event: Event) {
        match event {
            Event::Tick => self.on_tick(host),
            Event::Chat(line) => self.on_chat(host, &line),
            Event::PositionSync => self.on_position_sync(host),
            Event::Key { name, pressed } => self.on_key(host, &name, pressed),
            Event::ScreenOpened(screen) => self.on_screen(&screen),
            Event::Command(command) => self.on_command(host, command),
        }
    }

    fn on_tick<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.now += 1;

        if self.track_map(host) {
            self.guard_portal(host);
        }

        for task in self.scheduler.drain_due(self.now) {
            self.run_deferred(host, task);
        }

        if let Some(event) = self.nav.tick(host) {
            self.on_nav_event(host, event);
        }

        if let Some(outcome) = self.engine.tick(host, &self.store) {
            self.report_outcome(host, outcome);
        }
    }

    /// Follows the feed's active map. Returns false while outside the target
    /// game.
    fn track_map<H: Host + ?Sized>(&mut self, host: &mut H) -> bool {
        let info = host.map_info();
        let active = match info.active {
            Some(active) if host.is_target_game() => active,
            _ => {
                if let Some(map) = self.session.current_map.take() {
                    tracing::debug!(%map, "left the game, forgetting map");
                }
                self.session.forced_map_since = None;
                return false;
            }
        };

        if let Some(since) = self.session.forced_map_since {
            let confirmed = self.session.current_map.as_deref() == Some(active.as_str());
            if !confirmed && self.now - since < self.config.timings.blind_map_hold_ticks {
                return true;
            }
            self.session.forced_map_since = None;
        }

        let prior = self.session.current_map.replace(active.clone());
        match prior {
            Some(prior) if prior != active && self.settings.auto_jump => {
                tracing::info!(from = %prior, to = %active, "map changed");
                self.abort_in_flight(host);
                self.scheduler.schedule(
                    self.now,
                    self.config.timings.map_change_ticks,
                    Deferred::Jump {
                        via_command: false,
                        retry: true,
                    },
                );
            }
            None => tracing::info!(map = %active, "map detected"),
            _ => {}
        }
        true
    }

    fn guard_portal<H: Host + ?Sized>(&mut self, host: &mut H) {
        if !self.session.disregard_resync && host::near_portal(&*host, host.position()) {
            tracing::debug!("next to a portal, disregarding resyncs");
            self.hold_disregard(self.config.timings.portal_guard_ticks);
        }
    }

    fn hold_disregard(&mut self, ticks: u64) {
        self.session.disregard_resync = true;
        self.session.disregard_generation += 1;
        self.scheduler.schedule(
            self.now,
            ticks,
            Deferred::ClearDisregard {
                generation: self.session.disregard_generation,
            },
        );
    }

    fn run_deferred<H: Host + ?Sized>(&mut self, host: &mut H, task: Deferred) {
        match task {
            Deferred::Jump { via_command, retry } => self.jump(host, via_command, retry),
            Deferred::ClearDisregard { generation } => {
                // A newer hold owns the flag.
                if generation == self.session.disregard_generation {
                    self.session.disregard_resync = false;
                    tracing::debug!("resyncs count again");
                }
            }
            Deferred::PollTerrain { attempt } => self.poll_terrain(host, attempt),
        }
    }

    fn on_chat<H: Host + ?Sized>(&mut self, host: &mut H, line: &str) {
        let Some(cue) = chat::classify(line) else {
            return;
        };
        tracing::debug!(?cue, "chat cue");
        match cue {
            ChatCue::Drop => self.on_drop(host),
            ChatCue::PlayerJoined => self.begin_session(),
            ChatCue::Instructions => {
                self.hold_disregard(self.config.timings.instructions_guard_ticks)
            }
            ChatCue::DoorsOpening { seconds } => self.on_doors_opening(host, seconds),
            ChatCue::FinishedAllMaps => self.on_finished(host),
        }
    }

    fn begin_session(&mut self) {
        tracing::info!("new session forming, resetting state");
        self.session = SessionContext {
            disregard_generation: self.session.disregard_generation,
            ..SessionContext::default()
        };
        self.scheduler
            .retain(|task| matches!(task, Deferred::ClearDisregard { .. }));
    }

    fn on_drop<H: Host + ?Sized>(&mut self, host: &mut H) {
        if !self.settings.auto_jump {
            return;
        }
        if self.session.pre_jump_scheduled {
            self.session.pre_jump_scheduled = false;
            tracing::debug!("drop cue already covered by a pre-jump");
            return;
        }
        self.session.pre_jump_pending = false;
        self.jump(host, false, true);
    }

    /// Jumps ahead of the doors when the vantage point sits far enough from the
    /// hole that the run-up would otherwise lose time.
    fn on_doors_opening<H: Host + ?Sized>(&mut self, host: &mut H, seconds: u32) {
        if !self.settings.pre_jump
            || !self.settings.auto_jump
            || seconds > self.config.timings.pre_jump_window_secs
        {
            return;
        }

        let timings = self.config.timings;
        let Some(map) = self.session.current_map.clone() else {
            self.session.pre_jump_pending = true;
            return;
        };
        let profile = self.profiles.get(&map);
        let pos = host.position();
        let direction = geometry::resolve_vantage_points(&*host, pos, profile)
            .and_then(|points| geometry::vantage_point_of(&points, pos));
        let Some(direction) = direction else {
            tracing::debug!(%map, "not on a vantage point, waiting for the drop cue");
            self.session.pre_jump_pending = true;
            return;
        };

        let [dx, _, dz] = profile.offsets.get(direction);
        let offset = dx.abs().max(dz.abs());
        if offset <= timings.pre_jump_min_offset {
            tracing::debug!(%map, %direction, offset, "too close to the hole for a pre-jump");
            self.session.pre_jump_pending = true;
            return;
        }

        let lead = u64::from(seconds) * TICKS_PER_SECOND;
        let delay = lead.saturating_sub(offset as u64 * timings.pre_jump_ticks_per_block);
        tracing::info!(%map, %direction, offset, delay, "pre-jump scheduled");
        self.session.pre_jump_pending = false;
        self.session.pre_jump_scheduled = true;
        self.scheduler.schedule(
            self.now,
            delay,
            Deferred::Jump {
                via_command: false,
                retry: true,
            },
        );
    }

    fn on_finished<H: Host + ?Sized>(&mut self, host: &mut H) {
        if !self.settings.auto_play {
            return;
        }
        tracing::info!("all maps finished, queueing again");
        self.abort_in_flight(host);
        host.send_chat(&self.config.play_command);
        self.hold_disregard(self.config.timings.session_guard_ticks);
    }

    fn on_position_sync<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(last) = self.session.last_resync_tick.replace(self.now) {
            let since = self.now - last;
            if since < self.config.timings.resync_debounce_ticks {
                let stale = DroppyError::StaleEvent {
                    since_last_ticks: since,
                };
                tracing::debug!("{stale}");
                return;
            }
        }

        let just_reset = std::mem::take(&mut self.session.just_reset);
        if !self.settings.auto_jump {
            return;
        }
        if self.session.disregard_resync {
            self.try_blind_jump(host);
            return;
        }
        let Some(map) = self.session.current_map.clone() else {
            return;
        };
        if self.engine.is_recording() || just_reset {
            tracing::debug!(%map, just_reset, "resync ignored");
            return;
        }

        tracing::info!(%map, "unexpected resync, treating it as a failed drop");
        self.abort_in_flight(host);
        self.scheduler.schedule(
            self.now,
            self.config.timings.resync_settle_ticks,
            Deferred::Jump {
                via_command: false,
                retry: true,
            },
        );
    }

    /// The resync came from a map transition. When the feed already knows the
    /// next map, adopt it without waiting for confirmation and jump as soon as
    /// the terrain is there.
    ///
    /// The teleport into the first map is not a transition, and neither is a
    /// resync after the feed already reports a different map; map tracking
    /// handles that one.
    fn try_blind_jump<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.session.blind_jump || self.engine.is_recording() {
            return;
        }
        let info = host.map_info();
        if info.is_first_map {
            tracing::debug!(map = ?info.active, "resync on the first map disregarded");
            return;
        }
        if info.active.is_some() && info.active != self.session.current_map {
            tracing::debug!(active = ?info.active, "feed already moved on, resync disregarded");
            return;
        }
        let Some(next) = info.next else {
            tracing::debug!("resync disregarded");
            return;
        };
        if self.session.current_map.as_deref() == Some(next.as_str()) {
            return;
        }

        tracing::info!(from = ?self.session.current_map, to = %next, "blind jump to next map");
        self.abort_in_flight(host);
        self.session.current_map = Some(next);
        self.session.forced_map_since = Some(self.now);
        self.session.blind_jump = true;
        self.poll_terrain(host, 1);
    }

    fn poll_terrain<H: Host + ?Sized>(&mut self, host: &mut H, attempt: u32) {
        if !self.session.blind_jump {
            return;
        }
        let loaded = host::area_loaded(&*host, host.position(), TERRAIN_PROBE_RADIUS);
        if loaded || attempt >= self.config.timings.chunk_poll_attempts {
            if !loaded {
                tracing::warn!(attempt, "terrain still loading, jumping anyway");
            }
            self.session.blind_jump = false;
            self.jump(host, false, true);
            return;
        }
        self.scheduler.schedule(
            self.now,
            self.config.timings.chunk_poll_ticks,
            Deferred::PollTerrain {
                attempt: attempt + 1,
            },
        );
    }

    fn on_key<H: Host + ?Sized>(&mut self, host: &mut H, name: &str, pressed: bool) {
        if !pressed || name != self.config.reset_key {
            return;
        }
        if host.main_hand_item().as_deref() != Some(self.config.reset_item.as_str()) {
            return;
        }
        tracing::info!("manual reset");
        self.session.just_reset = true;
        self.abort_in_flight(host);
    }

    fn on_screen(&mut self, screen: &str) {
        if screen == self.config.menu_screen && self.engine.is_recording() {
            tracing::debug!(screen, "menu opened, stopping recording");
            self.engine.stop_recording();
        }
    }

    fn on_command<H: Host + ?Sized>(&mut self, host: &mut H, command: Command) {
        tracing::debug!(?command, "command");
        match command {
            Command::Play => host.send_chat(&self.config.play_command),
            Command::Jump => self.jump(host, true, true),
            Command::JumpStop => {
                self.engine.stop_running();
                self.nav.cancel(host);
            }
            Command::FixPathfinder => {
                host.apply_settings(&PathfinderSettings::AUTOPILOT);
                self.notify(host, StatusLine::info("Pathfinder settings applied."), false);
            }
            Command::Record { map, direction } => {
                let map = map.map(|map| normalize_map_name(&map));
                self.execute(host, MacroAction::Record, map, direction, true, false);
            }
            Command::Run { map, direction } => {
                let map = map.map(|map| normalize_map_name(&map));
                self.execute(host, MacroAction::Run, map, direction, true, false);
            }
            Command::Toggle(setting) => match self.settings_file.toggle(setting) {
                Ok(value) => {
                    self.settings.set(setting, value);
                    tracing::info!(%setting, value, "setting toggled");
                    self.notify(
                        host,
                        StatusLine::info(format!("{setting} toggled to {value}")),
                        false,
                    );
                }
                Err(err) => {
                    tracing::warn!(%setting, "failed toggling setting: {err:#}");
                    let error = DroppyError::from(err);
                    self.notify(host, StatusLine::error(error.to_string()), false);
                }
            },
            Command::Query(setting) => {
                let value = self.settings.get(setting);
                self.notify(host, StatusLine::info(format!("{setting} is {value}")), false);
            }
        }
    }

    /// Runs the saved macro from the vantage point the player stands on, or
    /// walks to the nearest vantage point that has one first.
    fn jump<H: Host + ?Sized>(&mut self, host: &mut H, via_command: bool, retry: bool) {
        let Some(map) = self.active_map(host) else {
            let error = DroppyError::MapUnknown;
            self.notify(host, StatusLine::error(error.to_string()), !via_command);
            return;
        };
        let profile = self.profiles.get(&map).clone();
        let pos = host.position();
        let Some(points) = geometry::resolve_vantage_points(&*host, pos, &profile) else {
            self.jump_unresolved(host, map, via_command, retry);
            return;
        };

        let saved = self.saved_directions(&map);
        if let Some(direction) =
            geometry::vantage_point_of(&points, pos).filter(|direction| saved.contains(direction))
        {
            self.jump_from(host, map, direction, via_command);
            return;
        }

        let target = geometry::nearest(&points, pos, |direction| saved.contains(&direction));
        if !self
            .nav
            .go_to(host, &profile, target, ArrivalAction::Jump { via_command })
        {
            self.jump_unresolved(host, map, via_command, retry);
        }
    }

    fn jump_unresolved<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        map: String,
        via_command: bool,
        retry: bool,
    ) {
        if retry {
            self.notify(
                host,
                StatusLine::info("Trying again as the world may not have fully loaded"),
                true,
            );
            self.scheduler.schedule(
                self.now,
                self.config.timings.goal_retry_ticks,
                Deferred::Jump {
                    via_command,
                    retry: false,
                },
            );
            return;
        }
        let error = DroppyError::GeometryUnresolved { map };
        tracing::warn!("{error}");
        self.notify(host, StatusLine::error(error.to_string()), !via_command);
    }

    fn jump_from<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        map: String,
        direction: Direction,
        via_command: bool,
    ) {
        tracing::info!(%map, %direction, "jumping");
        self.notify(
            host,
            StatusLine::info(format!(
                "Jumping from {} vantage point",
                direction.as_str().to_uppercase()
            )),
            !via_command,
        );
        self.execute(
            host,
            MacroAction::Run,
            Some(map),
            Some(direction),
            via_command,
            true,
        );
    }

    fn on_nav_event<H: Host + ?Sized>(&mut self, host: &mut H, event: NavEvent<ArrivalAction>) {
        match event {
            NavEvent::Arrived { then, .. } => match then {
                ArrivalAction::Jump { via_command } => {
                    let Some(map) = self.active_map(host) else {
                        let error = DroppyError::MapUnknown;
                        self.notify(host, StatusLine::error(error.to_string()), !via_command);
                        return;
                    };
                    let pos = host.position();
                    let direction =
                        geometry::resolve_vantage_points(&*host, pos, self.profiles.get(&map))
                            .and_then(|points| geometry::vantage_point_of(&points, pos));
                    match direction {
                        Some(direction) => self.jump_from(host, map, direction, via_command),
                        None => {
                            let error = DroppyError::NotAtVantagePoint { map };
                            tracing::warn!("{error}");
                            self.notify(host, StatusLine::error(error.to_string()), !via_command);
                        }
                    }
                }
                ArrivalAction::Execute {
                    action,
                    map,
                    direction,
                    via_command,
                    reissue,
                } => self.execute(host, action, Some(map), Some(direction), via_command, reissue),
                ArrivalAction::Face => {}
            },
            NavEvent::Unreachable { error, then } => {
                let via_command = match then {
                    ArrivalAction::Jump { via_command } => via_command,
                    ArrivalAction::Execute { via_command, .. } => via_command,
                    ArrivalAction::Face => false,
                };
                self.notify(host, StatusLine::error(error.to_string()), !via_command);
            }
        }
    }

    /// Records or runs at a vantage point. When the player is off block center
    /// the action is postponed behind an alignment pass; with `reissue` it is
    /// retried once aligned, otherwise the caller has to ask again.
    fn execute<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        action: MacroAction,
        map: Option<String>,
        direction: Option<Direction>,
        via_command: bool,
        reissue: bool,
    ) {
        let quiet = !via_command;
        let Some(map) = map.or_else(|| self.active_map(host)) else {
            self.notify(
                host,
                StatusLine::error("Please name the map, it cannot be detected."),
                quiet,
            );
            return;
        };

        let pos = host.position();
        let direction = match direction {
            Some(direction) => Some(direction),
            None => geometry::resolve_vantage_points(&*host, pos, self.profiles.get(&map))
                .and_then(|points| geometry::vantage_point_of(&points, pos)),
        };
        let Some(direction) = direction else {
            let error = DroppyError::NotAtVantagePoint { map };
            self.notify(host, StatusLine::error(error.to_string()), quiet);
            return;
        };

        if navigation::requires_alignment(pos) {
            let alignment = Alignment::measure(pos);
            let error = DroppyError::NotAligned {
                steps_x: alignment.steps_x,
                steps_z: alignment.steps_z,
            };
            tracing::info!(%map, %direction, "{error}, aligning first");
            let message = if reissue {
                format!("{error}; aligning, the macro will start afterwards.")
            } else {
                format!("{error}; run the command again after alignment.")
            };
            self.notify(host, StatusLine::error(message), quiet);
            let then = if reissue {
                ArrivalAction::Execute {
                    action,
                    map,
                    direction,
                    via_command,
                    reissue: false,
                }
            } else {
                ArrivalAction::Face
            };
            self.nav.align(host, direction, then);
            return;
        }

        host.set_look(direction.vantage_look());
        match action {
            MacroAction::Record => {
                if let Some(outcome) = self.engine.interrupt(host, &self.store) {
                    self.report_outcome(host, outcome);
                }
                self.engine.begin_record(host, &self.store, &map, direction);
                self.notify(
                    host,
                    StatusLine::info("Started recording macro. Open the game menu to stop."),
                    false,
                );
            }
            MacroAction::Run => self.run_macro(host, map, direction, via_command),
        }
    }

    fn run_macro<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        map: String,
        direction: Direction,
        via_command: bool,
    ) {
        let quiet = !via_command;
        let trace = match self.store.load(&map, direction) {
            Ok(trace) => trace,
            Err(err) => {
                tracing::warn!(%map, %direction, "unreadable macro: {err:#}");
                None
            }
        };

        if let Some(trace) = trace {
            if let Some(outcome) = self.engine.interrupt(host, &self.store) {
                self.report_outcome(host, outcome);
            }
            self.notify(host, StatusLine::info("Running macro"), quiet);
            self.engine.begin_run(host, &self.store, &map, direction, trace);
            return;
        }

        let missing = DroppyError::NoSavedMacro {
            map: map.clone(),
            direction,
        };
        if !self.config.fallback_to_nearest {
            self.notify(host, StatusLine::error(missing.to_string()), quiet);
            return;
        }

        let profile = self.profiles.get(&map).clone();
        let saved = self.saved_directions(&map);
        let pos = host.position();
        let closest = geometry::resolve_vantage_points(&*host, pos, &profile).and_then(|points| {
            geometry::nearest(&points, pos, |candidate| {
                candidate != direction && saved.contains(&candidate)
            })
        });
        let Some(closest) = closest else {
            tracing::warn!("{missing}, and no other vantage point has one");
            self.notify(
                host,
                StatusLine::error(format!("{missing}; no vantage point with a macro found.")),
                quiet,
            );
            return;
        };

        tracing::info!(
            %map,
            from = %direction,
            to = %closest.0,
            "falling back to nearest saved macro"
        );
        self.notify(
            host,
            StatusLine::info("Pathing to closest vantage point with a macro."),
            quiet,
        );
        self.nav.go_to(
            host,
            &profile,
            Some(closest),
            ArrivalAction::Execute {
                action: MacroAction::Run,
                map,
                direction: closest.0,
                via_command,
                reissue: false,
            },
        );
    }

    fn abort_in_flight<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Some(outcome) = self.engine.interrupt(host, &self.store) {
            self.report_outcome(host, outcome);
        }
        self.nav.cancel(host);
    }

    fn report_outcome<H: Host + ?Sized>(&mut self, host: &mut H, outcome: MacroOutcome) {
        match outcome {
            MacroOutcome::Saved {
                map,
                direction,
                frames,
                ..
            } => self.notify(
                host,
                StatusLine::info(format!(
                    "Stopped recording and saved macro for {map}/{direction} ({frames} frames)."
                )),
                false,
            ),
            MacroOutcome::SaveFailed { error, .. } => self.notify(
                host,
                StatusLine::error(DroppyError::Storage(error).to_string()),
                false,
            ),
            MacroOutcome::Completed {
                map,
                direction,
                frames,
            } => {
                tracing::info!(%map, %direction, frames, "macro finished");
            }
            MacroOutcome::Terminated { at_frame, .. } => {
                tracing::info!(at_frame, "macro terminated");
                self.notify(host, StatusLine::info("Terminated macro execution"), true);
            }
        }
    }

    fn active_map<H: Host + ?Sized>(&self, host: &H) -> Option<String> {
        self.session
            .current_map
            .clone()
            .or_else(|| host.map_info().active)
    }

    fn saved_directions(&self, map: &str) -> BTreeSet<Direction> {
        match self.store.saved_directions(map) {
            Ok(directions) => directions,
            Err(err) => {
                tracing::warn!(map, "cannot list saved macros: {err:#}");
                BTreeSet::new()
            }
        }
    }

    /// Shows `line` to the player. Lines marked `verbose_only` are logged but
    /// only shown with the verbose setting on.
    fn notify<H: Host + ?Sized>(&self, host: &mut H, line: StatusLine, verbose_only: bool) {
        if verbose_only && !self.settings.verbose {
            tracing::debug!(status = %line.text, "status line suppressed");
            return;
        }
        host.show_status(&line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use crate::sim::SimHost;

    fn orchestrator(home: &std::path::Path) -> JumpOrchestrator {
        JumpOrchestrator::new(RuntimeConfig::with_home(home), MapProfiles::builtin())
    }

    #[test]
    fn newer_disregard_hold_outlives_older_clear() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pilot = orchestrator(tmp.path());
        let mut host = SimHost::new(Vec3::new(0.5, 64.0, 0.5));

        pilot.hold_disregard(5);
        for _ in 0..3 {
            pilot.handle(&mut host, Event::Tick);
        }
        pilot.hold_disregard(5);
        for _ in 0..3 {
            pilot.handle(&mut host, Event::Tick);
        }
        // The first hold's clear has fired; the second is still running.
        assert!(pilot.session().disregard_resync);
        for _ in 0..2 {
            pilot.handle(&mut host, Event::Tick);
        }
        assert!(!pilot.session().disregard_resync);
        Ok(())
    }

    #[test]
    fn joining_a_session_resets_flags_and_pending_jumps() -> anyhow::Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut pilot = orchestrator(tmp.path());

        pilot.session.current_map = Some("Revolve".to_string());
        pilot.session.pre_jump_scheduled = true;
        pilot.session.just_reset = true;
        pilot.scheduler.schedule(
            0,
            10,
            Deferred::Jump {
                via_command: false,
                retry: true,
            },
        );
        pilot.hold_disregard(40);

        pilot.begin_session();
        assert_eq!(pilot.session().current_map, None);
        assert!(!pilot.session().pre_jump_scheduled);
        assert!(!pilot.session().just_reset);
        assert!(!pilot.session().disregard_resync);
        assert_eq!(pilot.pending_tasks(), 1);
        Ok(())
    }
}
