use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::scheduler::millis_to_ticks;

pub const SETTINGS_FILE: &str = "droppy.json";
pub const MACRO_DIR: &str = "macros";

pub const DEFAULT_SETTLE_TICKS: u64 = 3;
pub const DEFAULT_RESYNC_SETTLE_TICKS: u64 = 3;
pub const DEFAULT_MAP_CHANGE_TICKS: u64 = 10;
pub const DEFAULT_GOAL_RETRY_TICKS: u64 = 2;
pub const DEFAULT_RESYNC_DEBOUNCE_TICKS: u64 = 5;
pub const DEFAULT_PORTAL_GUARD_TICKS: u64 = millis_to_ticks(2_000);
pub const DEFAULT_INSTRUCTIONS_GUARD_TICKS: u64 = millis_to_ticks(3_000);
pub const DEFAULT_SESSION_GUARD_TICKS: u64 = millis_to_ticks(3_000);
pub const DEFAULT_CHUNK_POLL_TICKS: u64 = 1;
pub const DEFAULT_CHUNK_POLL_ATTEMPTS: u32 = 20;
pub const DEFAULT_BLIND_MAP_HOLD_TICKS: u64 = 200;
// Pathing across the widest map takes well under this; past it the goal is
// treated as unreachable.
pub const DEFAULT_NAV_TIMEOUT_TICKS: u64 = 600;
pub const DEFAULT_ALIGN_WAIT_TICKS: u64 = 3;
// Empirically tuned against the countdown: each block of offset from the hole
// costs about this many ticks of run-up.
pub const DEFAULT_PRE_JUMP_TICKS_PER_BLOCK: u64 = 4;
pub const DEFAULT_PRE_JUMP_MIN_OFFSET: i32 = 2;
pub const DEFAULT_PRE_JUMP_WINDOW_SECS: u32 = 1;

pub const DEFAULT_RESET_KEY: &str = "key.mouse.right";
pub const DEFAULT_RESET_ITEM: &str = "minecraft:redstone";
pub const DEFAULT_PLAY_COMMAND: &str = "/play arcade_dropper";
pub const DEFAULT_MENU_SCREEN: &str = "Game Menu";

/// User-toggleable switches persisted in `droppy.json`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub auto_play: bool,
    pub auto_jump: bool,
    pub pre_jump: bool,
    pub verbose: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_play: true,
            auto_jump: true,
            pre_jump: true,
            verbose: false,
        }
    }
}

impl Settings {
    pub fn get(&self, setting: Setting) -> bool {
        match setting {
            Setting::AutoPlay => self.auto_play,
            Setting::AutoJump => self.auto_jump,
            Setting::PreJump => self.pre_jump,
            Setting::Verbose => self.verbose,
        }
    }

    pub fn set(&mut self, setting: Setting, value: bool) {
        match setting {
            Setting::AutoPlay => self.auto_play = value,
            Setting::AutoJump => self.auto_jump = value,
            Setting::PreJump => self.pre_jump = value,
            Setting::Verbose => self.verbose = value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Setting {
    AutoPlay,
    AutoJump,
    PreJump,
    Verbose,
}

impl Setting {
    pub const ALL: [Setting; 4] = [
        Setting::AutoPlay,
        Setting::AutoJump,
        Setting::PreJump,
        Setting::Verbose,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Self::AutoPlay => "autoPlay",
            Self::AutoJump => "autoJump",
            Self::PreJump => "preJump",
            Self::Verbose => "verbose",
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Setting {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|setting| setting.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown setting '{s}'"))
    }
}

/// Shallow JSON object on disk. Reads fall back to writing the defaults once;
/// writes merge into whatever keys are already present.
#[derive(Clone, Debug)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        match self.read() {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!(
                    path = %self.path.display(),
                    "settings unreadable, writing defaults: {err:#}"
                );
                self.write_object(&to_object(&Settings::default())?)?;
                self.read().context("cannot get settings file")
            }
        }
    }

    pub fn set(&self, setting: Setting, value: bool) -> Result<Settings> {
        let mut object = match self.read_object() {
            Ok(object) => object,
            Err(_) => to_object(&Settings::default())?,
        };
        object.insert(setting.key().to_string(), Value::Bool(value));
        self.write_object(&object)?;
        self.read()
    }

    /// Flips a setting and returns its new value.
    pub fn toggle(&self, setting: Setting) -> Result<bool> {
        let current = self.load()?.get(setting);
        let updated = self.set(setting, !current)?;
        Ok(updated.get(setting))
    }

    fn read(&self) -> Result<Settings> {
        let object = self.read_object()?;
        serde_json::from_value(Value::Object(object))
            .with_context(|| format!("invalid settings in {}", self.path.display()))
    }

    fn read_object(&self) -> Result<Map<String, Value>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed reading {}", self.path.display()))?;
        let value: Value = serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", self.path.display()))?;
        match value {
            Value::Object(object) => Ok(object),
            other => Err(anyhow!(
                "settings file {} must hold an object, found {other}",
                self.path.display()
            )),
        }
    }

    fn write_object(&self, object: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed creating directory {}", parent.display()))?;
        }
        let encoded = serde_json::to_string_pretty(object)?;
        fs::write(&self.path, encoded)
            .with_context(|| format!("failed writing {}", self.path.display()))
    }
}

fn to_object(settings: &Settings) -> Result<Map<String, Value>> {
    match serde_json::to_value(settings)? {
        Value::Object(object) => Ok(object),
        _ => Err(anyhow!("settings did not serialize to an object")),
    }
}

/// Tick-scale delays and windows used by navigation and the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    pub settle_ticks: u64,
    pub resync_settle_ticks: u64,
    pub map_change_ticks: u64,
    pub goal_retry_ticks: u64,
    pub resync_debounce_ticks: u64,
    pub portal_guard_ticks: u64,
    pub instructions_guard_ticks: u64,
    pub session_guard_ticks: u64,
    pub chunk_poll_ticks: u64,
    pub chunk_poll_attempts: u32,
    /// How long a map forced by a blind jump ignores a disagreeing feed.
    pub blind_map_hold_ticks: u64,
    pub nav_timeout_ticks: u64,
    pub align_wait_ticks: u64,
    pub pre_jump_ticks_per_block: u64,
    pub pre_jump_min_offset: i32,
    pub pre_jump_window_secs: u32,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle_ticks: DEFAULT_SETTLE_TICKS,
            resync_settle_ticks: DEFAULT_RESYNC_SETTLE_TICKS,
            map_change_ticks: DEFAULT_MAP_CHANGE_TICKS,
            goal_retry_ticks: DEFAULT_GOAL_RETRY_TICKS,
            resync_debounce_ticks: DEFAULT_RESYNC_DEBOUNCE_TICKS,
            portal_guard_ticks: DEFAULT_PORTAL_GUARD_TICKS,
            instructions_guard_ticks: DEFAULT_INSTRUCTIONS_GUARD_TICKS,
            session_guard_ticks: DEFAULT_SESSION_GUARD_TICKS,
            chunk_poll_ticks: DEFAULT_CHUNK_POLL_TICKS,
            chunk_poll_attempts: DEFAULT_CHUNK_POLL_ATTEMPTS,
            blind_map_hold_ticks: DEFAULT_BLIND_MAP_HOLD_TICKS,
            nav_timeout_ticks: DEFAULT_NAV_TIMEOUT_TICKS,
            align_wait_ticks: DEFAULT_ALIGN_WAIT_TICKS,
            pre_jump_ticks_per_block: DEFAULT_PRE_JUMP_TICKS_PER_BLOCK,
            pre_jump_min_offset: DEFAULT_PRE_JUMP_MIN_OFFSET,
            pre_jump_window_secs: DEFAULT_PRE_JUMP_WINDOW_SECS,
        }
    }
}

/// Process-wide configuration, loaded once at start.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub home: PathBuf,
    pub timings: Timings,
    /// Reroute to the nearest vantage point with a saved macro when the current
    /// one has none.
    pub fallback_to_nearest: bool,
    pub suppress_look_input: bool,
    pub reset_key: String,
    pub reset_item: String,
    pub play_command: String,
    pub menu_screen: String,
}

impl RuntimeConfig {
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            timings: Timings::default(),
            fallback_to_nearest: true,
            suppress_look_input: true,
            reset_key: DEFAULT_RESET_KEY.to_string(),
            reset_item: DEFAULT_RESET_ITEM.to_string(),
            play_command: DEFAULT_PLAY_COMMAND.to_string(),
            menu_screen: DEFAULT_MENU_SCREEN.to_string(),
        }
    }

    pub fn from_env() -> Self {
        let home = env::var("DROPPY_HOME")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::with_home(home);
        config.timings.nav_timeout_ticks =
            read_env_u64("DROPPY_NAV_TIMEOUT_TICKS", DEFAULT_NAV_TIMEOUT_TICKS);
        config.timings.resync_debounce_ticks =
            read_env_u64("DROPPY_RESYNC_DEBOUNCE_TICKS", DEFAULT_RESYNC_DEBOUNCE_TICKS);
        config.timings.chunk_poll_attempts =
            read_env_u32("DROPPY_CHUNK_POLL_ATTEMPTS", DEFAULT_CHUNK_POLL_ATTEMPTS);
        config.suppress_look_input = read_env_bool("DROPPY_SUPPRESS_LOOK", true);
        config.fallback_to_nearest = read_env_bool("DROPPY_FALLBACK_NEAREST", true);
        config
    }

    pub fn settings_path(&self) -> PathBuf {
        self.home.join(SETTINGS_FILE)
    }

    pub fn macro_dir(&self) -> PathBuf {
        self.home.join(MACRO_DIR)
    }
}

pub fn read_env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub fn read_env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

pub fn read_env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_initialized_with_defaults() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let file = SettingsFile::new(tmp.path().join("nested").join(SETTINGS_FILE));

        let settings = file.load()?;
        assert_eq!(settings, Settings::default());
        assert!(file.path().exists());

        let raw: Value = serde_json::from_str(&fs::read_to_string(file.path())?)?;
        assert_eq!(raw["autoJump"], Value::Bool(true));
        assert_eq!(raw["verbose"], Value::Bool(false));
        Ok(())
    }

    #[test]
    fn corrupt_file_is_replaced_by_defaults() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json")?;

        let settings = SettingsFile::new(&path).load()?;
        assert_eq!(settings, Settings::default());
        Ok(())
    }

    #[test]
    fn toggle_persists_and_keeps_foreign_keys() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"autoJump": true, "theme": "dark"}"#)?;
        let file = SettingsFile::new(&path);

        assert!(!file.toggle(Setting::AutoJump)?);
        assert!(file.toggle(Setting::Verbose)?);

        let settings = file.load()?;
        assert!(!settings.auto_jump);
        assert!(settings.verbose);
        // Keys missing from the file fall back to their defaults.
        assert!(settings.pre_jump);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(raw["theme"], Value::String("dark".to_string()));
        Ok(())
    }

    #[test]
    fn setting_names_round_trip_through_from_str() {
        for setting in Setting::ALL {
            assert_eq!(setting.key().parse::<Setting>(), Ok(setting));
        }
        assert_eq!("AUTOPLAY".parse::<Setting>(), Ok(Setting::AutoPlay));
        assert!("sound".parse::<Setting>().is_err());
    }

    #[test]
    fn runtime_paths_hang_off_home() {
        let config = RuntimeConfig::with_home("/tmp/droppy-home");
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/droppy-home/droppy.json"));
        assert_eq!(config.macro_dir(), PathBuf::from("/tmp/droppy-home/macros"));
    }
}
