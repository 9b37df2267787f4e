use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use droppy_autopilot::config::{RuntimeConfig, Setting, SettingsFile};
use droppy_autopilot::geometry::{self, BlockPos, Direction, MapProfiles, Vec3, VantageStrategy};
use droppy_autopilot::host::PlayerControl;
use droppy_autopilot::orchestrator::{Event, JumpOrchestrator};
use droppy_autopilot::sim::SimHost;
use droppy_autopilot::store::MacroStore;
use droppy_autopilot::trace::{Frame, InputTrace, KeySet, MovementKey};

#[derive(Parser, Debug)]
#[command(name = "droppy")]
#[command(
    about = "Dropper autopilot: settings, stored macros, vantage geometry and a dry-run simulator"
)]
struct Cli {
    /// Directory holding droppy.json and macros/ (defaults to $DROPPY_HOME or .)
    #[arg(long)]
    home: Option<PathBuf>,
    /// JSON file with per-map profile overrides
    #[arg(long)]
    profiles: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect or flip persisted settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage recorded macros
    Macros {
        #[command(subcommand)]
        action: MacroAction,
    },
    /// Print the vantage points of a map around a known hole center
    Vantage {
        #[arg(long)]
        map: String,
        /// Hole center as x,y,z
        #[arg(long)]
        center: String,
    },
    /// Run a scripted drop against the in-memory client
    Simulate {
        #[arg(long, default_value = "Drainage")]
        map: String,
        /// Player spawn as x,y,z (block-relative to a hole centered at 0,64,0)
        #[arg(long, default_value = "8.3,64,3.6")]
        spawn: String,
        #[arg(long, default_value_t = 400)]
        ticks: u64,
        /// Save a generated run-up macro for this direction before starting
        #[arg(long, value_enum)]
        seed_macro: Option<CliDirection>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    Show,
    Toggle {
        #[arg(value_enum)]
        setting: CliSetting,
    },
}

#[derive(Subcommand, Debug)]
enum MacroAction {
    List {
        #[arg(long)]
        map: Option<String>,
    },
    Show {
        #[arg(long)]
        map: String,
        #[arg(long, value_enum)]
        direction: CliDirection,
    },
    /// Re-trim every stored macro
    Prune,
    Delete {
        #[arg(long)]
        map: String,
        #[arg(long, value_enum)]
        direction: CliDirection,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliDirection {
    North,
    East,
    South,
    West,
}

impl From<CliDirection> for Direction {
    fn from(value: CliDirection) -> Self {
        match value {
            CliDirection::North => Direction::North,
            CliDirection::East => Direction::East,
            CliDirection::South => Direction::South,
            CliDirection::West => Direction::West,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum CliSetting {
    AutoPlay,
    AutoJump,
    PreJump,
    Verbose,
}

impl From<CliSetting> for Setting {
    fn from(value: CliSetting) -> Self {
        match value {
            CliSetting::AutoPlay => Setting::AutoPlay,
            CliSetting::AutoJump => Setting::AutoJump,
            CliSetting::PreJump => Setting::PreJump,
            CliSetting::Verbose => Setting::Verbose,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let Cli {
        home,
        profiles,
        command,
    } = Cli::parse();

    let mut config = RuntimeConfig::from_env();
    if let Some(home) = home {
        config.home = home;
    }
    let mut map_profiles = MapProfiles::builtin();
    if let Some(path) = profiles {
        let applied = map_profiles.load_overrides(&path)?;
        tracing::info!(path = %path.display(), applied, "loaded map profile overrides");
    }

    match command {
        Commands::Config { action } => {
            let file = SettingsFile::new(config.settings_path());
            match action {
                ConfigAction::Show => {
                    let settings = file.load()?;
                    println!("file={}", file.path().display());
                    for setting in Setting::ALL {
                        println!("{setting}={}", settings.get(setting));
                    }
                }
                ConfigAction::Toggle { setting } => {
                    let setting: Setting = setting.into();
                    let value = file.toggle(setting)?;
                    println!("{setting}={value}");
                }
            }
        }
        Commands::Macros { action } => {
            let store = MacroStore::new(config.macro_dir());
            run_macro_action(&store, action)?;
        }
        Commands::Vantage { map, center } => {
            let profile = map_profiles.get(&map);
            if profile.strategy == VantageStrategy::TorchRow {
                return Err(anyhow!(
                    "{map} places vantage points by torches; they cannot be derived from a center"
                ));
            }
            let [x, y, z] = parse_triple(&center)?;
            let center = BlockPos::new(x as i32, y as i32, z as i32);
            println!("map={map}");
            println!("center={center}");
            for (direction, pos) in geometry::points_around(center, &profile.offsets) {
                let look = direction.vantage_look();
                println!("{direction}={pos} yaw={} pitch={}", look.yaw, look.pitch);
            }
        }
        Commands::Simulate {
            map,
            spawn,
            ticks,
            seed_macro,
        } => {
            let [x, y, z] = parse_triple(&spawn)?;
            simulate(
                config,
                map_profiles,
                &map,
                Vec3::new(x, y, z),
                ticks,
                seed_macro.map(Direction::from),
            )?;
        }
    }

    Ok(())
}

fn run_macro_action(store: &MacroStore, action: MacroAction) -> Result<()> {
    match action {
        MacroAction::List { map } => {
            let maps = match map {
                Some(map) => vec![map],
                None => store.maps()?,
            };
            for map in maps {
                let directions: Vec<&str> = store
                    .saved_directions(&map)?
                    .into_iter()
                    .map(Direction::as_str)
                    .collect();
                println!("{map:16} {}", directions.join(","));
            }
        }
        MacroAction::Show { map, direction } => {
            let direction: Direction = direction.into();
            let trace = store
                .load(&map, direction)?
                .ok_or_else(|| anyhow!("no macro saved for {map}/{direction}"))?;
            println!("path={}", store.path_for(&map, direction)?.display());
            println!("{}", serde_json::to_string_pretty(&trace.stats())?);
        }
        MacroAction::Prune => {
            let report = store.prune_all()?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        MacroAction::Delete { map, direction } => {
            let direction: Direction = direction.into();
            let removed = store.delete(&map, direction)?;
            println!("removed={removed}");
        }
    }
    Ok(())
}

fn simulate(
    config: RuntimeConfig,
    profiles: MapProfiles,
    map: &str,
    spawn: Vec3,
    ticks: u64,
    seed_macro: Option<Direction>,
) -> Result<()> {
    let rim = BlockPos::new(0, 64, 0);
    let mut host = SimHost::drop_arena(rim, spawn);
    host.set_map(Some(map), None, false);

    if let Some(direction) = seed_macro {
        let store = MacroStore::new(config.macro_dir());
        let path = store.save(map, direction, &run_up_trace(direction))?;
        println!("seeded={}", path.display());
    }

    let mut pilot = JumpOrchestrator::new(config, profiles);
    pilot.announce(&mut host);

    let step = |pilot: &mut JumpOrchestrator, host: &mut SimHost| {
        pilot.handle(host, Event::Tick);
        host.step();
    };
    for _ in 0..5 {
        step(&mut pilot, &mut host);
    }
    pilot.handle(&mut host, Event::Chat("DROP!".to_string()));

    let mut started_at = None;
    let mut finished_at = None;
    for _ in 0..ticks {
        step(&mut pilot, &mut host);
        match (pilot.engine().is_running(), started_at) {
            (true, None) => started_at = Some(pilot.now()),
            (false, Some(_)) if finished_at.is_none() => finished_at = Some(pilot.now()),
            _ => {}
        }
        if finished_at.is_some() {
            break;
        }
    }

    for line in host.status_lines() {
        println!("status={line}");
    }
    for goal in host.goals_set() {
        println!("goal={goal}");
    }
    let position = host.position();
    println!("map={map}");
    println!("ticks={}", pilot.now());
    println!(
        "macro_started={}",
        started_at.map_or_else(|| "never".to_string(), |tick| tick.to_string())
    );
    println!(
        "macro_finished={}",
        finished_at.map_or_else(|| "never".to_string(), |tick| tick.to_string())
    );
    println!(
        "position={:.3},{:.3},{:.3}",
        position.x, position.y, position.z
    );
    Ok(())
}

/// Short sprint toward the hole ending in a jump, facing the vantage orientation.
fn run_up_trace(direction: Direction) -> InputTrace {
    let look = direction.vantage_look();
    let sprint: KeySet = [MovementKey::Forward, MovementKey::Sprint].into_iter().collect();
    let leap: KeySet = [MovementKey::Forward, MovementKey::Sprint, MovementKey::Jump]
        .into_iter()
        .collect();
    let mut frames = vec![Frame::new(KeySet::EMPTY, look)];
    frames.extend(std::iter::repeat(Frame::new(sprint, look)).take(6));
    frames.extend(std::iter::repeat(Frame::new(leap, look)).take(2));
    InputTrace::from_frames(frames)
}

fn parse_triple(raw: &str) -> Result<[f64; 3]> {
    let parts = raw
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .with_context(|| format!("invalid coordinate '{part}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok([*x, *y, *z]),
        _ => Err(anyhow!("expected x,y,z but got '{raw}'")),
    }
}
