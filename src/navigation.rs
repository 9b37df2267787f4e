//! Moves the player onto a vantage point: pathfinding goal, arrival polling,
//! settle delay, sub-block alignment, final facing.
//!
//! The pass/fail logic of the minigame is sensitive to where inside a block the
//! player stands, and the pathfinder only gets within a block. Alignment closes
//! the gap with single-tick forward pulses of known minimum length.

use std::collections::VecDeque;

use crate::config::Timings;
use crate::error::DroppyError;
use crate::geometry::{self, BlockPos, Direction, MapProfile, Vec3};
use crate::host::Host;
use crate::trace::MovementKey;

/// Shortest distance a single forward pulse moves the player.
pub const MIN_MOVEMENT_PER_TICK: f64 = 0.21;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Alignment {
    pub steps_x: u32,
    pub steps_z: u32,
    pub toward_x: Direction,
    pub toward_z: Direction,
}

impl Alignment {
    pub fn measure(player: Vec3) -> Self {
        let center_x = player.x.floor() + 0.5;
        let center_z = player.z.floor() + 0.5;
        Self {
            steps_x: ((center_x - player.x).abs() / MIN_MOVEMENT_PER_TICK).floor() as u32,
            steps_z: ((center_z - player.z).abs() / MIN_MOVEMENT_PER_TICK).floor() as u32,
            toward_x: if center_x > player.x {
                Direction::East
            } else {
                Direction::West
            },
            toward_z: if center_z > player.z {
                Direction::South
            } else {
                Direction::North
            },
        }
    }

    pub fn is_needed(&self) -> bool {
        self.steps_x > 0 || self.steps_z > 0
    }
}

pub fn requires_alignment(player: Vec3) -> bool {
    Alignment::measure(player).is_needed()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AlignOp {
    /// Instant; does not consume a tick.
    Face(Direction),
    Press,
    Release,
    Wait,
}

fn plan_alignment(alignment: Alignment, wait_ticks: u64) -> VecDeque<AlignOp> {
    let mut ops = VecDeque::new();
    for (steps, toward) in [
        (alignment.steps_x, alignment.toward_x),
        (alignment.steps_z, alignment.toward_z),
    ] {
        if steps == 0 {
            continue;
        }
        ops.push_back(AlignOp::Face(toward));
        for _ in 0..steps {
            ops.push_back(AlignOp::Press);
            ops.push_back(AlignOp::Release);
            // The release tick counts toward the pause.
            let pause = wait_ticks.saturating_sub(1) as usize;
            ops.extend(std::iter::repeat(AlignOp::Wait).take(pause));
        }
    }
    ops
}

#[derive(Debug)]
pub enum NavEvent<T> {
    /// Standing aligned on the vantage point and facing its orientation.
    Arrived { direction: Direction, then: T },
    Unreachable { error: DroppyError, then: T },
}

#[derive(Debug)]
enum NavPhase<T> {
    Idle,
    Pathing {
        direction: Direction,
        goal: BlockPos,
        raised: bool,
        waited: u64,
        then: T,
    },
    Settling {
        direction: Direction,
        remaining: u64,
        then: T,
    },
    Aligning {
        direction: Direction,
        ops: VecDeque<AlignOp>,
        then: T,
    },
}

impl<T> Default for NavPhase<T> {
    fn default() -> Self {
        NavPhase::Idle
    }
}

/// Carries a caller-supplied continuation `T` that is handed back on arrival.
#[derive(Debug)]
pub struct NavigationController<T> {
    phase: NavPhase<T>,
    settle_ticks: u64,
    timeout_ticks: u64,
    align_wait_ticks: u64,
}

impl<T> NavigationController<T> {
    pub fn new(timings: &Timings) -> Self {
        Self {
            phase: NavPhase::Idle,
            settle_ticks: timings.settle_ticks,
            timeout_ticks: timings.nav_timeout_ticks,
            align_wait_ticks: timings.align_wait_ticks,
        }
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, NavPhase::Idle)
    }

    /// Sets a pathfinding goal on `target`, or on the nearest resolved vantage
    /// point when no target is given. Returns false when no vantage point could
    /// be resolved; arrival is reported later through [`Self::tick`].
    pub fn go_to<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        profile: &MapProfile,
        target: Option<(Direction, BlockPos)>,
        then: T,
    ) -> bool {
        let target = match target {
            Some(target) => Some(target),
            None => geometry::resolve_vantage_points(&*host, host.position(), profile)
                .and_then(|points| geometry::nearest(&points, host.position(), |_| true)),
        };
        let Some((direction, pos)) = target else {
            tracing::warn!(map = %profile.name, "cannot find vantage points");
            return false;
        };

        self.cancel(host);
        let raised = profile.raised_goal(direction);
        let goal = if raised { pos.offset(0, 1, 0) } else { pos };
        host.set_goal(goal);
        tracing::debug!(%direction, %goal, "pathing to vantage point");
        self.phase = NavPhase::Pathing {
            direction,
            goal,
            raised,
            waited: 0,
            then,
        };
        true
    }

    /// Centers the player in their block, then faces `direction`'s vantage
    /// orientation and hands back `then`.
    pub fn align<H: Host + ?Sized>(&mut self, host: &mut H, direction: Direction, then: T) {
        self.cancel(host);
        let ops = plan_alignment(Alignment::measure(host.position()), self.align_wait_ticks);
        self.phase = NavPhase::Aligning {
            direction,
            ops,
            then,
        };
    }

    /// Drops any in-flight navigation without reporting it.
    pub fn cancel<H: Host + ?Sized>(&mut self, host: &mut H) {
        match std::mem::take(&mut self.phase) {
            NavPhase::Idle => {}
            NavPhase::Pathing { .. } => host.clear_goal(),
            NavPhase::Settling { .. } => {}
            NavPhase::Aligning { .. } => host.set_key(MovementKey::Forward, false),
        }
    }

    pub fn tick<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<NavEvent<T>> {
        let phase = std::mem::take(&mut self.phase);
        let (next, event) = self.step(host, phase);
        self.phase = next;
        event
    }

    fn step<H: Host + ?Sized>(
        &self,
        host: &mut H,
        phase: NavPhase<T>,
    ) -> (NavPhase<T>, Option<NavEvent<T>>) {
        match phase {
            NavPhase::Idle => (NavPhase::Idle, None),
            NavPhase::Pathing {
                direction,
                goal,
                raised,
                waited,
                then,
            } => {
                let mut probe = host.position().floor();
                if raised {
                    probe = probe.offset(0, 1, 0);
                }
                if host.is_in_goal(probe) {
                    host.clear_goal();
                    return (
                        NavPhase::Settling {
                            direction,
                            remaining: self.settle_ticks,
                            then,
                        },
                        None,
                    );
                }

                let waited = waited + 1;
                if waited >= self.timeout_ticks {
                    host.clear_goal();
                    tracing::warn!(%goal, waited, "vantage point unreachable");
                    return (
                        NavPhase::Idle,
                        Some(NavEvent::Unreachable {
                            error: DroppyError::NavigationUnreachable {
                                goal,
                                waited_ticks: waited,
                            },
                            then,
                        }),
                    );
                }
                (
                    NavPhase::Pathing {
                        direction,
                        goal,
                        raised,
                        waited,
                        then,
                    },
                    None,
                )
            }
            NavPhase::Settling {
                direction,
                remaining,
                then,
            } => {
                if remaining > 1 {
                    return (
                        NavPhase::Settling {
                            direction,
                            remaining: remaining - 1,
                            then,
                        },
                        None,
                    );
                }
                let alignment = Alignment::measure(host.position());
                let ops = plan_alignment(alignment, self.align_wait_ticks);
                self.step(
                    host,
                    NavPhase::Aligning {
                        direction,
                        ops,
                        then,
                    },
                )
            }
            NavPhase::Aligning {
                direction,
                mut ops,
                then,
            } => {
                while let Some(op) = ops.pop_front() {
                    match op {
                        AlignOp::Face(toward) => host.set_look(toward.facing_look()),
                        AlignOp::Press => host.set_key(MovementKey::Forward, true),
                        AlignOp::Release => host.set_key(MovementKey::Forward, false),
                        AlignOp::Wait => {}
                    }
                    if !matches!(op, AlignOp::Face(_)) {
                        return (
                            NavPhase::Aligning {
                                direction,
                                ops,
                                then,
                            },
                            None,
                        );
                    }
                }
                host.set_look(direction.vantage_look());
                tracing::debug!(%direction, "arrived at vantage point");
                (NavPhase::Idle, Some(NavEvent::Arrived { direction, then }))
            }
        }
    }
}
