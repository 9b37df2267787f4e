//! Classifies incoming chat lines into the cues the orchestrator reacts to.

use std::sync::LazyLock;

use regex::Regex;

use crate::scoreboard::strip_formatting;

static PLAYER_JOINED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\w]+ has joined \(\d+/\d+\)!$").expect("valid join regex")
});

static DOORS_OPENING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^The doors? (?:will )?opens? in (\d+) seconds?!?$").expect("valid door regex")
});

const DROP_LINE: &str = "DROP!";
const INSTRUCTIONS_PREFIX: &str = "Drop to the bottom of the map and";
const FINISHED_PREFIX: &str = "You finished all maps in ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatCue {
    /// The round's doors dropped; jump now.
    Drop,
    /// Lobby join announcement: a new session is forming.
    PlayerJoined,
    /// Start-of-game instructions, sent while players are teleported in.
    Instructions,
    /// Countdown before the doors open.
    DoorsOpening { seconds: u32 },
    FinishedAllMaps,
}

pub fn classify(raw: &str) -> Option<ChatCue> {
    let line = strip_formatting(raw);
    let line = line.trim();

    if line == DROP_LINE {
        return Some(ChatCue::Drop);
    }
    if PLAYER_JOINED_RE.is_match(line) {
        return Some(ChatCue::PlayerJoined);
    }
    if line.contains(INSTRUCTIONS_PREFIX) {
        return Some(ChatCue::Instructions);
    }
    if line.starts_with(FINISHED_PREFIX) {
        return Some(ChatCue::FinishedAllMaps);
    }
    DOORS_OPENING_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|seconds| seconds.as_str().parse().ok())
        .map(|seconds| ChatCue::DoorsOpening { seconds })
}
