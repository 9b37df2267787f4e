//! Extracts map progress from the sidebar scoreboard.
//!
//! The sidebar lists every map of the session in play order, each prefixed with a
//! status marker (`✔` done, `✘` failed, `»` upcoming). The active map carries a
//! trailing `◀`. Outside the map list the panel may show a bare `Map: <name>` field.

use std::sync::LazyLock;

use regex::Regex;

use crate::host::MapInfo;

static FORMAT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[§&][0-9a-fk-orA-FK-OR]").expect("valid format code regex"));

static ACTIVE_MAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[✘✔»] ([\w\s\-']+) ◀").expect("valid active map regex"));

static LISTED_MAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[✘✔»] ([\w\s\-']+)").expect("valid listed map regex"));

static MAP_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Map: ([\w\s\-']+)").expect("valid map field regex"));

pub const TARGET_GAME_TITLE: &str = "DROPPER";

pub fn strip_formatting(line: &str) -> String {
    FORMAT_CODE_RE.replace_all(line, "").into_owned()
}

/// Map names are stored with underscores in place of whitespace, and any quotes
/// from command input are dropped.
pub fn normalize_map_name(raw: &str) -> String {
    raw.replace('"', "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

pub fn is_target_title(title: &str) -> bool {
    strip_formatting(title).trim() == TARGET_GAME_TITLE
}

pub fn parse_map_info<S: AsRef<str>>(lines: &[S]) -> MapInfo {
    let mut listed = Vec::new();
    let mut active_index = None;
    let mut field_map = None;

    for raw in lines {
        let line = strip_formatting(raw.as_ref());
        if let Some(name) = ACTIVE_MAP_RE.captures(&line).and_then(|caps| caps.get(1)) {
            active_index = Some(listed.len());
            listed.push(normalize_map_name(name.as_str()));
        } else if let Some(name) = LISTED_MAP_RE.captures(&line).and_then(|caps| caps.get(1)) {
            listed.push(normalize_map_name(name.as_str()));
        } else if field_map.is_none() {
            field_map = MAP_FIELD_RE
                .captures(&line)
                .and_then(|caps| caps.get(1))
                .map(|name| normalize_map_name(name.as_str()));
        }
    }

    match active_index {
        Some(index) => {
            let active = listed[index].clone();
            let next = listed.get(index + 1).cloned();
            let others = listed
                .into_iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, name)| name)
                .collect();
            MapInfo {
                active: Some(active),
                others,
                next,
                is_first_map: index == 0,
            }
        }
        None => MapInfo {
            active: field_map.filter(|name| !name.is_empty()),
            others: listed,
            next: None,
            is_first_map: false,
        },
    }
}
