//! Recorded input traces: one frame per game tick, each frame holding the set of
//! pressed movement bindings and the exact look angles.
//!
//! Stored traces use the on-disk layout `[["key.forward", "key.jump", yaw, pitch], ...]`:
//! binding names first, then yaw and pitch.

use serde::{Deserialize, Serialize};

use crate::geometry::Look;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MovementKey {
    Sprint,
    Sneak,
    Attack,
    Use,
    Left,
    Right,
    Forward,
    Back,
    Jump,
}

impl MovementKey {
    pub const ALL: [MovementKey; 9] = [
        MovementKey::Sprint,
        MovementKey::Sneak,
        MovementKey::Attack,
        MovementKey::Use,
        MovementKey::Left,
        MovementKey::Right,
        MovementKey::Forward,
        MovementKey::Back,
        MovementKey::Jump,
    ];

    pub fn binding(self) -> &'static str {
        match self {
            Self::Sprint => "key.sprint",
            Self::Sneak => "key.sneak",
            Self::Attack => "key.attack",
            Self::Use => "key.use",
            Self::Left => "key.left",
            Self::Right => "key.right",
            Self::Forward => "key.forward",
            Self::Back => "key.back",
            Self::Jump => "key.jump",
        }
    }

    pub fn from_binding(binding: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.binding() == binding)
    }

    #[inline]
    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Bitset of held movement keys.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct KeySet(u16);

impl KeySet {
    pub const EMPTY: KeySet = KeySet(0);

    #[inline]
    pub fn contains(self, key: MovementKey) -> bool {
        self.0 & key.bit() != 0
    }

    #[inline]
    pub fn insert(&mut self, key: MovementKey) {
        self.0 |= key.bit();
    }

    #[inline]
    pub fn remove(&mut self, key: MovementKey) {
        self.0 &= !key.bit();
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(self) -> impl Iterator<Item = MovementKey> {
        MovementKey::ALL.into_iter().filter(move |key| self.contains(*key))
    }
}

impl FromIterator<MovementKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = MovementKey>>(iter: I) -> Self {
        let mut set = KeySet::EMPTY;
        for key in iter {
            set.insert(key);
        }
        set
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FrameToken>", into = "Vec<FrameToken>")]
pub struct Frame {
    pub keys: KeySet,
    pub look: Look,
}

impl Frame {
    pub fn new(keys: KeySet, look: Look) -> Self {
        Self { keys, look }
    }

    /// A frame that only carries look angles.
    pub fn is_look_only(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum FrameToken {
    Binding(String),
    Angle(f32),
}

impl TryFrom<Vec<FrameToken>> for Frame {
    type Error = String;

    fn try_from(tokens: Vec<FrameToken>) -> Result<Self, Self::Error> {
        let [.., FrameToken::Angle(yaw), FrameToken::Angle(pitch)] = tokens.as_slice() else {
            return Err("frame must end with yaw and pitch".to_string());
        };
        let look = Look::new(*yaw, *pitch);

        let mut keys = KeySet::EMPTY;
        for token in &tokens[..tokens.len() - 2] {
            match token {
                FrameToken::Binding(name) => {
                    // Bindings outside the movement set are dropped, matching what
                    // the recorder would have sampled.
                    if let Some(key) = MovementKey::from_binding(name) {
                        keys.insert(key);
                    }
                }
                FrameToken::Angle(value) => {
                    return Err(format!("unexpected angle {value} before yaw/pitch"));
                }
            }
        }
        Ok(Frame { keys, look })
    }
}

impl From<Frame> for Vec<FrameToken> {
    fn from(frame: Frame) -> Self {
        let mut tokens: Vec<FrameToken> = frame
            .keys
            .iter()
            .map(|key| FrameToken::Binding(key.binding().to_string()))
            .collect();
        tokens.push(FrameToken::Angle(frame.look.yaw));
        tokens.push(FrameToken::Angle(frame.look.pitch));
        tokens
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputTrace {
    frames: Vec<Frame>,
}

impl InputTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops look-only frames at either end that repeat their inner neighbour.
    /// Those are dead time before the recorder saw the first key and after the
    /// player stopped moving. Each end is trimmed independently.
    pub fn trimmed(&self) -> InputTrace {
        let frames = &self.frames;
        if frames.is_empty() {
            return InputTrace::new();
        }

        let mut start = 0;
        let mut end = frames.len() - 1;
        while start < end && frames[start].is_look_only() && frames[start] == frames[start + 1] {
            start += 1;
        }
        while end > start && frames[end].is_look_only() && frames[end] == frames[end - 1] {
            end -= 1;
        }
        InputTrace::from_frames(frames[start..=end].to_vec())
    }

    pub fn stats(&self) -> TraceStats {
        let mut stats = TraceStats {
            frame_count: self.frames.len() as u32,
            ..TraceStats::default()
        };
        for frame in &self.frames {
            if !frame.keys.is_empty() {
                stats.action_frames += 1;
            }
            if frame.keys.contains(MovementKey::Forward) || frame.keys.contains(MovementKey::Back) {
                stats.walk_frames += 1;
            }
            if frame.keys.contains(MovementKey::Left) || frame.keys.contains(MovementKey::Right) {
                stats.strafe_frames += 1;
            }
            if frame.keys.contains(MovementKey::Jump) {
                stats.jump_frames += 1;
            }
            if frame.keys.contains(MovementKey::Sprint) {
                stats.sprint_frames += 1;
            }
        }
        stats
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TraceStats {
    pub frame_count: u32,
    pub action_frames: u32,
    pub walk_frames: u32,
    pub strafe_frames: u32,
    pub jump_frames: u32,
    pub sprint_frames: u32,
}
