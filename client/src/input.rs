//! Keyboard input mapped onto lanes

use macroquad::prelude::*;
use shared::LANE_COUNT;

/// Key bound to each lane, lane 1 first.
pub const LANE_KEYS: [KeyCode; LANE_COUNT] = [
    KeyCode::Q,
    KeyCode::W,
    KeyCode::E,
    KeyCode::R,
    KeyCode::O,
    KeyCode::P,
    KeyCode::LeftBracket,
    KeyCode::RightBracket,
];

pub const QUIT_KEY: KeyCode = KeyCode::Escape;

/// Label drawn under each lane.
pub const LANE_LABELS: [&str; LANE_COUNT] = ["Q", "W", "E", "R", "O", "P", "[", "]"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneEvent {
    Down(u8),
    Up(u8),
}

pub fn lane_for_key(key: KeyCode) -> Option<u8> {
    LANE_KEYS
        .iter()
        .position(|bound| *bound == key)
        .map(|index| index as u8 + 1)
}

/// Collects the lane edges and the quit request of one frame
#[derive(Debug, Default)]
pub struct InputManager {
    events: Vec<LaneEvent>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples the keyboard. Returns whether quit was requested and the lane
    /// presses and releases seen since the previous frame.
    pub fn update(&mut self) -> (bool, &[LaneEvent]) {
        self.events.clear();

        for key in LANE_KEYS {
            let Some(lane) = lane_for_key(key) else {
                continue;
            };
            if is_key_pressed(key) {
                self.events.push(LaneEvent::Down(lane));
            }
            if is_key_released(key) {
                self.events.push(LaneEvent::Up(lane));
            }
        }

        (is_key_pressed(QUIT_KEY), &self.events)
    }
}
