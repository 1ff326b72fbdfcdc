//! Console input turned into key codes
//!
//! Both binaries run headless and read commands from stdin, one per line:
//! `+thrust` presses a key, `-thrust` releases it, a bare `fire` taps it, and
//! `p`, `r`, `q` pause, reset and quit. Key state is tracked so a repeated
//! press or a stray release never produces a second event.

use crate::{KEY_FIRE, KEY_LEFT, KEY_MISSILE, KEY_RIGHT, KEY_STATION, KEY_THRUST};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Positive for press, negative for release
    Key(i32),
    TogglePause,
    Reset,
    Quit,
}

/// Tracks held keys and emits only edges
#[derive(Debug, Default)]
pub struct InputManager {
    held: BTreeSet<i32>,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interprets one console line
    pub fn parse_line(&mut self, line: &str) -> Vec<Command> {
        let line = line.trim().to_ascii_lowercase();
        match line.as_str() {
            "" => Vec::new(),
            "p" | "pause" => vec![Command::TogglePause],
            "r" | "reset" => vec![Command::Reset],
            "q" | "quit" => vec![Command::Quit],
            _ => {
                if let Some(name) = line.strip_prefix('+') {
                    key_code(name).and_then(|key| self.press(key)).into_iter().collect()
                } else if let Some(name) = line.strip_prefix('-') {
                    key_code(name).and_then(|key| self.release(key)).into_iter().collect()
                } else if let Some(key) = key_code(&line) {
                    // A held key stays held.
                    if self.is_held(key) {
                        Vec::new()
                    } else {
                        vec![Command::Key(key), Command::Key(-key)]
                    }
                } else {
                    Vec::new()
                }
            }
        }
    }

    /// Releases everything still held, e.g. before quitting
    pub fn release_all(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.held)
            .into_iter()
            .map(|key| Command::Key(-key))
            .collect()
    }

    pub fn is_held(&self, key: i32) -> bool {
        self.held.contains(&key)
    }

    fn press(&mut self, key: i32) -> Option<Command> {
        self.held.insert(key).then_some(Command::Key(key))
    }

    fn release(&mut self, key: i32) -> Option<Command> {
        self.held.remove(&key).then_some(Command::Key(-key))
    }
}

/// Maps a key name to its code
pub fn key_code(name: &str) -> Option<i32> {
    match name.trim() {
        "left" | "a" => Some(KEY_LEFT),
        "right" | "d" => Some(KEY_RIGHT),
        "thrust" | "up" | "w" => Some(KEY_THRUST),
        "fire" | "space" => Some(KEY_FIRE),
        "missile" | "m" => Some(KEY_MISSILE),
        "station" | "s" => Some(KEY_STATION),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_and_release_edges() {
        let mut input = InputManager::new();

        assert_eq!(input.parse_line("+thrust"), vec![Command::Key(KEY_THRUST)]);
        assert!(input.parse_line("+up").is_empty());
        assert!(input.is_held(KEY_THRUST));

        assert_eq!(input.parse_line("-w"), vec![Command::Key(-KEY_THRUST)]);
        assert!(input.parse_line("-thrust").is_empty());
        assert!(!input.is_held(KEY_THRUST));
    }

    #[test]
    fn test_tap_presses_and_releases() {
        let mut input = InputManager::new();
        assert_eq!(
            input.parse_line("fire"),
            vec![Command::Key(KEY_FIRE), Command::Key(-KEY_FIRE)]
        );
        assert!(!input.is_held(KEY_FIRE));
    }

    #[test]
    fn test_tap_on_held_key_is_ignored() {
        let mut input = InputManager::new();
        input.parse_line("+left");
        assert!(input.parse_line("left").is_empty());
        assert!(input.is_held(KEY_LEFT));
    }

    #[test]
    fn test_control_commands() {
        let mut input = InputManager::new();
        assert_eq!(input.parse_line(" P "), vec![Command::TogglePause]);
        assert_eq!(input.parse_line("reset"), vec![Command::Reset]);
        assert_eq!(input.parse_line("q"), vec![Command::Quit]);
        assert!(input.parse_line("").is_empty());
        assert!(input.parse_line("+jump").is_empty());
    }

    #[test]
    fn test_release_all() {
        let mut input = InputManager::new();
        input.parse_line("+left");
        input.parse_line("+fire");

        let released = input.release_all();
        assert_eq!(
            released,
            vec![Command::Key(-KEY_FIRE), Command::Key(-KEY_LEFT)]
        );
        assert!(input.release_all().is_empty());
    }
}
