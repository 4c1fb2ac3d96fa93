use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Discrete buttons available on a virtual game controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    X,
    Y,
    Start,
    Select,
}

impl Button {
    pub const ALL: [Button; 10] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::Start,
        Button::Select,
    ];

    /// Name used when the button is exposed to game scripts.
    pub fn name(self) -> &'static str {
        match self {
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::A => "a",
            Button::B => "b",
            Button::X => "x",
            Button::Y => "y",
            Button::Start => "start",
            Button::Select => "select",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let button = match lower.as_str() {
            "up" => Button::Up,
            "down" => Button::Down,
            "left" => Button::Left,
            "right" => Button::Right,
            "a" => Button::A,
            "b" => Button::B,
            "x" => Button::X,
            "y" => Button::Y,
            "start" | "enter" => Button::Start,
            "select" | "back" => Button::Select,
            _ => return None,
        };
        Some(button)
    }
}

/// Buttons currently held by one player.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controller {
    buttons: BTreeSet<Button>,
}

impl Controller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buttons<I>(buttons: I) -> Self
    where
        I: IntoIterator<Item = Button>,
    {
        Self {
            buttons: buttons.into_iter().collect(),
        }
    }

    pub fn press(&mut self, button: Button) {
        self.buttons.insert(button);
    }

    pub fn release(&mut self, button: Button) {
        self.buttons.remove(&button);
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons.contains(&button)
    }

    pub fn is_pressed_by_name(&self, name: &str) -> bool {
        Button::from_name(name).is_some_and(|button| self.is_pressed(button))
    }

    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        self.buttons.iter().copied()
    }

    pub fn clear(&mut self) {
        self.buttons.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_button_names() {
        assert_eq!(Button::from_name("Left"), Some(Button::Left));
        assert_eq!(Button::from_name("a"), Some(Button::A));
        assert_eq!(Button::from_name("Enter"), Some(Button::Start));
        assert_eq!(Button::from_name("jump"), None);
    }

    #[test]
    fn names_round_trip_for_every_button() {
        for button in Button::ALL {
            assert_eq!(Button::from_name(button.name()), Some(button));
        }
    }

    #[test]
    fn controller_tracks_buttons() {
        let mut controller = Controller::new();
        controller.press(Button::Right);
        assert!(controller.is_pressed_by_name("right"));
        assert!(!controller.is_pressed(Button::Left));
        controller.release(Button::Right);
        assert!(!controller.is_pressed_by_name("Right"));
    }

    #[test]
    fn serializes_as_lowercase_names() {
        let controller = Controller::with_buttons([Button::Start, Button::A]);
        let json = serde_json::to_string(&controller).unwrap();
        assert_eq!(json, r#"{"buttons":["a","start"]}"#);
    }
}
