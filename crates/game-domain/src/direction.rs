//! Exit direction vocabulary.
//!
//! Directions are cardinals plus the vertical pair plus free-text strings
//! ("climb ladder", "through the crack"). Free text is kept as written;
//! normalization only lowercases and trims so duplicate exits collapse.
//! Reversal uses cardinal opposites and a token-substitution table for
//! natural-language directions.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
    /// Free-text direction, stored as written by the generator.
    Other(String),
}

/// Reversal pairs for natural-language directions. "through" is its own
/// reverse and is handled by the identity fallthrough.
const REVERSE_TOKENS: &[(&str, &str)] = &[
    ("climb", "descend"),
    ("descend", "climb"),
    ("enter", "exit"),
    ("exit", "enter"),
    ("into", "out of"),
    ("out of", "into"),
    ("ascend", "descend"),
];

/// Tokens that make a free-text direction count as vertical for the
/// exit linker (vertical placeholders spawn a new subzone).
const VERTICAL_TOKENS: &[&str] = &["climb", "descend", "stairs", "ladder", "up", "down"];

impl Direction {
    pub const CARDINALS: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn parse(s: &str) -> Direction {
        match s.trim().to_lowercase().as_str() {
            "north" | "n" => Direction::North,
            "south" | "s" => Direction::South,
            "east" | "e" => Direction::East,
            "west" | "w" => Direction::West,
            "up" | "u" => Direction::Up,
            "down" | "d" => Direction::Down,
            other => Direction::Other(other.to_string()),
        }
    }

    /// Canonical lowercase form used for duplicate collapse and edge keys.
    pub fn normalized(&self) -> String {
        match self {
            Direction::North => "north".into(),
            Direction::South => "south".into(),
            Direction::East => "east".into(),
            Direction::West => "west".into(),
            Direction::Up => "up".into(),
            Direction::Down => "down".into(),
            Direction::Other(s) => s.trim().to_lowercase(),
        }
    }

    pub fn reverse(&self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::East => Direction::West,
            Direction::West => Direction::East,
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Other(s) => {
                let lowered = s.trim().to_lowercase();
                for (token, replacement) in REVERSE_TOKENS {
                    if lowered.contains(token) {
                        return Direction::Other(lowered.replacen(token, replacement, 1));
                    }
                }
                // Symmetric directions ("through the crack") reverse to themselves.
                Direction::Other(lowered)
            }
        }
    }

    /// Vertical exits spawn a new subzone rather than linking horizontally.
    pub fn is_vertical(&self) -> bool {
        match self {
            Direction::Up | Direction::Down => true,
            Direction::Other(s) => {
                let lowered = s.to_lowercase();
                VERTICAL_TOKENS.iter().any(|t| lowered.contains(t))
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.normalized())
    }
}

// Serialized as its normalized string so Direction works as a JSON map key
// (chunk adjacency maps).
impl Serialize for Direction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normalized())
    }
}

impl<'de> Deserialize<'de> for Direction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DirectionVisitor;
        impl<'de> Visitor<'de> for DirectionVisitor {
            type Value = Direction;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a direction string")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Direction, E> {
                Ok(Direction::parse(value))
            }
        }
        deserializer.deserialize_str(DirectionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_reversal_is_involutive() {
        for dir in Direction::CARDINALS {
            assert_eq!(dir.reverse().reverse(), dir);
        }
        assert_eq!(Direction::Up.reverse(), Direction::Down);
    }

    #[test]
    fn free_text_reversal_substitutes_tokens() {
        let climb = Direction::parse("climb the rusted ladder");
        assert_eq!(
            climb.reverse(),
            Direction::Other("descend the rusted ladder".into())
        );
        let through = Direction::parse("through the crack");
        assert_eq!(through.reverse(), through);
    }

    #[test]
    fn vertical_detection_covers_free_text() {
        assert!(Direction::Up.is_vertical());
        assert!(Direction::parse("climb ladder").is_vertical());
        assert!(Direction::parse("take the stairs").is_vertical());
        assert!(!Direction::North.is_vertical());
        assert!(!Direction::parse("through the arch").is_vertical());
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&Direction::North).unwrap();
        assert_eq!(json, "\"north\"");
        let back: Direction = serde_json::from_str("\"climb ladder\"").unwrap();
        assert_eq!(back, Direction::Other("climb ladder".into()));
    }
}
