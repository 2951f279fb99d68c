use serde::{Deserialize, Serialize};

use core::fmt;

/// A piece that has not entered the board yet.
pub const BASE: i8 = -1;
/// Track position a piece enters the ring at after rolling a six.
pub const ENTRY: i8 = 0;
/// Final track position; a piece here has finished.
pub const HOME: i8 = 57;
/// Number of cells on the shared ring.
pub const RING_LEN: i8 = 52;
/// Highest track position that still counts for shared-ring collisions.
pub const CAPTURE_LAST: i8 = 51;

/// Global ring cells where pieces can never be captured.
pub const SAFE_CELLS: [i8; 8] = [0, 8, 13, 21, 26, 34, 39, 47];

/// Turn-order colors, assigned to players in this fixed order.
pub const COLORS: [Color; 4] = [Color::Red, Color::Green, Color::Yellow, Color::Blue];

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Color {
    Red,
    Green,
    Yellow,
    Blue,
}

impl Color {
    /// Global ring cell where this color's track position 0 lies.
    pub fn offset(self) -> i8 {
        match self {
            Color::Red => 0,
            Color::Green => 13,
            Color::Yellow => 26,
            Color::Blue => 39,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let color = match *self {
            Color::Red => "RED",
            Color::Green => "GREEN",
            Color::Yellow => "YELLOW",
            Color::Blue => "BLUE",
        };
        write!(f, "{}", color)
    }
}

/// Maps a color-relative track position onto the shared ring.
///
/// Only meaningful for ring coordinates; base and home-stretch positions
/// never take part in collision checks.
pub fn global_position(color: Color, track_pos: i8) -> i8 {
    (track_pos + color.offset()) % RING_LEN
}

/// Safe cells are immune to capture no matter how many pieces sit on them.
pub fn is_safe_cell(global_pos: i8) -> bool {
    SAFE_CELLS.contains(&global_pos)
}
