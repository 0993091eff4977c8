//! Color constants for the terminal user interface.

use ratatui::style::Color;

use crate::fields::DisplayStatus;

pub const DARK_GREEN: Color = Color::Rgb(0, 80, 0);
pub const GOLD: Color = Color::Rgb(255, 215, 0);
pub const DARK_RED: Color = Color::Rgb(114, 0, 0);
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);

pub fn status_color(status: DisplayStatus) -> Color {
    match status {
        DisplayStatus::Done => Color::DarkGray,
        DisplayStatus::Overdue => Color::LightRed,
        DisplayStatus::InProgress => GOLD,
        DisplayStatus::Pending => Color::White,
    }
}

/// Terminal color for a stored role color class such as `bg-blue-100 text-blue-700`.
pub fn role_color(class: &str) -> Color {
    let hue = class
        .split_whitespace()
        .find_map(|part| part.strip_prefix("text-"))
        .or_else(|| class.split_whitespace().find_map(|part| part.strip_prefix("bg-")))
        .and_then(|rest| rest.split('-').next())
        .unwrap_or("");
    match hue {
        "red" | "rose" => Color::LightRed,
        "orange" | "amber" | "yellow" => Color::Yellow,
        "green" | "emerald" | "lime" => Color::LightGreen,
        "teal" | "cyan" => Color::Cyan,
        "blue" | "sky" | "indigo" => Color::LightBlue,
        "purple" | "violet" | "fuchsia" | "pink" => Color::LightMagenta,
        _ => Color::Gray,
    }
}
