//! Color themes for the dashboard.
//!
//! A theme is picked by name from the `[ui]` config section. Palettes are
//! written as color names or `#RRGGBB` strings and resolved once when the
//! theme is built.

use ratatui::style::Color;
use serde::{Deserialize, Serialize};

/// Available theme presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThemePreset {
    #[default]
    Dark,
    Light,
}

impl ThemePreset {
    /// Looks up a preset by its config name. Unknown names fall back to dark.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "light" => ThemePreset::Light,
            "dark" => ThemePreset::Dark,
            other => {
                tracing::warn!("Unknown theme {:?}, using dark", other);
                ThemePreset::Dark
            }
        }
    }
}

struct Palette {
    foreground: &'static str,
    background: &'static str,
    title: &'static str,
    table_header: &'static str,
    highlight: &'static str,
    highlight_fg: &'static str,
    border: &'static str,
    muted: &'static str,
    key_hint: &'static str,
    timestamp: &'static str,
    success: &'static str,
    warning: &'static str,
    error: &'static str,
}

const DARK: Palette = Palette {
    foreground: "white",
    background: "black",
    title: "cyan",
    table_header: "yellow",
    highlight: "cyan",
    highlight_fg: "black",
    border: "white",
    muted: "darkgray",
    key_hint: "cyan",
    timestamp: "green",
    success: "green",
    warning: "yellow",
    error: "red",
};

const LIGHT: Palette = Palette {
    foreground: "black",
    background: "white",
    title: "blue",
    table_header: "#8a6d00",
    highlight: "blue",
    highlight_fg: "white",
    border: "black",
    muted: "gray",
    key_hint: "blue",
    timestamp: "#00875a",
    success: "green",
    warning: "#b35900",
    error: "red",
};

/// Resolved colors used by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Theme {
    pub preset: ThemePreset,
    pub foreground: Color,
    pub background: Color,
    pub title: Color,
    /// Table header rows, drawn bold
    pub table_header: Color,
    /// Background of the selected row
    pub highlight: Color,
    pub highlight_fg: Color,
    pub border: Color,
    pub muted: Color,
    pub key_hint: Color,
    /// ISO timestamps inside log lines
    pub timestamp: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::from_preset(ThemePreset::Dark)
    }
}

impl Theme {
    pub fn from_preset(preset: ThemePreset) -> Self {
        let palette = match preset {
            ThemePreset::Dark => &DARK,
            ThemePreset::Light => &LIGHT,
        };

        Self {
            preset,
            foreground: parse_color(palette.foreground),
            background: parse_color(palette.background),
            title: parse_color(palette.title),
            table_header: parse_color(palette.table_header),
            highlight: parse_color(palette.highlight),
            highlight_fg: parse_color(palette.highlight_fg),
            border: parse_color(palette.border),
            muted: parse_color(palette.muted),
            key_hint: parse_color(palette.key_hint),
            timestamp: parse_color(palette.timestamp),
            success: parse_color(palette.success),
            warning: parse_color(palette.warning),
            error: parse_color(palette.error),
        }
    }

    pub fn from_name(name: &str) -> Self {
        Self::from_preset(ThemePreset::from_name(name))
    }
}

/// Parses a color string into a ratatui Color
///
/// Supports named colors (red, green, blue, etc.) and hex colors (#RRGGBB).
/// Anything else is white.
pub fn parse_color(color_str: &str) -> Color {
    match color_str.to_lowercase().as_str() {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" | "grey" => Color::Gray,
        "darkgray" | "darkgrey" => Color::DarkGray,
        "lightred" => Color::LightRed,
        "lightgreen" => Color::LightGreen,
        "lightyellow" => Color::LightYellow,
        "lightblue" => Color::LightBlue,
        "lightmagenta" => Color::LightMagenta,
        "lightcyan" => Color::LightCyan,
        "white" => Color::White,
        s if s.starts_with('#') && s.len() == 7 && s.is_ascii() => {
            let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&s[range], 16).ok();
            match (channel(1..3), channel(3..5), channel(5..7)) {
                (Some(r), Some(g), Some(b)) => Color::Rgb(r, g, b),
                _ => Color::White,
            }
        }
        _ => Color::White,
    }
}
