//! Terminal UI: page rendering, dialogs, colors and formatting helpers.

pub mod render;
pub mod theme;
pub mod utils;
pub mod widgets;

pub use render::draw;
pub use theme::{Theme, ThemePreset};
