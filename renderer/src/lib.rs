pub mod drawing;
mod error;
pub mod renderer;
pub mod video;

pub use error::VideoError;
pub use renderer::{MinimapRenderer, RenderInput, RenderOptions, RosterEntry, TeamSide};

/// Square minimap edge in pixels.
pub const MINIMAP_SIZE: u32 = 760;
/// Canvas height: minimap plus the header strip.
pub const CANVAS_HEIGHT: u32 = 800;
/// Header strip height for timer, tags and the score line.
pub const HEADER_HEIGHT: u32 = CANVAS_HEIGHT - MINIMAP_SIZE;
