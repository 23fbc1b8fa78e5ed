//! Media overlays: per-slide video/audio regions and their lifetimes.

mod manager;
mod player;
mod spec;

pub use manager::OverlayManager;
pub use player::{
    MediaBackend, MediaFault, NullBackend, PlaybackState, PlayerEvent, PlayerEventKind,
    PlayerHandle, format_media_time,
};
pub use spec::{OverlayKey, OverlaySpec, PixelRect, Region};
