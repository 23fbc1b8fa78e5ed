//! Media backend seam: the capability interface every playback backend
//! implements, plus the events it marshals back to the UI thread.
//!
//! Backends (VLC, GStreamer, ...) run playback on their own execution
//! contexts. The manager never blocks on them; state changes come back as
//! [`PlayerEvent`]s over a channel drained on the UI thread.

use log::info;

use super::spec::{OverlayKey, OverlaySpec, PixelRect};
use crate::ui::WindowRole;

/// Per-instance playback state machine.
///
/// Stopped → Playing ↔ Paused → Finished (loops back to Playing when the
/// spec asks for it). `Failed` is terminal: the slide still displays and the
/// region shows a placeholder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
    Finished,
    Failed,
}

impl PlaybackState {
    /// Terminal states take no further transport commands
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, PlaybackState::Failed)
    }
}

/// Errors from the media backend
#[derive(Debug, thiserror::Error)]
pub enum MediaFault {
    // field is `media`, not `source`: thiserror reserves that name for
    // error chaining
    #[error("cannot open media {media}: {detail}")]
    Open { media: String, detail: String },

    #[error("playback error: {detail}")]
    Playback { detail: String },
}

impl MediaFault {
    pub fn open(media: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Open {
            media: media.into(),
            detail: detail.into(),
        }
    }

    pub fn playback(detail: impl Into<String>) -> Self {
        Self::Playback {
            detail: detail.into(),
        }
    }
}

/// Asynchronous notification from a backend, marshaled to the UI thread
/// before any instance state is touched
#[derive(Clone, Debug)]
pub struct PlayerEvent {
    pub overlay: OverlayKey,
    pub kind: PlayerEventKind,
}

#[derive(Clone, Debug)]
pub enum PlayerEventKind {
    /// Natural end of the media
    Finished,
    /// Known media duration, in seconds
    DurationKnown(f64),
    /// Mid-playback failure
    Error(String),
}

/// Transport control over one live player instance
pub trait PlayerHandle {
    fn play(&mut self) -> Result<(), MediaFault>;
    fn pause(&mut self) -> Result<(), MediaFault>;
    fn stop(&mut self) -> Result<(), MediaFault>;
    /// Reposition/rescale the bound region without restarting playback
    fn set_region(&mut self, rect: PixelRect) -> Result<(), MediaFault>;
}

/// Factory selected at configuration time; one per media backend
pub trait MediaBackend {
    /// Open a player for the spec, bound to a region of the given window.
    /// State changes must be reported through `events`.
    fn open(
        &self,
        spec: &OverlaySpec,
        window: WindowRole,
        events: flume::Sender<PlayerEvent>,
    ) -> Result<Box<dyn PlayerHandle>, MediaFault>;
}

/// Backend that logs transport calls and plays nothing.
///
/// Used when no real media backend is compiled in; slides with overlays
/// still navigate fine, the regions just stay empty.
#[derive(Debug, Default)]
pub struct NullBackend;

struct NullPlayer {
    source: String,
}

impl PlayerHandle for NullPlayer {
    fn play(&mut self) -> Result<(), MediaFault> {
        info!("null backend: play {}", self.source);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), MediaFault> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), MediaFault> {
        Ok(())
    }

    fn set_region(&mut self, _rect: PixelRect) -> Result<(), MediaFault> {
        Ok(())
    }
}

impl MediaBackend for NullBackend {
    fn open(
        &self,
        spec: &OverlaySpec,
        _window: WindowRole,
        _events: flume::Sender<PlayerEvent>,
    ) -> Result<Box<dyn PlayerHandle>, MediaFault> {
        Ok(Box::new(NullPlayer {
            source: spec.source.display().to_string(),
        }))
    }
}

/// Format a media timestamp as m:ss, or "m:ss / m:ss" when the total
/// duration is known
#[must_use]
pub fn format_media_time(position_secs: f64, duration_secs: Option<f64>) -> String {
    let fmt = |secs: f64| {
        let total = secs.max(0.0).round() as u64;
        format!("{}:{:02}", total / 60, total % 60)
    };
    match duration_secs {
        Some(duration) => format!("{} / {}", fmt(position_secs), fmt(duration)),
        None => fmt(position_secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_time_without_duration() {
        assert_eq!(format_media_time(0.0, None), "0:00");
        assert_eq!(format_media_time(61.4, None), "1:01");
    }

    #[test]
    fn media_time_with_duration() {
        assert_eq!(format_media_time(75.0, Some(130.0)), "1:15 / 2:10");
    }

    #[test]
    fn open_fault_message_names_the_file() {
        let fault = MediaFault::open("talk.mp4", "no such file");
        assert_eq!(fault.to_string(), "cannot open media talk.mp4: no such file");
    }

    #[test]
    fn failed_is_the_only_terminal_state() {
        assert!(PlaybackState::Failed.is_terminal());
        assert!(!PlaybackState::Finished.is_terminal());
        assert!(!PlaybackState::Stopped.is_terminal());
    }
}
