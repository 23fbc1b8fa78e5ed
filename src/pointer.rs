//! Software laser pointer drawn over the current slide.
//!
//! Pure state: the front-end feeds it pointer motion and button events and
//! redraws the slide whenever a call returns `true`.

/// When the pointer lights up
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerMode {
    /// Always drawn, following the mouse
    Continuous,
    /// Drawn only while the activation button is held
    Manual,
    /// Never drawn
    Disabled,
}

/// Pointer dot color, a presenter preference
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointerColor {
    #[default]
    Red,
    Green,
    Blue,
}

impl PointerColor {
    pub fn as_str(self) -> &'static str {
        match self {
            PointerColor::Red => "red",
            PointerColor::Green => "green",
            PointerColor::Blue => "blue",
        }
    }
}

/// Laser pointer state for the presenter's slide widget.
///
/// Positions are normalized to the slide (0..1 on both axes), so the same
/// state renders on the audience and presenter windows at any size.
#[derive(Debug)]
pub struct LaserPointer {
    mode: PointerMode,
    color: PointerColor,
    position: (f32, f32),
    shown: bool,
}

impl LaserPointer {
    #[must_use]
    pub fn new(mode: PointerMode) -> Self {
        Self {
            mode,
            color: PointerColor::default(),
            position: (0.5, 0.5),
            shown: mode == PointerMode::Continuous,
        }
    }

    /// Switch mode. Continuous shows the pointer immediately; manual and
    /// disabled hide it until activated. Returns `true` when the slide
    /// needs a redraw.
    pub fn set_mode(&mut self, mode: PointerMode) -> bool {
        let shown = mode == PointerMode::Continuous;
        let redraw = self.mode != mode || self.shown != shown;
        self.mode = mode;
        self.shown = shown;
        redraw
    }

    #[must_use]
    pub fn mode(&self) -> PointerMode {
        self.mode
    }

    pub fn set_color(&mut self, color: PointerColor) {
        self.color = color;
    }

    #[must_use]
    pub fn color(&self) -> PointerColor {
        self.color
    }

    /// Follow the mouse while the pointer is shown. Returns `true` when the
    /// motion was consumed and the slide needs a redraw.
    pub fn track(&mut self, x: f32, y: f32) -> bool {
        if !self.shown {
            return false;
        }
        self.position = (x, y);
        true
    }

    /// Activation button pressed at the given slide position. Only manual
    /// mode reacts; the pointer appears there at once.
    pub fn press(&mut self, x: f32, y: f32) -> bool {
        if self.mode != PointerMode::Manual {
            return false;
        }
        self.shown = true;
        self.track(x, y)
    }

    /// Activation button released; hides a manually shown pointer
    pub fn release(&mut self) -> bool {
        if self.mode == PointerMode::Manual && self.shown {
            self.shown = false;
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    /// Normalized position relative to the slide
    #[must_use]
    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    /// Center of the dot in pixels for a widget of the given size
    #[must_use]
    pub fn position_px(&self, widget_width: u32, widget_height: u32) -> (f32, f32) {
        (
            self.position.0 * widget_width as f32,
            self.position.1 * widget_height as f32,
        )
    }
}
