pub mod doc;
pub mod nav;
pub mod overlay;
pub mod pointer;
pub mod render;
pub mod settings;
pub mod timer;
pub mod ui;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the pieces a viewer front-end wires together
pub use doc::{Document, SharedDocument};
pub use nav::NavController;
pub use overlay::OverlayManager;
pub use render::{BitmapCache, PrerenderScheduler};
pub use settings::Settings;
