//! Slide rendering infrastructure: cache keys, the bitmap store and the
//! background prerender scheduler.

mod cache;
mod key;
mod request;
mod scheduler;

pub use cache::{BitmapCache, CacheNotice};
pub use key::{Bitmap, Purpose, RenderKey};
pub use request::{PrerenderTask, Priority, RenderEvent};
pub use scheduler::PrerenderScheduler;
