//! Render ordering
//!
//! A [`RenderQueue`] is refilled every frame by a pipeline stage and drained
//! in ascending [`RenderOrderKey`] order.

mod order_key;
mod render_queue;

pub use order_key::RenderOrderKey;
pub use render_queue::{Iter, RenderQueue, DEFAULT_CAPACITY};
