//! Backend abstraction layer
//!
//! Provides the capability traits every device backend implements, plus a
//! headless implementation that emulates the supported backends in memory.

pub mod headless;
pub mod shader;
pub mod traits;
pub mod types;

pub use headless::{DrawCall, HeadlessContext, HeadlessFactory, RecordedCommand};
pub use traits::*;
pub use types::*;
