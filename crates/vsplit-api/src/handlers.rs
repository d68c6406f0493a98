//! Request handlers.

pub mod archive;
pub mod fragments;
pub mod health;
pub mod progress;
pub mod sessions;
pub mod split;

pub use archive::*;
pub use fragments::*;
pub use health::*;
pub use progress::*;
pub use sessions::*;
pub use split::*;
