//! API request handlers

mod checkpoints;
mod directory;
mod events;
mod health;
mod programs;

pub use checkpoints::*;
pub use directory::*;
pub use events::*;
pub use health::*;
pub use programs::*;
