//! REST adapter over the checkpoint operations

pub mod extract;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
