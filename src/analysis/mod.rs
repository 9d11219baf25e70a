//! Out-of-band frame analysis.
//!
//! The analysis stage samples frames on a frame-time interval and hands them
//! to a [`Describer`] on a background task, so the frame path never waits on
//! the external call.

mod describer;
mod settings;
mod stage;

pub use describer::*;
pub use settings::*;
pub use stage::*;
