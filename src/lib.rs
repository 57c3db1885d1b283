//! Display color temperature adjustment through CRTC gamma ramps.
//!
//! [`session::Session`] owns the site → partition → CRTC tree opened
//! through a [`backends::Backend`], computes ramps with [`color`] and
//! restores what it found on exit.

pub mod backends;
pub mod cli;
pub mod color;
pub mod config;
pub mod error;
pub mod geoclue;
pub mod ipc;
pub mod print;
pub mod ramps;
pub mod scheduling;
pub mod selection;
pub mod session;

pub use color::ColorSetting;
pub use error::{GammaError, SetRampsError};
pub use ramps::GammaRamps;
pub use selection::{IndexSelector, Selection, SelectionList};
pub use session::{Adjuster, CrtcTarget, Session, SessionState};
