//! Screen model, layout policy, and the differential renderer.
//!
//! The renderer never repaints the world: it diffs the desired screen
//! against what it knows is on the terminal and emits the minimum motion,
//! color, and clear sequences to reconcile them. Everything here is pure
//! with respect to the terminal except the bytes pushed into the
//! [`core_term::Outputter`]'s sink.

pub mod layout;
pub mod screen;
pub mod screen_data;

pub use layout::{ScreenLayout, compute_layout};
pub use screen::{Frame, Screen};
pub use screen_data::{Line, ScreenData};
