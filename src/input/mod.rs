mod handler;

pub use handler::{Press, PressTracker};
