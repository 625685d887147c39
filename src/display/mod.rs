mod cache;
pub mod color;
pub mod download;
pub mod face;
pub mod icon;
pub mod renderer;
pub mod text;

pub use cache::LruCache;
pub use face::Face;
pub use renderer::{load_font, Compositor};
