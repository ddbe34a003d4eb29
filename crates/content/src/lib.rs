mod audio;
mod bitmap;
mod cache;
mod config;
mod content_file;
mod error;
mod fallback;
mod fs;
mod load_map;
mod module_registry;
pub mod path;
mod texture;
mod upload_queue;

#[cfg(test)]
mod testing;

pub use audio::*;
pub use bitmap::*;
pub use cache::*;
pub use config::*;
pub use content_file::*;
pub use error::*;
pub use fallback::*;
pub use fs::*;
pub use module_registry::*;
pub use path::PathHashes;
pub use texture::*;
pub use upload_queue::*;
