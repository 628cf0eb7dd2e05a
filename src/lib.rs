pub mod api;
pub mod config;
pub mod error;
pub mod job;
pub mod pipeline;
pub mod scene;
pub mod server;
pub mod video;

pub use error::{ForgeError, Result};
