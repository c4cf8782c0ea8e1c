pub mod args;
pub mod audio;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod subtitle;
pub mod timestamps;
pub mod tts;
pub mod utils;
pub mod workspace;

pub use config::{RunConfig, Stage};
pub use error::{PipelineError, Step};
pub use pipeline::{Pipeline, StoryInput};
