pub use self::config::MapConfig;
pub use self::error::Error;
pub use self::pipeline::{convert, ConvertOptions, run_convert, run_select};

pub mod class;
pub mod color;
pub mod config;
pub mod error;
pub mod feature;
pub mod import;
pub mod names;
pub mod path;
pub mod pipeline;
pub mod projection;
pub mod render;
pub mod scalebar;
pub mod style;
