mod error;

pub mod config;
pub mod path;

pub use error::{Error, ErrorKind, Result};
