//! Kiln Core Library
//!
//! Specification types, configuration loading, URL paths and error handling
//! shared by the kiln static site builder.

pub mod config;
pub mod error;
pub mod path;
pub mod spec;

pub use config::{ConfigParser, JsonConfigParser};
pub use error::{CoreError, Result};
pub use spec::{ItemSpec, PageSpec, ResourceCategory, ThemeSpec, WebsiteSpec};
