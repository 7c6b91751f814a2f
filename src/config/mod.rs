//! Configuration management module
//!
//! Layers defaults, the `.env` file, `ROAM_*` environment variables and
//! command-line flags into one validated [`Config`].

pub mod env;
pub mod parser;
pub mod validation;

pub use parser::{display_config_summary, load_config, ConfigParser};
pub use validation::{validate_config, ConfigValidator, ValidationLevel, ValidationWarning};
pub use env::EnvManager;

pub use crate::models::Config;
