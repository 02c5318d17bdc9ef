mod rewrite;
mod run;
mod snapshot;

use anyhow::Result;
use std::path::Path;

use fillrate::config::Config;
use fillrate::error::Error;

pub use rewrite::rewrite;
pub use run::{run, RunArgs};
pub use snapshot::snapshot;

/// Load configuration from a TOML file when given, otherwise from the environment
fn load_config(path: Option<&Path>) -> Result<Config> {
    let loaded = match path {
        Some(path) => Config::from_file(path),
        None => Config::from_env(),
    };
    loaded.map_err(|e| Error::config(format!("{e:#}")).into())
}
