//! Plumbing shared by the lab-tool binaries.

use std::path::PathBuf;
use nv_lab::{
    mkdir,
    config::Config,
    error::Result,
};

/// Load the config file named by the first command-line argument, or use all
/// defaults if there is none.
pub fn config_from_args() -> Result<Config> {
    Config::load_or_default(std::env::args().nth(1))
}

/// Create (if needed) and return the output directory for a single tool.
pub fn output_dir(config: &Config, tool: &str) -> Result<PathBuf> {
    let outdir = config.output()?.dir.join(tool);
    mkdir!(outdir);
    Ok(outdir)
}
