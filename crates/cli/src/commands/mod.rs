pub mod list;
pub mod run;

use std::path::PathBuf;

/// The project root: the explicit `--root` or the current directory.
pub fn project_root(root: Option<PathBuf>) -> color_eyre::Result<PathBuf> {
    match root {
        Some(root) => Ok(root),
        None => Ok(std::env::current_dir()?),
    }
}
