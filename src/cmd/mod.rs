//! Command modules - one file per CLI command

pub mod check;
pub mod hash;
pub mod info;
pub mod install;
pub mod list;
pub mod remove;

use anyhow::{Context, Result};
use decant::Layout;

/// Resolve the layout or explain why we cannot.
fn layout() -> Result<Layout> {
    Layout::discover().context("could not determine home directory (set DECANT_HOME)")
}
