pub mod dmg;
pub mod download;

pub use download::{DownloadError, DownloadLimits};
