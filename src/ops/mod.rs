pub mod error;
pub mod install;
pub mod remove;

pub use error::InstallError;
pub use install::install_manifest;
pub use remove::remove_packages;
