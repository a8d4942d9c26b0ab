pub mod hash;
pub mod package;

pub use hash::Sha256Digest;
pub use package::{PackageName, Version};
