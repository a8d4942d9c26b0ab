pub mod db;
pub mod recorder;

pub use db::{InstallRecord, StateDb, StateError};
pub use recorder::StateRecorder;
