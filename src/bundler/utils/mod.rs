//! Filesystem, network and locking helpers shared by the pipeline.

pub mod fs;
pub mod http;
pub mod lock;
