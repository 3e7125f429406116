//! # Application Module
//!
//! The sync pipeline: worker pool, fetcher, validator, the syncer control
//! loop and the network height watcher.

pub mod fetcher;
pub mod pool;
pub mod shutdown;
pub mod syncer;
pub mod validator;
pub mod watcher;

pub use fetcher::Fetcher;
pub use pool::Pool;
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
pub use syncer::{Syncer, SyncerHandle};
pub use validator::Validator;
pub use watcher::Watcher;
