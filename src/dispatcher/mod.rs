//! Dispatcher module - pool intake, filtering and task lifecycle.

pub mod controller;
pub mod creator_blacklist;
pub mod event_source;

pub use controller::{DispatchOutcome, Dispatcher, DispatcherDeps};
pub use creator_blacklist::{CreatorBlacklist, InMemoryCreatorBlacklist};
pub use event_source::{MonitoredPoolEventSource, PoolCreationEventSource, ReplayEventSource};
