//! Blocklist Store — owns the dnsmasq hosts-format file.
//!
//! The store is a materialized view: it never decides what is blocked, it
//! only renders the blocked set it is handed and writes it out atomically,
//! then pokes the resolver to reload. The Grant Registry is its only caller
//! and serializes every `apply`.

mod signal;
mod store;

pub use signal::{reload_signal_for, CommandReload, NoopReload, RecordingReload, ReloadSignal};
pub use store::BlocklistStore;
