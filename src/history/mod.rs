//! Request history — append-only JSONL log of every decision.
//!
//! One JSON object per line, one file per day. Records are write-once and
//! never mutated; they are read back as context for future decisions
//! (request count today, recent requests) and by the `history` operation.

mod log;
mod types;

pub use log::RequestLog;
pub use types::RequestRecord;
