//!  Storage is organized around a data folder:
//!   - `config.json` holds every tracker definition, see [tracker_store::TrackerStore].
//!   - `events/YYYY-MM.jsonl` holds the events of all trackers logged in that local month, one
//!     json object per line, see [event_log::EventLog].
//!   - Files are only ever read and written whole through [adapter::FileAdapter].

pub mod adapter;
pub mod codec;
pub mod entities;
pub mod event_log;
pub mod tracker_store;

use std::io::ErrorKind;

/// Whether an adapter error means the file simply isn't there.
pub(crate) fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<std::io::Error>()
        .is_some_and(|e| e.kind() == ErrorKind::NotFound)
}
