//! Embedded write-ahead log: record framing, ring writer, recovery scanner,
//! and the mutation payload codec.

pub mod mutation;
pub mod reader;
pub mod record;
pub mod writer;

pub use mutation::{Mutation, PutFrame};
pub use reader::{PendingRecord, PendingScan, WalScanState, scan_pending_mutations_with_state, scan_state};
pub use record::{RecordHeader, is_terminal_marker};
pub use writer::WalWriter;
