//! Per-transaction change records and disk-spillable buffers.

mod buffer;
mod change;
mod spill;

pub use buffer::{Batches, Drain, TransactionBuffer};
pub use change::{Attributes, ChangeRecord, Operation};
pub use spill::{prepare_spill_dir, SpillFile};
