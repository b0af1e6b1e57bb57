// ── Storage layer ──
//
// `PortTable` is the in-memory merged view; `ConfigStore` is the durable
// side, layered over a pluggable `BlobStore`.

mod blob;
mod config_store;
mod port_table;

pub use blob::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use config_store::{ConfigStore, infer_port_count};
pub use port_table::{PortEntry, PortTable, RefreshDiff};
