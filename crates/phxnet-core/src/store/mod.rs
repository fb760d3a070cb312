// ── Document store ──
//
// The pipeline persists through an abstract keyed document store. The
// contract lives in `document`; `MemoryStore` is the bundled backend,
// `Repository` adds typed (de)serialization on top, and `KeyedLocks`
// serializes read-modify-write work per key.

mod document;
mod locks;
mod memory;
mod repository;

pub use document::{Collection, Document, DocumentStore, Filter, Record, StoreError};
pub use locks::KeyedLocks;
pub use memory::MemoryStore;
pub use repository::Repository;
