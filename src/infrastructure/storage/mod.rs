//! Key/value storage adapters

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
