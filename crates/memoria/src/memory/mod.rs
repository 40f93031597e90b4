pub mod request;
pub mod types;

pub use request::{MemoryKind, MemoryRequest, MemoryResponse, Operation, ResponseSource};
pub use types::{MemoryRecord, ScratchEntry, SearchResult};
