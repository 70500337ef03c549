pub mod SharedMemory;
pub mod backend;
pub mod heap;
pub mod semaphore;

pub use backend::{HeapBackend, IpcBackend, PosixBackend};
pub use semaphore::FlowCounter;
pub use SharedMemory::{AccessMode, SharedSegment};
