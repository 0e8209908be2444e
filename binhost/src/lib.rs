//! Embedding facade: wires the memory manager, heap, sniffer, and dispatcher into one
//! [`Instance`] per guest image, and composes every component's error type into one [`Error`].
//!
//! Everything this crate depends on is `no_std`; this crate itself is not, since
//! [`instance::run_catching`] needs `std::panic::catch_unwind`.

pub mod instance;

pub use instance::Instance;

/// The top-level error type, composing every component error an embedder might see.
///
/// Rolled up at the embedding boundary the way a multi-crate workspace's facade typically does —
/// each component crate keeps its own narrow error enum; this one just lets a caller match on a
/// single type if it doesn't care which component failed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The image could not be classified by the sniffer.
    #[error(transparent)]
    Sniff(#[from] binhost_sniff::SniffError),
    /// The dispatcher could not resolve a requested component.
    #[error(transparent)]
    Dispatch(#[from] binhost_dispatch::DispatchError),
    /// A memory manager operation failed.
    #[error(transparent)]
    Memory(#[from] binhost_memory::MemoryError),
    /// The loader could not place the image's segments.
    #[error(transparent)]
    Loader(#[from] binhost_loader::LoaderError),
}
