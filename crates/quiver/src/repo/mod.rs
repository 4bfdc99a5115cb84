//! In-memory repositories.
//!
//! Repositories own the entity records and their secondary lookup maps.
//! Reads hand out deep copies, so repository state can never be mutated
//! from outside a critical section. Each repository guards its maps with a
//! short internal `RwLock` covering only map access; cross-repo mutation
//! ordering is authorized by the per-library locks in the service layer.
//!
//! Every repository exposes the optimistic CAS primitive
//! `update_if_version(id, expected, mutator)`: absent → not-found, version
//! mismatch → conflict, otherwise the mutator is applied, the version
//! advances by exactly one, and `updated_at` is refreshed.

mod chunks;
mod documents;
mod libraries;

pub use chunks::ChunkRepo;
pub use documents::DocumentRepo;
pub use libraries::LibraryRepo;
