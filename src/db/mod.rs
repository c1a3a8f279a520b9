pub mod cache;
pub mod profile_store;

pub use cache::{ProfileCache, ProfileSlot};
pub use profile_store::ProfileStore;
