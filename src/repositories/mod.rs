pub mod memory_store;
pub mod realtime;
pub mod rest_store;
pub mod snippet_repository;
pub mod snippet_store;

#[cfg(test)]
pub mod mock_repository;

pub use memory_store::*;
pub use rest_store::*;
pub use snippet_repository::*;
pub use snippet_store::*;

#[cfg(test)]
pub use mock_repository::*;
