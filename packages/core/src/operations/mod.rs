//! Catalog Operation Types
//!
//! Supporting types shared by the tree mutator, the repositories and the
//! catalog service:
//!
//! - [`CatalogError`] - error taxonomy for every catalog operation
//! - [`ChangeSet`] - ordered row writes produced by one mutation

pub mod change_set;
pub mod error;

pub use change_set::{ChangeSet, RowChange};
pub use error::{CatalogError, PersistenceOperation};
