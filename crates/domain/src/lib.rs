//! Domain layer for the dance class booking system.
//!
//! This crate provides:
//! - `ClassService`, which searches classes, projects class details and
//!   runs the booking protocol on top of the storage repositories
//! - `DomainError`, the error taxonomy surfaced to the HTTP layer
//! - Read projections (`ClassDetails`, `SearchResult`) and `StyleFilter`

pub mod error;
pub mod filter;
pub mod projection;
pub mod service;

pub use error::{DomainError, ErrorCategory};
pub use filter::StyleFilter;
pub use projection::{ClassDetails, SearchResult};
pub use service::{BookClass, ClassService};
