//! Domain logic for the autopost service.
//!
//! Pure functions and types with no I/O: rule vocabulary, the run
//! scheduler, product rotation and content resolution. Shared by the
//! repository layer and the HTTP API.

pub mod content;
pub mod error;
pub mod rotation;
pub mod rule;
pub mod schedule;
pub mod types;
