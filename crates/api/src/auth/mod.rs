//! Authentication primitives.
//!
//! - [`jwt`] -- owner access-token validation.
//! - [`api_key`] -- the workflow runner's static bearer key.

pub mod api_key;
pub mod jwt;
