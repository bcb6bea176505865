//! Authentication extractors.
//!
//! - [`auth::AuthUser`] -- the owning account, from a JWT Bearer token.
//! - [`auth::RunnerAuth`] -- the workflow runner, from its static bearer key.

pub mod auth;
