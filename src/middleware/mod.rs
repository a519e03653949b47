// src/middleware/mod.rs

pub mod access_token;
pub mod admin_auth;

pub use access_token::{access_guard_middleware, AccessGuard, AllowListGuard};
pub use admin_auth::admin_auth_middleware;
