//! HTTP request handlers for the PSA API.

pub mod health;
pub mod nsem;
pub mod psa;
