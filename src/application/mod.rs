//! Application services and error types shared by the HTTP layer.

pub mod error;
pub mod forecast;
