// Library exports for the CLI and tests
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;

pub use error::ClientError;
pub use state::{AppState, Platform};
