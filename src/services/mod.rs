pub mod api;
pub mod auth;
pub mod blob;
pub mod calendar;
pub mod gallery;
pub mod metrics;
pub mod notifications;
pub mod push;
pub mod registration;
pub mod resource;
pub mod schools;
pub mod session;
pub mod shell;
pub mod transport;
