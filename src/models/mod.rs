pub mod calendar;
pub mod envelope;
pub mod gallery;
pub mod notification;
pub mod school;
pub mod user;
