//! Client side of QR attendance: teachers issue short-lived QR tokens for a
//! class schedule, students scan them to check in.
//!
//! [`issuer`] covers the teacher flow and [`scanner`] the student flow. They
//! only share the shapes in [`token`] and talk to the backend through the
//! traits in [`api`].

#[macro_use]
extern crate lazy_static;

pub mod api;
pub mod config;
pub mod error;
pub mod issuer;
pub mod notice;
pub mod render;
pub mod scanner;
pub mod token;

pub use error::{ApiError, AttendanceError};
