//! Core import pipeline: configuration, column mapping, row validation,
//! FK conflict detection and resolution, deferred creation, and the
//! session state machine that drives them in order.

pub mod config;
pub mod conflicts;
pub mod creation;
pub mod mapper;
pub mod resolution;
pub mod session;
pub mod validator;
