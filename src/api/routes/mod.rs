//! API route handlers

pub mod command;
