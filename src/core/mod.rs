//! Core modules for the Inkpost backend.

pub mod auth;
pub mod config;
pub mod db;
pub mod sweeper;
