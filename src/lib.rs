//! Inkpost - Blog Platform Backend
//!
//! Authentication, session management, and token verification for the blog
//! platform. Blog content, file uploads, and rendering live in sibling
//! services; this crate owns caller identity.

pub mod core;
