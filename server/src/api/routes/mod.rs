//! API route handlers

pub mod cache;
pub mod entities;
pub mod health;
pub mod metrics;
