//! Route handlers

pub mod nutrition;
pub mod score;
