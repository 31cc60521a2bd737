//! API handlers module

pub mod documents;
pub mod events;
pub mod health;
pub mod search;
