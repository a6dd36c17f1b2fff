//! Database models and DTOs for all domain entities.

pub mod backup;
pub mod change;
pub mod golden;
pub mod group;
pub mod pagination;
pub mod rule;
