//! Business logic services.

pub mod compliance;
pub mod golden;
pub mod ledger;
pub mod locks;
pub mod mutation;
pub mod sync;
