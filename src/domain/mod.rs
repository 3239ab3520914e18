//! Domain types for the perpetual position ledger.
//!
//! This module provides:
//! - Fixed-point numeric handling via the Fixed wrapper
//! - Domain primitives: Version, Timestamp, AccountId, ProductId, Side
//! - Position, PendingPosition and VersionSnapshot
//! - Per-unit accumulators for value and share

pub mod accumulator;
pub mod fixed;
pub mod position;
pub mod primitives;

pub use accumulator::Accumulator;
pub use fixed::{ArithmeticError, Fixed};
pub use position::{PendingPosition, Position, VersionSnapshot};
pub use primitives::{AccountId, ProductId, Side, Timestamp, Version};
