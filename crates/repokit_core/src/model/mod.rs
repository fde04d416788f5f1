//! Generic row model shared by executor and repositories.
//!
//! # Responsibility
//! - Define the scalar `Value` and ordered `Record` used at the core boundary.
//! - Keep row data framework-agnostic (no HTTP or DI types).
//!
//! # Invariants
//! - A `Record` is a flat column → scalar mapping.

mod record;
mod value;

pub use record::Record;
pub use value::Value;
