//! Mock host for testing collectors without Linux.

mod filesystem;
mod scenarios;

pub use filesystem::MockFs;
pub use scenarios::{HOME_DEV, ROOT_DEV};
