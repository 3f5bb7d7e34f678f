//! Array output: write units, batch planning and multiwrite sessions.

pub mod planner;
pub mod session;
pub mod unit;

pub use session::{Attributes, Multiwrite};
pub use unit::WriteUnit;
