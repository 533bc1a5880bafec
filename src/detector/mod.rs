pub mod change;
pub mod diff;

pub use change::{ChangeDetector, Verdict};
