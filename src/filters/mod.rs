pub mod complementary;
pub mod runner;

pub use complementary::{ComplementaryFilter, ComplementaryFilterState, GyroUnits};
pub use runner::FilterRunner;
