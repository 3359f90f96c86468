pub mod chart;
pub mod setup;
pub mod summary;
pub mod sync;
pub mod ui;
