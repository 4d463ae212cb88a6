pub mod dashboard;
pub mod logging;
