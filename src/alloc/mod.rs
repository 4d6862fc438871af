pub mod raw;
pub mod registry;
pub mod report;
pub mod tracker;
