pub mod assignment;
pub mod availability;
pub mod candidates;
pub mod notify;
pub mod scoring;

pub use assignment::AssignmentEngine;
