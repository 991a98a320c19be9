//! Data transfer objects passed between the command surface and the services.

pub mod job;
pub mod report;
