// Business domains
pub mod articles;
pub mod cve;
pub mod pipeline;
pub mod settings;
pub mod sources;
