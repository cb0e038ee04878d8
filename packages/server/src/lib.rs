// vulnwatch - security news and CVE pipeline core
//
// A Postgres-backed job queue drives a chained article pipeline
// (ingest -> fetch content -> summarize -> markdown -> site build) and a CVE
// snapshot/diff sync. Handlers live per-domain in domains/*/activities.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;

pub use config::*;
