//! Playbook configurator core: a small query language over a SQLite catalog
//! of remediation fixes, plus the session machinery that assembles selected
//! fixes onto a template document without duplicates.

pub mod catalog;
pub mod config;
pub mod query;
pub mod session;
