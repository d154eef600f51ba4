//! Relational store for Cuffdiff differential expression output.
//!
//! An import reads one Cuffdiff output directory, reshapes its wide tracking
//! files into per-sample rows and writes everything as one experiment into
//! a SQLite database.

pub mod config;
pub mod diff;
pub mod domain;
pub mod error;
pub mod import;
pub mod keys;
pub mod melt;
pub mod output;
pub mod query;
pub mod record;
pub mod replicate;
pub mod schema;
pub mod store;
pub mod track;
pub mod tsv;
