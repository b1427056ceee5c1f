//! Resumable, fault-tolerant classification of Salesforce permission
//! records through a conversational language model.
//!
//! The driver walks an input table, evaluates each record with a
//! follow-up-per-rating protocol, and checkpoints the growing result table so
//! a killed job resumes where it stopped.
pub mod backend;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluate;
pub mod extract;
pub mod progress;
pub mod ratings;
pub mod record;
pub mod results;
pub mod session;
pub mod staging;
pub mod workflow;
