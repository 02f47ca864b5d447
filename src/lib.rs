//! Tagvane - environment version tracking
//!
//! Reconciles container registry tags into the version of every service
//! that is live per deployment environment, enriches each version with its
//! upstream release date, and publishes the result to a document store
//! through a stage-then-swap protocol.

pub mod clients;
pub mod config;
pub mod enricher;
pub mod environment;
pub mod interfaces;
pub mod model;
pub mod orchestrator;
pub mod publish;
pub mod resolver;
pub mod scan;
pub mod storage;
pub mod sync;
pub mod tags;
pub mod utils;
