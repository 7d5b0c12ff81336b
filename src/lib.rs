//! vrp-jobs
//!
//! Vehicle routing plans solved as cancellable background jobs: the domain
//! model, the strategy catalog, the local-search engine, the wire records and
//! the job orchestrator that ties them together.

pub mod catalog;
pub mod demo;
pub mod domain;
pub mod haversine;
pub mod orchestrator;
pub mod reconstruct;
pub mod score;
pub mod service;
pub mod solver;
pub mod traits;
pub mod wire;
