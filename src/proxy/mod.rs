//! Proxy module for validating and ranking candidate endpoints
//!
//! This module provides functionality for:
//! - Modelling candidates, probe outcomes and scores
//! - Parsing candidates from plain-text lists
//! - Probing a candidate against target URLs and scoring it
//! - Running validation over many candidates with bounded concurrency
//! - Ranking usable endpoints and selecting the best one

pub mod geo;
pub mod models;
pub mod parser;
pub mod probe;
pub mod scheduler;
pub mod selector;
pub mod validator;

pub use geo::{GeoLocation, GeoLocator};
pub use models::{
    CandidateEndpoint, EndpointStatus, Provenance, ProxyType, ScoredEndpoint, TestOutcome,
    ACTIVE_THRESHOLD,
};
pub use parser::ProxyParser;
pub use probe::{HttpProbe, Probe};
pub use scheduler::{ProgressSnapshot, Scheduler, SharedProgress};
pub use selector::ActiveSet;
pub use validator::Validator;
