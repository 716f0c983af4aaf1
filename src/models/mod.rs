//! # Models
//!
//! Bayesian change-point models for price series. The single change-point
//! model infers where the mean level of a series jumps and by how much.

pub mod changepoint;
