//! Compile-time scaling benchmarks for C++ template metaprograms.
//!
//! A template is rendered for each value of an input range, and each
//! rendering is compiled as a base variant and as a "total" variant with a
//! feature-flag macro defined. Raw wall-clock samples for both are collected
//! per input so the marginal cost of the flagged code path can be analysed
//! downstream.

pub mod config;
pub mod error;
pub mod harness;
pub mod invoker;
pub mod measure;
pub mod range;
pub mod render;
pub mod schema;
pub mod summary;

pub use error::{MeasureError, MetabenchError};
pub use measure::{measure, MeasureJob, MeasureOptions, Measurer};
pub use schema::{MeasurementPoint, MeasurementResult};
