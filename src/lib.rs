//! Forecast evaluation for monthly vehicle-licensing series.
//!
//! A series is loaded through DuckDB ([`common::table_reader`]), analysed
//! ([`summary`], [`seasonality`], [`stationarity`]) and forecast with several
//! models ([`forecast`]). Every model is scored against held-out
//! observations with the metric calculator in [`metrics`].

pub mod cli;
pub mod common;
pub mod config;
pub mod forecast;
pub mod metrics;
pub mod report;
pub mod seasonality;
pub mod stationarity;
pub mod summary;
