#![forbid(unsafe_code)]

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod restart;
pub mod schedule;
pub mod store;

#[cfg(test)]
mod testing;
