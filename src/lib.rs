// src/lib.rs — Library root for breakthrough

pub mod agents;
pub mod bus;
pub mod cli;
pub mod core;
pub mod evaluator;
pub mod gpu;
pub mod history;
pub mod infra;
pub mod provider;
pub mod score;
