// Public API - pipeline entry point plus the building blocks it composes
pub mod runner;

pub mod cast;
pub mod config;
pub mod db;
pub mod infer;
pub mod loader;
pub mod types;
pub mod validate;

#[cfg(test)]
mod integ_tests;
