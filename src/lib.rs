pub mod algorithm;
pub mod benchmark;
pub mod common;
pub mod config;
pub mod map;
pub mod scenario;
pub mod stat;
