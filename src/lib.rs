pub mod application;
pub mod collab;
pub mod commands;
pub mod config;
pub mod debian;
pub mod error;
pub mod package;
pub mod pool;
pub mod process;
pub mod runtime;
pub mod suite;
