// src/config/mod.rs
pub mod guard;

pub use guard::{GuardConfig, DEFAULT_CONFIG_PATH, ENV_CONFIG_PATH};
