pub mod config;
pub mod consts;
pub mod engine;
pub mod gateway;
pub mod limiter;
pub mod loader;
pub mod validate;
