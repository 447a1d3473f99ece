pub mod cache;
pub mod chunk;
pub mod config;
pub mod desired;
pub mod diff;
pub mod endpoint;
pub mod error;
pub mod github;
pub mod hash;
pub mod media;
pub mod notify;
pub mod publish;
pub mod report;
pub mod retry;
pub mod rows;
pub mod tree;
pub mod types;
pub mod utils;
pub mod wordpress;

#[cfg(test)]
mod testing;
