pub mod ai;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod recorder;
pub mod service;
pub mod session;
pub mod state;
pub mod template;
pub mod tree;
pub mod types;
pub mod variables;
