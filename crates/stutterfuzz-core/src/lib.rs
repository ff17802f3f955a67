pub mod config;
pub mod logging;

pub mod chunk;
pub mod control;
pub mod corpus;
pub mod engine;
pub mod net;
pub mod stats;
