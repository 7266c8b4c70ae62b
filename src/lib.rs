//! Orchestration, audit and release gating for a multi-role LLM
//! code-generation pipeline.

pub mod agent;
pub mod audit;
pub mod commands;
pub mod config;
pub mod deploy;
pub mod error;
pub mod platform;
pub mod quality;
pub mod server;
pub mod shutdown;
pub mod storage;
pub mod telemetry;
pub mod workflow;
