pub mod auth;
pub mod client;
pub mod mapper;
pub mod publisher;

pub use client::GitHubPlatform;
