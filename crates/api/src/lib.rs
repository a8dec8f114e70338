pub mod app;
pub mod config;
pub mod jobs;
pub mod middleware;
pub mod routes;
pub mod services;
