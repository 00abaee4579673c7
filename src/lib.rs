pub mod config;
pub mod diagram;
pub mod gemini;
pub mod generation;
pub mod models;
pub mod routes;
pub mod schema;
