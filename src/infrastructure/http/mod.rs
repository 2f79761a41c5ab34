//! HTTP Infrastructure
//!
//! Axum API 服务：路由、处理器、错误映射、中间件

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use server::{HttpServer, ServerConfig};
pub use state::AppState;
