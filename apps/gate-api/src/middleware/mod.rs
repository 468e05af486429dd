//! 请求上下文与鉴权中间件

mod auth;

pub use auth::*;
