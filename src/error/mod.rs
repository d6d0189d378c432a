//! 错误处理模块
//!
//! 服务发现客户端的统一错误类型与错误代码

pub mod code;
pub mod discovery_error;

pub use code::ErrorCode;
pub use discovery_error::{BoxError, DiscoveryError, Result};
