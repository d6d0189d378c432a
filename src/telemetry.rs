//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 安装 fmt 日志订阅器
///
/// 过滤规则读取 `RUST_LOG`，未设置时使用 `default_filter`。重复调用时保持已有订阅器。
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
