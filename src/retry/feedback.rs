use std::fmt;

use crate::error::DiscoveryError;

/// 重试 / 健康循环的进度事件
///
/// 只用于观测，按发送顺序在单个 channel 上传递
#[derive(Debug)]
pub struct Feedback {
    pub error: Option<DiscoveryError>,
    pub message: String,
}

impl Feedback {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            error: None,
            message: message.into(),
        }
    }

    pub fn failure(error: DiscoveryError, message: impl Into<String>) -> Self {
        Self {
            error: Some(error),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "{} | ERROR: {}", self.message, error),
            None => f.write_str(&self.message),
        }
    }
}
