//! 网络模块
//!
//! 提供重连退避、可取消延迟等网络功能

mod retry;

pub use retry::*;
