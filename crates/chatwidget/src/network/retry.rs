//! 重连退避策略
//!
//! 指数退避 + 抖动，用于 Socket 断线重连

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 退避配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffConfig {
    /// 基础延迟（毫秒）
    #[serde(default = "default_base_delay")]
    pub base_delay: u64,
    /// 最大延迟（毫秒）
    #[serde(default = "default_max_delay")]
    pub max_delay: u64,
    /// 抖动因子 (0.0-1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_base_delay() -> u64 {
    1000
}
fn default_max_delay() -> u64 {
    5000
}
fn default_jitter() -> f64 {
    0.5
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

/// 计算第 `attempt` 次重连的延迟（attempt 从 0 开始）
pub fn calculate_backoff_delay(attempt: u32, config: &BackoffConfig) -> u64 {
    let factor = 2u64.saturating_pow(attempt.min(32));
    let mut delay = config.base_delay.saturating_mul(factor);

    // 应用抖动（避免惊群效应）
    if config.jitter > 0.0 {
        let jitter_amount = (delay as f64 * config.jitter.min(1.0)) as i64;
        if jitter_amount > 0 {
            let random_jitter = rand::thread_rng().gen_range(-jitter_amount..=jitter_amount);
            delay = (delay as i64).saturating_add(random_jitter).max(0) as u64;
        }
    }

    // 限制最大延迟
    delay.min(config.max_delay)
}

/// 可取消的延迟，被取消时返回 false
pub async fn cancelable_delay(ms: u64, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
        _ = cancel_token.cancelled() => false,
    }
}
