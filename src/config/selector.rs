//! Provider 轮询选择器
//!
//! 使用双层 round-robin 策略：
//! 1. 外层：遍历每个 provider
//! 2. 内层：在每个 provider 内部遍历其 `api_keys`
//!    即：provider[0].key[0] -> provider[1].key[0] -> ... -> provider[0].key[1] -> ...

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::ProviderConfig;

/// Provider 选择器，使用双层 round-robin 策略
pub struct ProviderSelector {
    /// 提供商配置列表
    providers: Vec<ProviderConfig>,
    /// 下一个要使用的 (provider索引, `api_key索引`) 的全局计数
    next_index: AtomicUsize,
}

impl ProviderSelector {
    /// 创建新的 Provider 选择器
    pub fn new(providers: Vec<ProviderConfig>) -> Option<Self> {
        if providers.is_empty() {
            return None;
        }
        Some(Self {
            providers,
            next_index: AtomicUsize::new(0),
        })
    }

    /// 获取下一个要使用的 provider 和对应的 `api_key`
    ///
    /// 双层轮询策略：
    /// 1. 外层：按 round-robin 选择 provider
    /// 2. 内层：在该 provider 内部按 round-robin 选择 `api_key`
    ///
    /// 返回 (provider索引, provider, `api_key`)
    pub fn next(&self) -> Option<(usize, &ProviderConfig, &str)> {
        if self.providers.is_empty() {
            return None;
        }

        let provider_count = self.providers.len();

        // 获取全局计数并递增
        let global_idx = self.next_index.fetch_add(1, Ordering::Relaxed);

        // 计算 provider 索引和该 provider 内的 key 索引
        let provider_idx = global_idx % provider_count;
        let provider = &self.providers[provider_idx];

        // 在该 provider 的 api_keys 中轮询（返回借用，避免克隆）
        let api_key = if provider.api_keys.is_empty() {
            ""
        } else {
            let key_count = provider.api_keys.len();
            // 每个 provider 使用不同的相位偏移，实现交错轮询
            let key_idx = (global_idx / provider_count) % key_count;
            &provider.api_keys[key_idx]
        };

        Some((provider_idx, provider, api_key))
    }
}
