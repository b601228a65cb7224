pub mod format;
pub mod selector;

use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
    sync::Arc,
    time::Duration,
};

use arc_swap::{ArcSwap, Guard};
use format::format_toml;
use notify::{
    EventKind, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use self::selector::ProviderSelector;

/// 全局原子配置，支持热重载
pub struct AtomicConfig {
    inner: ArcSwap<Config>,
    config_path: PathBuf,
    /// Provider 选择器（双层轮询：先 provider，后 `api_keys`）
    provider_selector: ArcSwap<Option<Arc<ProviderSelector>>>,
}

/// 目标提供商配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// 提供商名称（日志与配置错误里标识用）
    #[serde(default)]
    pub name: String,
    /// Responses 接口的基础地址
    #[serde(default, alias = "api_base_url")]
    pub base_url: String,
    /// 模型名称（非空时覆盖请求体中的 model 字段）
    #[serde(default)]
    pub model: String,
    /// API 密钥列表（支持多个 key 进行负载均衡）
    #[serde(default, alias = "api_key", deserialize_with = "keys_or_single")]
    pub api_keys: Vec<String>,
}

/// `api_keys` 兼容两种写法：字符串列表，或单个 `api_key` 字符串
fn keys_or_single<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeyList {
        One(String),
        Many(Vec<String>),
    }
    Ok(match KeyList::deserialize(deserializer)? {
        KeyList::One(key) => vec![key],
        KeyList::Many(keys) => keys,
    })
}

/// 配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 是否打印请求体
    #[serde(default)]
    pub log_req_body: bool,
    /// 是否打印响应体
    #[serde(default)]
    pub log_res_body: bool,
    /// 请求未显式指定 reasoning effort 时使用的默认值
    #[serde(default)]
    pub reasoning_effort: Option<String>,
    /// 提供商配置列表（支持多个轮询）
    #[serde(default)]
    pub provider: Vec<ProviderConfig>,
}

impl AtomicConfig {
    /// 初始化配置，从指定路径或默认路径加载
    pub fn init() -> Self {
        let config_path = env::args()
            .nth(1)
            .map_or_else(|| PathBuf::from("config.toml"), PathBuf::from);

        info!("📂 正在加载配置文件: {:?}", config_path);

        let raw_content = fs::read_to_string(&config_path).unwrap_or_default();

        // 格式化TOML并写回文件
        let formatted_content = format_toml(&raw_content);
        if let Err(e) = fs::write(&config_path, formatted_content) {
            warn!("写入格式化配置失败: {}", e);
        }

        let config = Self::load_from_file(&config_path).unwrap_or_else(|e| {
            warn!("⚠️  配置加载失败: {}，退出中", e);
            process::exit(1); // 非零退出码表示异常退出
        });

        info!("✅ 配置已加载:");
        Self::log_config(&config);

        // 创建 Provider 选择器（双层轮询）
        let provider_selector = ProviderSelector::new(config.provider.clone()).map(Arc::new);

        Self {
            inner: ArcSwap::from(Arc::new(config)),
            config_path,
            provider_selector: ArcSwap::from(Arc::new(provider_selector)),
        }
    }

    fn log_config(config: &Config) {
        info!("provider 数量: {} 个", config.provider.len());
        for (i, p) in config.provider.iter().enumerate() {
            info!(
                "  [{}] name={}, base_url={}, model={}, api_keys={} 个",
                i,
                p.name,
                p.base_url,
                p.model,
                p.api_keys.len()
            );
            for (j, key) in p.api_keys.iter().enumerate() {
                info!(
                    "      api_key[{}]: {}***",
                    j,
                    key.chars().take(8).collect::<String>()
                );
            }
        }
        info!("reasoning_effort 默认值: {:?}", config.reasoning_effort);
        info!("log_req_body: {}", config.log_req_body);
        info!("log_res_body: {}", config.log_res_body);
    }

    /// 从文件加载配置
    fn load_from_file(path: impl AsRef<Path>) -> Result<Config, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {e}"))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| format!("Failed to parse TOML: {e}"))?;

        Ok(config)
    }

    /// 获取当前配置的 Guard（读操作）
    pub fn get(&self) -> Guard<Arc<Config>> {
        self.inner.load()
    }

    /// 获取 Provider 选择器（双层轮询）
    pub fn get_provider_selector(&self) -> Option<Arc<ProviderSelector>> {
        (**self.provider_selector.load()).clone()
    }

    /// 重新加载配置
    pub fn reload(&self) {
        // 添加短暂延迟，确保文件写入完成
        std::thread::sleep(Duration::from_millis(50));

        info!("🔄 检测到配置文件变更，正在重新加载...");

        match Self::load_from_file(&self.config_path) {
            Ok(new_config) => {
                let old = self.inner.load();

                // 检测配置是否真的发生了变化
                let provider_changed = old.provider != new_config.provider;
                let others_changed = old.log_req_body != new_config.log_req_body
                    || old.log_res_body != new_config.log_res_body
                    || old.reasoning_effort != new_config.reasoning_effort;
                self.inner.store(Arc::new(new_config.clone()));

                // 更新 Provider 选择器
                if provider_changed {
                    let new_selector =
                        ProviderSelector::new(new_config.provider.clone()).map(Arc::new);
                    self.provider_selector.store(Arc::new(new_selector));
                }

                if provider_changed || others_changed {
                    info!("✅ 配置已更新:");
                    Self::log_config(&new_config);
                } else {
                    info!("ℹ️ 配置文件内容未变化");
                }
            }
            Err(e) => {
                error!("❌ 配置重载失败: {}", e);
            }
        }
    }

    /// 启动配置文件监听（跨平台）
    ///
    /// 使用 `notify` crate 实现跨平台文件监听，支持 Windows/Linux/macOS
    /// 当文件被修改时自动重载配置
    pub fn start_watcher(self: Arc<Self>) {
        std::thread::spawn(move || {
            let config_path = self.config_path.clone();

            // 创建跨平台 watcher
            let mut watcher =
                match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                    match res {
                        Ok(event) => {
                            if matches!(
                                event.kind,
                                EventKind::Access(AccessKind::Close(AccessMode::Write))
                            ) {
                                std::thread::sleep(Duration::from_millis(50));
                                self.reload();
                            }
                        }
                        Err(e) => error!("Config watch error: {}", e),
                    }
                }) {
                    Ok(w) => w,
                    Err(e) => {
                        error!("Failed to initialize watcher: {}", e);
                        return;
                    }
                };

            // 添加监听
            if let Err(e) = watcher.watch(&config_path, RecursiveMode::NonRecursive) {
                error!("Failed to add watch for config file: {}", e);
                return;
            }

            info!("👁️  配置文件监听已启动: {:?}", config_path);

            // 永久挂起线程，保 watcher 不被 drop
            std::thread::park();
        });
    }
}
