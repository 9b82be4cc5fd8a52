//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FORAGER__*` 覆盖（双下划线表示嵌套，如 `FORAGER__GRAPH__MAX_REVIEWS=5`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub graph: GraphSection,
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub web: WebSection,
}

/// [app] 段：应用名、工作目录、偏好文件
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工作目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    /// 用户偏好文件
    #[serde(default = "default_prefs_path")]
    pub prefs_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: None,
            prefs_path: default_prefs_path(),
        }
    }
}

fn default_prefs_path() -> PathBuf {
    PathBuf::from("user_prefs.json")
}

/// [llm] 段：后端选择与重试
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai；优先级由 API Key 与 provider 共同决定
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub deepseek: LlmModelSection,
    #[serde(default)]
    pub openai: LlmModelSection,
    #[serde(default)]
    pub retry: RetrySection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            deepseek: LlmModelSection::default(),
            openai: LlmModelSection::default(),
            retry: RetrySection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmModelSection {
    pub model: Option<String>,
}

/// [llm.retry] 段：瞬时错误的重试次数与退避单位
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 退避单位（毫秒），第 n 次失败后等待 unit * 2^n
    #[serde(default = "default_unit_ms")]
    pub unit_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            unit_ms: default_unit_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_unit_ms() -> u64 {
    1000
}

/// [graph] 段：执行图参数
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSection {
    /// Validator 最多评审次数，达到后不再打回
    #[serde(default = "default_max_reviews")]
    pub max_reviews: u32,
    /// 单次运行最多执行的节点数（防止路由成环）
    #[serde(default = "default_max_node_steps")]
    pub max_node_steps: usize,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            max_reviews: default_max_reviews(),
            max_node_steps: default_max_node_steps(),
        }
    }
}

fn default_max_reviews() -> u32 {
    3
}

fn default_max_node_steps() -> usize {
    100
}

/// [tools] 段：工具超时、笔记目录、搜索参数
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）；工具自身声明的时长更长时以工具为准
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    /// save_to_notes 写入目录
    #[serde(default = "default_notes_dir")]
    pub notes_dir: PathBuf,
    #[serde(default)]
    pub search: SearchSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            notes_dir: default_notes_dir(),
            search: SearchSection::default(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}

fn default_notes_dir() -> PathBuf {
    PathBuf::from("notes")
}

/// [tools.search] 段：Tavily 搜索的结果条数、超时与内部重试次数
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_search_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_search_retries")]
    pub retries: u32,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            timeout_secs: default_search_timeout_secs(),
            retries: default_search_retries(),
        }
    }
}

fn default_max_results() -> usize {
    5
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_search_retries() -> u32 {
    3
}

/// [session] 段：检查点存储
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    /// SQLite 文件路径；未设置（或未启用 async-sqlite）时用内存存储
    pub db_path: Option<PathBuf>,
    /// 空闲会话保留时长（秒）
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            db_path: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    24 * 3600
}

/// [web] 段
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    8000
}

/// 从 config 目录加载配置，环境变量 FORAGER__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FORAGER__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(
                config::File::with_name(name).required(false),
            );
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FORAGER")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载配置，失败时告警并使用默认值
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    })
}
