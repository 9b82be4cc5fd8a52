//! 用户偏好：进程启动时从 user_prefs.json 读取一次，显式传给需要拼 prompt 的节点
//!
//! CLI 的 `remember: ...` 追加 `pref_{n}` 键并写回文件，下次启动生效。

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// 偏好键值表（按键有序，保证 prompt 文本稳定）
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Preferences(BTreeMap<String, String>);

impl Preferences {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取偏好文件；文件不存在或内容损坏时返回空偏好
    pub fn load(path: &Path) -> Self {
        let Ok(raw) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str::<Self>(&raw) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable preferences: {}", e);
                Self::default()
            }
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 追加一条偏好（键为 pref_{当前条数}）并写回文件，返回使用的键
    pub fn save_pref(&mut self, path: &Path, value: &str) -> anyhow::Result<String> {
        let key = format!("pref_{}", self.0.len());
        self.0.insert(key.clone(), value.trim().to_string());
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(key)
    }

    /// prompt 中的偏好段落；无偏好时为空串
    pub fn context_line(&self) -> String {
        if self.0.is_empty() {
            return String::new();
        }
        let pairs: Vec<String> = self
            .0
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        format!("User Preferences: {{{}}}", pairs.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Preferences::load(&dir.path().join("user_prefs.json"));
        assert!(prefs.is_empty());
        assert_eq!(prefs.context_line(), "");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_prefs.json");
        let mut prefs = Preferences::load(&path);
        assert_eq!(prefs.save_pref(&path, " short answers ").unwrap(), "pref_0");
        assert_eq!(prefs.save_pref(&path, "cite sources").unwrap(), "pref_1");

        let reloaded = Preferences::load(&path);
        assert_eq!(reloaded, prefs);
        assert_eq!(reloaded.get("pref_0"), Some("short answers"));
        assert_eq!(
            reloaded.context_line(),
            "User Preferences: {pref_0: short answers, pref_1: cite sources}"
        );
    }
}
