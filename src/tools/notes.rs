//! save_to_notes 工具：把内容追加到 `<notes_dir>/<topic>.txt`
//!
//! 敏感工具，执行前须经审批。topic 只保留字母数字、空格、`-`、`_`，空格转下划线，清洗后为空则用 general。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::tools::Tool;

const DEFAULT_TOPIC: &str = "general";

/// 笔记工具
pub struct NotesTool {
    dir: PathBuf,
}

impl NotesTool {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// 清洗 topic 为安全文件名
pub fn sanitize_topic(topic: &str) -> String {
    let kept: String = topic
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let name = kept.trim().replace(' ', "_");
    if name.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        name
    }
}

/// 单条笔记的追加格式
fn entry(timestamp: &str, content: &str) -> String {
    format!("\n\n--- {} ---\n{}", timestamp, content)
}

#[async_trait]
impl Tool for NotesTool {
    fn name(&self) -> &str {
        "save_to_notes"
    }

    fn description(&self) -> &str {
        "Save important information to research notes. Specify a topic for organization. Args: {\"content\": \"...\", \"topic\": \"general\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "Text to save" },
                "topic": { "type": "string", "description": "Notes file topic", "default": DEFAULT_TOPIC }
            },
            "required": ["content"]
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing content".to_string())?;
        let topic = args
            .get("topic")
            .and_then(|v| v.as_str())
            .unwrap_or(DEFAULT_TOPIC);
        let file_name = format!("{}.txt", sanitize_topic(topic));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| format!("Error saving notes: {}", e))?;
        let path = self.dir.join(&file_name);
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| format!("Error saving notes: {}", e))?;
        file.write_all(entry(&timestamp, content).as_bytes())
            .await
            .map_err(|e| format!("Error saving notes: {}", e))?;
        file.flush()
            .await
            .map_err(|e| format!("Error saving notes: {}", e))?;

        Ok(format!("Saved to {}", path.display()))
    }
}
