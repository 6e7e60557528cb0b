//! 儲存區配置模型

use serde::{Deserialize, Serialize};

use crate::{Result, VboxError};

/// 關聯儲存區配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 列舉時使用的模式（空字串代表全部）
    pub enumerate_pattern: String,

    /// 儲存失敗時的處理策略（客體屬性與轉發埠皆適用）
    pub save_policy: SavePolicy,
}

impl StoreConfig {
    /// 創建預設配置
    pub fn new() -> Self {
        Self {
            enumerate_pattern: String::new(),
            save_policy: SavePolicy::FailFast,
        }
    }

    /// 建構器模式：設置列舉模式
    pub fn with_enumerate_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.enumerate_pattern = pattern.into();
        self
    }

    /// 建構器模式：設置儲存策略
    ///
    /// # 範例
    /// ```
    /// # use vbox_core::{SavePolicy, StoreConfig};
    /// let config = StoreConfig::new().with_save_policy(SavePolicy::Continue);
    /// assert_eq!(config.save_policy, SavePolicy::Continue);
    /// ```
    pub fn with_save_policy(mut self, policy: SavePolicy) -> Self {
        self.save_policy = policy;
        self
    }

    /// 從 JSON 解析配置
    pub fn from_json(input: &str) -> Result<Self> {
        serde_json::from_str(input).map_err(|e| VboxError::Config(e.to_string()))
    }

    /// 序列化為 JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VboxError::Config(e.to_string()))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// 儲存策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SavePolicy {
    /// 遇到第一個失敗立即停止
    FailFast,
    /// 嘗試所有髒鍵（或規則），最後彙報失敗
    Continue,
}
