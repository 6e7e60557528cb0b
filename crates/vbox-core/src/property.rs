//! 客體屬性模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, VboxError};

/// 屬性值
///
/// 記憶體中保留原始類型，直到寫回外部介面時才轉為字串。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// 布林值
    Boolean(bool),
    /// 整數
    Integer(i64),
    /// 文字
    Text(String),
}

impl PropertyValue {
    /// 取得文字內容（僅限文字類型）
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// 轉換為外部介面使用的字串表示
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(value) => write!(f, "{}", value),
            PropertyValue::Integer(value) => write!(f, "{}", value),
            PropertyValue::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Integer(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

impl PartialEq<&str> for PropertyValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

/// 屬性旗標（例如 `TRANSIENT`、`RDONLYGUEST`）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFlags(Vec<String>);

impl PropertyFlags {
    /// 解析以逗號分隔的旗標字串
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|flag| !flag.is_empty())
                .map(str::to_ascii_uppercase)
                .collect(),
        )
    }

    /// 檢查是否包含指定旗標（不分大小寫）
    pub fn contains(&self, flag: &str) -> bool {
        self.0.iter().any(|f| f.eq_ignore_ascii_case(flag))
    }

    /// 暫時性屬性（虛擬機關閉後消失）
    pub fn is_transient(&self) -> bool {
        self.contains("TRANSIENT") || self.contains("TRANSRESET")
    }

    /// 客體端唯讀
    pub fn is_read_only_guest(&self) -> bool {
        self.contains("RDONLYGUEST") || self.contains("READONLY")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PropertyFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

/// 一筆列舉出的客體屬性
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestPropertyRecord {
    /// 屬性鍵
    pub key: String,

    /// 屬性值
    pub value: String,

    /// 最後修改時間
    pub timestamp: DateTime<Utc>,

    /// 旗標
    pub flags: PropertyFlags,
}

/// 外部列舉結果（四個平行序列）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration {
    pub keys: Vec<String>,
    pub values: Vec<String>,
    /// 自 Unix 紀元起的奈秒數
    pub timestamps: Vec<i64>,
    pub flags: Vec<String>,
}

impl Enumeration {
    /// 創建空的列舉結果
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一筆屬性
    pub fn push(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        timestamp: i64,
        flags: impl Into<String>,
    ) {
        self.keys.push(key.into());
        self.values.push(value.into());
        self.timestamps.push(timestamp);
        self.flags.push(flags.into());
    }

    /// 建構器模式：追加一筆屬性
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        timestamp: i64,
        flags: impl Into<String>,
    ) -> Self {
        self.push(key, value, timestamp, flags);
        self
    }

    /// 檢查四個序列長度是否一致，回傳筆數
    pub fn validate(&self) -> Result<usize> {
        let len = self.keys.len();
        if self.values.len() != len || self.timestamps.len() != len || self.flags.len() != len {
            return Err(VboxError::Integrity(format!(
                "列舉序列長度不一致：keys {}, values {}, timestamps {}, flags {}",
                len,
                self.values.len(),
                self.timestamps.len(),
                self.flags.len()
            )));
        }
        Ok(len)
    }

    /// 轉換為屬性記錄；長度不一致時整批失敗
    pub fn into_records(self) -> Result<Vec<GuestPropertyRecord>> {
        self.validate()?;

        let records = self
            .keys
            .into_iter()
            .zip(self.values)
            .zip(self.timestamps)
            .zip(self.flags)
            .map(|(((key, value), timestamp), flags)| GuestPropertyRecord {
                key,
                value,
                timestamp: DateTime::<Utc>::from_timestamp_nanos(timestamp),
                flags: PropertyFlags::parse(&flags),
            })
            .collect();

        Ok(records)
    }
}
