//! NAT 轉發埠模型
//!
//! 規則的文字格式：`name,proto,host_ip,host_port,guest_ip,guest_port`，
//! proto 為 `0`（UDP）或 `1`（TCP），IP 留空代表任意位址。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::VboxError;

/// 傳輸協定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    /// 規則字串中的協定代碼
    pub fn code(self) -> u8 {
        match self {
            Protocol::Udp => 0,
            Protocol::Tcp => 1,
        }
    }

    /// 由協定代碼解析
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "0" => Some(Protocol::Udp),
            "1" => Some(Protocol::Tcp),
            _ => None,
        }
    }
}

/// 轉發埠規則
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForwardedPort {
    /// 規則名稱（同一網卡內唯一）
    pub name: String,

    /// 協定
    pub protocol: Protocol,

    /// 主機位址（None 代表任意）
    pub host_ip: Option<String>,

    /// 主機埠
    pub host_port: u16,

    /// 客體位址（None 代表任意）
    pub guest_ip: Option<String>,

    /// 客體埠
    pub guest_port: u16,
}

impl ForwardedPort {
    /// 創建新的 TCP 轉發規則
    pub fn new(name: impl Into<String>, host_port: u16, guest_port: u16) -> Self {
        Self {
            name: name.into(),
            protocol: Protocol::Tcp,
            host_ip: None,
            host_port,
            guest_ip: None,
            guest_port,
        }
    }

    /// 建構器模式：設置協定
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// 建構器模式：設置主機位址
    pub fn with_host_ip(mut self, ip: impl Into<String>) -> Self {
        self.host_ip = Some(ip.into());
        self
    }

    /// 建構器模式：設置客體位址
    pub fn with_guest_ip(mut self, ip: impl Into<String>) -> Self {
        self.guest_ip = Some(ip.into());
        self
    }

    /// 檢查規則能否以文字格式寫出並原樣解析回來
    pub fn validate(&self) -> Result<(), VboxError> {
        check_field("規則名稱", &self.name)?;
        if let Some(ip) = &self.host_ip {
            check_field("主機位址", ip)?;
        }
        if let Some(ip) = &self.guest_ip {
            check_field("客體位址", ip)?;
        }
        Ok(())
    }
}

fn check_field(label: &str, value: &str) -> Result<(), VboxError> {
    if value.is_empty() {
        return Err(VboxError::InvalidRedirect(format!("{}不可為空", label)));
    }
    if value.contains(',') {
        return Err(VboxError::InvalidRedirect(format!("{}不可包含逗號：{:?}", label, value)));
    }
    if value.trim() != value {
        return Err(VboxError::InvalidRedirect(format!("{}前後不可有空白：{:?}", label, value)));
    }
    Ok(())
}

impl fmt::Display for ForwardedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{}",
            self.name,
            self.protocol.code(),
            self.host_ip.as_deref().unwrap_or(""),
            self.host_port,
            self.guest_ip.as_deref().unwrap_or(""),
            self.guest_port
        )
    }
}

impl FromStr for ForwardedPort {
    type Err = VboxError;

    fn from_str(rule: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = rule.split(',').collect();
        if fields.len() != 6 {
            return Err(VboxError::InvalidRedirect(format!(
                "欄位數量應為 6，實際 {}：{}",
                fields.len(),
                rule
            )));
        }

        let name = fields[0].trim();
        if name.is_empty() {
            return Err(VboxError::InvalidRedirect(format!("缺少規則名稱：{}", rule)));
        }

        let protocol = Protocol::from_code(fields[1])
            .ok_or_else(|| VboxError::InvalidRedirect(format!("未知的協定代碼：{}", fields[1])))?;

        Ok(Self {
            name: name.to_string(),
            protocol,
            host_ip: parse_ip(fields[2]),
            host_port: parse_port(fields[3], rule)?,
            guest_ip: parse_ip(fields[4]),
            guest_port: parse_port(fields[5], rule)?,
        })
    }
}

fn parse_ip(field: &str) -> Option<String> {
    let field = field.trim();
    (!field.is_empty()).then(|| field.to_string())
}

fn parse_port(field: &str, rule: &str) -> Result<u16, VboxError> {
    field
        .trim()
        .parse()
        .map_err(|_| VboxError::InvalidRedirect(format!("無效的埠號 {:?}：{}", field, rule)))
}
