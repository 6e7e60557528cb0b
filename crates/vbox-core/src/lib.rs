//! # VirtualBox ORM Core
//!
//! 核心資料模型、外部介面與類型定義

pub mod config;
pub mod interface;
pub mod machine;
pub mod memory;
pub mod nat;
pub mod property;
pub mod reserved;

// Re-export 主要類型
pub use config::{SavePolicy, StoreConfig};
pub use interface::{DriverError, GuestPropertyInterface, NatEngineInterface};
pub use machine::MachineRef;
pub use memory::{DriverCall, InMemoryDriver};
pub use nat::{ForwardedPort, Protocol};
pub use property::{Enumeration, GuestPropertyRecord, PropertyFlags, PropertyValue};
pub use reserved::{is_reserved, RESERVED_PREFIX};

/// ORM 錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum VboxError {
    #[error("資料完整性錯誤: {0}")]
    Integrity(String),

    #[error("外部呼叫失敗 (鍵: {key}): {source}")]
    ExternalCall {
        key: String,
        #[source]
        source: DriverError,
    },

    #[error("部分儲存失敗: {}", failed.join(", "))]
    PartialSave { failed: Vec<String> },

    #[error("無效的轉發規則: {0}")]
    InvalidRedirect(String),

    #[error("配置錯誤: {0}")]
    Config(String),
}

impl VboxError {
    /// 包裝外部呼叫錯誤
    pub fn external(key: impl Into<String>, source: DriverError) -> Self {
        Self::ExternalCall {
            key: key.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VboxError>;
