//! 外部控制介面
//!
//! 實際發出虛擬機管理器呼叫的驅動層由外部提供，儲存區只透過這兩個
//! trait 存取它。

use crate::nat::ForwardedPort;
use crate::property::Enumeration;

/// 驅動層錯誤
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct DriverError(pub String);

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// 客體屬性介面
pub trait GuestPropertyInterface: Send + Sync {
    /// 列舉符合模式的客體屬性（空模式代表全部）
    ///
    /// 回傳四個長度相同的平行序列。
    fn enumerate(&self, pattern: &str) -> Result<Enumeration, DriverError>;

    /// 設置屬性值，`None` 代表移除屬性
    ///
    /// 對已不存在的鍵設置 `None` 不是錯誤。
    fn set_value(&self, key: &str, value: Option<&str>) -> Result<(), DriverError>;
}

/// NAT 引擎介面
pub trait NatEngineInterface: Send + Sync {
    /// 取得指定網卡插槽的轉發規則字串
    fn redirects(&self, slot: u32) -> Result<Vec<String>, DriverError>;

    /// 新增轉發規則
    fn add_redirect(&self, slot: u32, port: &ForwardedPort) -> Result<(), DriverError>;

    /// 依名稱移除轉發規則
    fn remove_redirect(&self, slot: u32, name: &str) -> Result<(), DriverError>;
}
