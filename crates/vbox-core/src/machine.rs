//! 虛擬機參照

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 虛擬機參照（僅為關聯，不持有虛擬機本身）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MachineRef {
    /// 虛擬機 UUID
    pub id: Uuid,

    /// 虛擬機名稱
    pub name: String,
}

impl MachineRef {
    /// 創建新的參照
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// 以隨機 UUID 創建參照
    pub fn generate(name: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), name)
    }
}

impl fmt::Display for MachineRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
