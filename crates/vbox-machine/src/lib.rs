//! # VirtualBox ORM Machine
//!
//! 擁有關聯集合的虛擬機實體

pub mod machine;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vbox_cache::SaveReport;

// Re-export 主要類型
pub use machine::Machine;

/// 虛擬機儲存結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSaveReport {
    /// 客體屬性
    pub guest_properties: SaveReport,

    /// 各 NAT 插槽的轉發埠
    pub forwarded_ports: BTreeMap<u32, SaveReport>,
}

impl MachineSaveReport {
    /// 是否沒有任何外部呼叫
    pub fn is_empty(&self) -> bool {
        self.guest_properties.is_empty() && self.forwarded_ports.values().all(SaveReport::is_empty)
    }
}
