//! # VirtualBox ORM Cache
//!
//! 髒標記追蹤與關聯集合（客體屬性、NAT 轉發埠）

pub mod dirty_tracking;
pub mod forwarded_ports;
pub mod guest_properties;
pub mod relationship;

use serde::{Deserialize, Serialize};

// Re-export 主要類型
pub use dirty_tracking::DirtyTracker;
pub use forwarded_ports::{ForwardedPorts, NatAdapter};
pub use guest_properties::GuestProperties;
pub use relationship::Relationship;

/// 本地修改的結果
///
/// 對保留命名空間的寫入與刪除不是錯誤，而是回傳 `Ignored`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// 已套用
    Applied,
    /// 保留鍵，已忽略
    Ignored,
}

impl Mutation {
    pub fn is_applied(self) -> bool {
        self == Mutation::Applied
    }
}

/// 儲存結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveReport {
    /// 已寫入外部介面的鍵
    pub written: Vec<String>,

    /// 已從外部介面移除的鍵
    pub removed: Vec<String>,
}

impl SaveReport {
    /// 是否沒有任何外部呼叫
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.removed.is_empty()
    }
}
