//! 關聯契約
//!
//! 擁有者（虛擬機）載入時呼叫 `load`，儲存自身時呼叫 `persist`。

use vbox_core::{MachineRef, Result, StoreConfig};

use crate::SaveReport;

/// 由擁有者直接驅動的關聯集合
pub trait Relationship: Sized {
    /// 載入所需的外部來源
    type Source;

    /// 從外部來源載入完整內容，結果為乾淨狀態
    fn load(owner: &MachineRef, source: Self::Source, config: &StoreConfig) -> Result<Self>;

    /// 將上次載入或儲存後的變更寫回外部
    fn persist(&mut self) -> Result<SaveReport>;

    /// 是否有尚未儲存的變更
    fn has_changes(&self) -> bool;
}
