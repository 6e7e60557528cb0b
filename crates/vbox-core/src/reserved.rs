//! 保留命名空間判斷

/// 虛擬機管理器自身擁有的鍵前綴
pub const RESERVED_PREFIX: &str = "/VirtualBox";

/// 檢查鍵是否位於保留命名空間
///
/// 保留鍵可以在載入後出現，但不能經由儲存區修改或刪除。
pub fn is_reserved(key: &str) -> bool {
    key.starts_with(RESERVED_PREFIX)
}
