//! 記憶體驅動
//!
//! 以 `Mutex` 保護的映射實作兩個外部介面，記錄每一次呼叫，並可針對
//! 指定鍵注入失敗。用於測試與單機示例，不與任何虛擬機管理器通訊。

use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::interface::{DriverError, GuestPropertyInterface, NatEngineInterface};
use crate::nat::ForwardedPort;
use crate::property::Enumeration;

/// 驅動收到的呼叫
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Enumerate { pattern: String },
    SetValue { key: String, value: Option<String> },
    Redirects { slot: u32 },
    AddRedirect { slot: u32, rule: String },
    RemoveRedirect { slot: u32, name: String },
}

impl DriverCall {
    /// 是否為寫入呼叫
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            DriverCall::SetValue { .. }
                | DriverCall::AddRedirect { .. }
                | DriverCall::RemoveRedirect { .. }
        )
    }
}

#[derive(Debug, Clone)]
struct StoredProperty {
    value: String,
    timestamp: i64,
    flags: String,
}

#[derive(Debug, Default)]
struct DriverState {
    properties: BTreeMap<String, StoredProperty>,
    redirects: BTreeMap<u32, Vec<ForwardedPort>>,
    calls: Vec<DriverCall>,
    failing: HashSet<String>,
}

/// 記憶體驅動
#[derive(Debug, Default)]
pub struct InMemoryDriver {
    state: Mutex<DriverState>,
}

impl InMemoryDriver {
    /// 創建空的驅動
    pub fn new() -> Self {
        Self::default()
    }

    /// 直接寫入屬性（不記錄呼叫）
    pub fn seed_property(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        flags: impl Into<String>,
    ) {
        let property = StoredProperty {
            value: value.into(),
            timestamp: now_nanos(),
            flags: flags.into(),
        };
        self.state().properties.insert(key.into(), property);
    }

    /// 直接寫入轉發規則（不記錄呼叫）
    pub fn seed_redirect(&self, slot: u32, port: ForwardedPort) {
        self.state().redirects.entry(slot).or_default().push(port);
    }

    /// 之後對此鍵（或規則名稱）的寫入呼叫一律失敗
    pub fn fail_on(&self, key: impl Into<String>) {
        self.state().failing.insert(key.into());
    }

    /// 取消失敗注入
    pub fn recover(&self, key: &str) {
        self.state().failing.remove(key);
    }

    /// 讀取驅動端目前的屬性值
    pub fn property(&self, key: &str) -> Option<String> {
        self.state().properties.get(key).map(|p| p.value.clone())
    }

    /// 驅動端目前的屬性數量
    pub fn property_count(&self) -> usize {
        self.state().properties.len()
    }

    /// 驅動端目前的轉發規則
    pub fn redirect_rules(&self, slot: u32) -> Vec<ForwardedPort> {
        self.state().redirects.get(&slot).cloned().unwrap_or_default()
    }

    /// 所有呼叫記錄（依發生順序）
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state().calls.clone()
    }

    /// 僅寫入呼叫
    pub fn write_calls(&self) -> Vec<DriverCall> {
        self.state().calls.iter().filter(|c| c.is_write()).cloned().collect()
    }

    /// 清除呼叫記錄
    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn state(&self) -> MutexGuard<'_, DriverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GuestPropertyInterface for InMemoryDriver {
    fn enumerate(&self, pattern: &str) -> Result<Enumeration, DriverError> {
        let mut state = self.state();
        state.calls.push(DriverCall::Enumerate {
            pattern: pattern.to_string(),
        });

        let mut enumeration = Enumeration::new();
        for (key, property) in &state.properties {
            if matches_pattern(pattern, key) {
                enumeration.push(
                    key.clone(),
                    property.value.clone(),
                    property.timestamp,
                    property.flags.clone(),
                );
            }
        }
        Ok(enumeration)
    }

    fn set_value(&self, key: &str, value: Option<&str>) -> Result<(), DriverError> {
        let mut state = self.state();
        state.calls.push(DriverCall::SetValue {
            key: key.to_string(),
            value: value.map(str::to_string),
        });

        if state.failing.contains(key) {
            return Err(DriverError::new(format!("注入的失敗：{}", key)));
        }

        match value {
            Some(value) => {
                let flags = state.properties.get(key).map(|p| p.flags.clone()).unwrap_or_default();
                state.properties.insert(
                    key.to_string(),
                    StoredProperty {
                        value: value.to_string(),
                        timestamp: now_nanos(),
                        flags,
                    },
                );
            }
            None => {
                state.properties.remove(key);
            }
        }
        Ok(())
    }
}

impl NatEngineInterface for InMemoryDriver {
    fn redirects(&self, slot: u32) -> Result<Vec<String>, DriverError> {
        let mut state = self.state();
        state.calls.push(DriverCall::Redirects { slot });

        Ok(state
            .redirects
            .get(&slot)
            .map(|ports| ports.iter().map(ToString::to_string).collect())
            .unwrap_or_default())
    }

    fn add_redirect(&self, slot: u32, port: &ForwardedPort) -> Result<(), DriverError> {
        let mut state = self.state();
        state.calls.push(DriverCall::AddRedirect {
            slot,
            rule: port.to_string(),
        });

        if state.failing.contains(&port.name) {
            return Err(DriverError::new(format!("注入的失敗：{}", port.name)));
        }

        let ports = state.redirects.entry(slot).or_default();
        if ports.iter().any(|p| p.name == port.name) {
            return Err(DriverError::new(format!("轉發規則已存在：{}", port.name)));
        }
        ports.push(port.clone());
        Ok(())
    }

    fn remove_redirect(&self, slot: u32, name: &str) -> Result<(), DriverError> {
        let mut state = self.state();
        state.calls.push(DriverCall::RemoveRedirect {
            slot,
            name: name.to_string(),
        });

        if state.failing.contains(name) {
            return Err(DriverError::new(format!("注入的失敗：{}", name)));
        }

        let ports = state.redirects.entry(slot).or_default();
        let before = ports.len();
        ports.retain(|p| p.name != name);
        if ports.len() == before {
            return Err(DriverError::new(format!("找不到轉發規則：{}", name)));
        }
        Ok(())
    }
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// 列舉模式比對：`|` 分隔多個模式，支援 `*` 與 `?`，空模式代表全部
fn matches_pattern(pattern: &str, key: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    pattern.split('|').any(|glob| glob_match(glob.as_bytes(), key.as_bytes()))
}

fn glob_match(glob: &[u8], text: &[u8]) -> bool {
    let (mut g, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if g < glob.len() && (glob[g] == b'?' || glob[g] == text[t]) {
            g += 1;
            t += 1;
        } else if g < glob.len() && glob[g] == b'*' {
            star = Some((g, t));
            g += 1;
        } else if let Some((star_g, star_t)) = star {
            // 回溯：讓星號多吃一個字元
            g = star_g + 1;
            t = star_t + 1;
            star = Some((star_g, star_t + 1));
        } else {
            return false;
        }
    }

    glob[g..].iter().all(|&c| c == b'*')
}
