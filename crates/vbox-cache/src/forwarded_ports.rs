//! NAT 轉發埠集合

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use vbox_core::{
    DriverError, ForwardedPort, MachineRef, NatEngineInterface, Result, SavePolicy, StoreConfig,
    VboxError,
};

use crate::{DirtyTracker, Relationship, SaveReport};

/// 指定插槽的 NAT 網卡
#[derive(Clone)]
pub struct NatAdapter {
    pub interface: Arc<dyn NatEngineInterface>,
    pub slot: u32,
}

impl NatAdapter {
    pub fn new(interface: Arc<dyn NatEngineInterface>, slot: u32) -> Self {
        Self { interface, slot }
    }
}

impl fmt::Debug for NatAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NatAdapter").field("slot", &self.slot).finish()
    }
}

/// 轉發埠集合（依規則名稱）
#[derive(Debug)]
pub struct ForwardedPorts {
    owner: MachineRef,
    adapter: NatAdapter,
    save_policy: SavePolicy,
    ports: BTreeMap<String, ForwardedPort>,
    tracker: DirtyTracker<String, Option<ForwardedPort>>,
}

impl ForwardedPorts {
    /// 以預設配置載入指定網卡的轉發規則
    pub fn populate(owner: MachineRef, adapter: NatAdapter) -> Result<Self> {
        Self::populate_with_config(owner, adapter, StoreConfig::default())
    }

    /// 載入指定網卡的轉發規則
    pub fn populate_with_config(
        owner: MachineRef,
        adapter: NatAdapter,
        config: StoreConfig,
    ) -> Result<Self> {
        let rules = adapter
            .interface
            .redirects(adapter.slot)
            .map_err(|source| VboxError::external(format!("nat:{}", adapter.slot), source))?;

        let mut ports = BTreeMap::new();
        for rule in rules {
            let port: ForwardedPort = rule.parse()?;
            ports.insert(port.name.clone(), port);
        }

        tracing::info!(
            "載入轉發埠：{}，插槽 {}，共 {} 筆",
            owner,
            adapter.slot,
            ports.len()
        );
        Ok(Self {
            owner,
            adapter,
            save_policy: config.save_policy,
            ports,
            tracker: DirtyTracker::new(),
        })
    }

    /// 新增或取代同名規則，回傳被取代的規則
    ///
    /// 無法以文字格式寫出並解析回來的規則會被拒絕，集合保持不變。
    pub fn insert(&mut self, port: ForwardedPort) -> Result<Option<ForwardedPort>> {
        port.validate()?;

        let prior = self.ports.get(&port.name).cloned();
        self.tracker.mark_dirty(port.name.clone(), prior);
        Ok(self.ports.insert(port.name.clone(), port))
    }

    /// 移除規則（儲存時才寫回）
    pub fn remove(&mut self, name: &str) -> Option<ForwardedPort> {
        let removed = self.ports.remove(name)?;
        self.tracker.mark_dirty(name.to_string(), Some(removed.clone()));
        Some(removed)
    }

    /// 將變更寫回 NAT 引擎
    ///
    /// 變更的規則先移除舊規則再新增；失敗的規則保持為髒。`FailFast` 遇到第一個
    /// 失敗即停止，`Continue` 嘗試所有規則後回報 `PartialSave`。
    pub fn save(&mut self) -> Result<SaveReport> {
        let mut report = SaveReport::default();
        let mut failed = Vec::new();

        for name in self.tracker.get_dirty_keys() {
            if let Err(source) = self.persist_rule(&name, &mut report) {
                tracing::warn!("寫回轉發規則 {} 失敗: {}", name, source);
                match self.save_policy {
                    SavePolicy::FailFast => return Err(VboxError::external(name, source)),
                    SavePolicy::Continue => failed.push(name),
                }
            }
        }

        if !report.is_empty() {
            tracing::info!(
                "儲存轉發埠：{}，新增 {} 筆，移除 {} 筆",
                self.owner,
                report.written.len(),
                report.removed.len()
            );
        }

        if !failed.is_empty() {
            return Err(VboxError::PartialSave { failed });
        }
        Ok(report)
    }

    fn persist_rule(
        &mut self,
        name: &str,
        report: &mut SaveReport,
    ) -> std::result::Result<(), DriverError> {
        let slot = self.adapter.slot;
        let baseline = self.tracker.baseline(name).cloned().flatten();
        let current = self.ports.get(name).cloned();

        if baseline == current {
            self.tracker.clean(name);
            return Ok(());
        }

        if baseline.is_some() {
            tracing::debug!("移除轉發規則 {}（插槽 {}）", name, slot);
            self.adapter.interface.remove_redirect(slot, name)?;
            // 重試時不再重複移除
            self.tracker.rebase(name, None);
            report.removed.push(name.to_string());
        }

        if let Some(port) = current {
            tracing::debug!("新增轉發規則 {}（插槽 {}）", port, slot);
            self.adapter.interface.add_redirect(slot, &port)?;
            report.written.push(name.to_string());
        }

        self.tracker.clean(name);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ForwardedPort> {
        self.ports.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ForwardedPort> {
        self.ports.values()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.tracker.is_dirty(name)
    }

    pub fn has_changes(&self) -> bool {
        !self.tracker.is_empty()
    }

    pub fn slot(&self) -> u32 {
        self.adapter.slot
    }

    pub fn owner(&self) -> &MachineRef {
        &self.owner
    }
}

impl Relationship for ForwardedPorts {
    type Source = NatAdapter;

    fn load(owner: &MachineRef, source: Self::Source, config: &StoreConfig) -> Result<Self> {
        Self::populate_with_config(owner.clone(), source, config.clone())
    }

    fn persist(&mut self) -> Result<SaveReport> {
        self.save()
    }

    fn has_changes(&self) -> bool {
        ForwardedPorts::has_changes(self)
    }
}
