//! 虛擬機實體

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;
use vbox_cache::{ForwardedPorts, GuestProperties, NatAdapter, Relationship};
use vbox_core::{GuestPropertyInterface, MachineRef, NatEngineInterface, Result, StoreConfig};

use crate::MachineSaveReport;

/// 虛擬機
///
/// 載入時建立各關聯集合，儲存時依序寫回。
#[derive(Debug)]
pub struct Machine {
    reference: MachineRef,
    config: StoreConfig,
    guest_properties: GuestProperties,
    forwarded_ports: BTreeMap<u32, ForwardedPorts>,
}

impl Machine {
    /// 載入虛擬機的客體屬性
    pub fn load(
        reference: MachineRef,
        properties: Arc<dyn GuestPropertyInterface>,
        config: StoreConfig,
    ) -> Result<Self> {
        let guest_properties = GuestProperties::load(&reference, properties, &config)?;

        Ok(Self {
            reference,
            config,
            guest_properties,
            forwarded_ports: BTreeMap::new(),
        })
    }

    /// 載入指定 NAT 插槽的轉發埠；已載入的插槽會被重新載入
    pub fn attach_nat(
        &mut self,
        interface: Arc<dyn NatEngineInterface>,
        slot: u32,
    ) -> Result<&mut ForwardedPorts> {
        let adapter = NatAdapter::new(interface, slot);
        let ports = ForwardedPorts::load(&self.reference, adapter, &self.config)?;

        let ports = match self.forwarded_ports.entry(slot) {
            Entry::Occupied(mut entry) => {
                tracing::debug!("重新載入插槽 {} 的轉發埠", slot);
                entry.insert(ports);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(ports),
        };
        Ok(ports)
    }

    /// 儲存所有關聯；任一關聯回報錯誤即停止，各關聯依配置的策略處理失敗
    pub fn save(&mut self) -> Result<MachineSaveReport> {
        let mut report = MachineSaveReport {
            guest_properties: self.guest_properties.persist()?,
            ..Default::default()
        };

        for (slot, ports) in &mut self.forwarded_ports {
            report.forwarded_ports.insert(*slot, ports.persist()?);
        }

        tracing::info!("儲存虛擬機：{}", self.reference);
        Ok(report)
    }

    /// 是否有尚未儲存的變更
    pub fn has_changes(&self) -> bool {
        self.guest_properties.has_changes()
            || self
                .forwarded_ports
                .values()
                .any(ForwardedPorts::has_changes)
    }

    pub fn reference(&self) -> &MachineRef {
        &self.reference
    }

    pub fn id(&self) -> Uuid {
        self.reference.id
    }

    pub fn name(&self) -> &str {
        &self.reference.name
    }

    pub fn guest_properties(&self) -> &GuestProperties {
        &self.guest_properties
    }

    pub fn guest_properties_mut(&mut self) -> &mut GuestProperties {
        &mut self.guest_properties
    }

    pub fn forwarded_ports(&self, slot: u32) -> Option<&ForwardedPorts> {
        self.forwarded_ports.get(&slot)
    }

    pub fn forwarded_ports_mut(&mut self, slot: u32) -> Option<&mut ForwardedPorts> {
        self.forwarded_ports.get_mut(&slot)
    }
}
