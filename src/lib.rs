//! # VirtualBox ORM
//!
//! 把虛擬機的客體屬性與 NAT 轉發埠當作記憶體集合操作：延遲載入、本地修改、
//! 明確儲存。只有變更過的項目會寫回虛擬機管理器。
//!
//! ```
//! use std::sync::Arc;
//! use vbox_orm::{InMemoryDriver, Machine, MachineRef, StoreConfig};
//!
//! let driver = Arc::new(InMemoryDriver::new());
//! driver.seed_property("/Foo/Bar", "yes", "");
//!
//! let reference = MachineRef::generate("demo");
//! let mut machine = Machine::load(reference, driver.clone(), StoreConfig::default())?;
//! machine.guest_properties_mut().set("/Foo/Bar", "no");
//! machine.save()?;
//!
//! assert_eq!(driver.property("/Foo/Bar").as_deref(), Some("no"));
//! # Ok::<(), vbox_orm::VboxError>(())
//! ```

pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;

pub use vbox_cache::{
    DirtyTracker, ForwardedPorts, GuestProperties, Mutation, NatAdapter, Relationship, SaveReport,
};
pub use vbox_core::{
    is_reserved, DriverCall, DriverError, Enumeration, ForwardedPort, GuestPropertyInterface,
    GuestPropertyRecord, InMemoryDriver, MachineRef, NatEngineInterface, PropertyFlags,
    PropertyValue, Protocol, Result, SavePolicy, StoreConfig, VboxError, RESERVED_PREFIX,
};
pub use vbox_machine::{Machine, MachineSaveReport};
