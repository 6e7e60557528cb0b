//! 客體屬性儲存區
//!
//! 以鍵值映射呈現虛擬機的客體屬性命名空間。載入後為乾淨狀態；`set`
//! 只修改記憶體並標記為髒，`save` 只把髒鍵寫回外部介面；`delete` 則
//! 立即呼叫外部介面。保留命名空間（`/VirtualBox` 開頭）的鍵在本地唯讀。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use vbox_core::{
    is_reserved, GuestPropertyInterface, GuestPropertyRecord, MachineRef, PropertyValue, Result,
    SavePolicy, StoreConfig, VboxError,
};

use crate::{DirtyTracker, Mutation, Relationship, SaveReport};

/// 客體屬性儲存區
pub struct GuestProperties {
    /// 擁有者（僅為關聯）
    owner: MachineRef,

    /// 外部介面
    interface: Arc<dyn GuestPropertyInterface>,

    config: StoreConfig,

    /// 目前的值；`None` 代表儲存時刪除
    entries: HashMap<String, Option<PropertyValue>>,

    /// 上次載入時的時間戳與旗標
    records: HashMap<String, GuestPropertyRecord>,

    tracker: DirtyTracker<String, Option<PropertyValue>>,
}

impl GuestProperties {
    /// 以預設配置載入
    pub fn populate(owner: MachineRef, interface: Arc<dyn GuestPropertyInterface>) -> Result<Self> {
        Self::populate_with_config(owner, interface, StoreConfig::default())
    }

    /// 載入完整內容
    ///
    /// 只呼叫一次列舉；載入的值不標記為髒。列舉結果長度不一致時整批失敗。
    pub fn populate_with_config(
        owner: MachineRef,
        interface: Arc<dyn GuestPropertyInterface>,
        config: StoreConfig,
    ) -> Result<Self> {
        let mut store = Self {
            owner,
            interface,
            config,
            entries: HashMap::new(),
            records: HashMap::new(),
            tracker: DirtyTracker::new(),
        };
        store.fetch()?;

        tracing::info!("載入客體屬性：{}，共 {} 筆", store.owner, store.entries.len());
        Ok(store)
    }

    /// 重新列舉，捨棄所有未儲存的變更
    pub fn reload(&mut self) -> Result<()> {
        if !self.tracker.is_empty() {
            tracing::debug!("重新載入將捨棄 {} 個未儲存的變更", self.tracker.len());
        }
        self.fetch()
    }

    fn fetch(&mut self) -> Result<()> {
        let pattern = self.config.enumerate_pattern.as_str();
        let records = self
            .interface
            .enumerate(pattern)
            .map_err(|source| VboxError::external(pattern, source))?
            .into_records()?;

        let mut entries = HashMap::with_capacity(records.len());
        let mut metadata = HashMap::with_capacity(records.len());
        for record in records {
            entries.insert(record.key.clone(), Some(PropertyValue::Text(record.value.clone())));
            metadata.insert(record.key.clone(), record);
        }

        self.entries = entries;
        self.records = metadata;
        self.tracker.clear();
        Ok(())
    }

    /// 檢查鍵是否位於保留命名空間
    pub fn is_reserved(key: &str) -> bool {
        is_reserved(key)
    }

    /// 設置屬性值（儲存時才寫回）
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Mutation {
        self.assign(key, Some(value.into()))
    }

    /// 標記為儲存時刪除
    pub fn remove_on_save(&mut self, key: impl Into<String>) -> Mutation {
        self.assign(key, None)
    }

    /// 設置屬性值，`None` 代表儲存時刪除
    ///
    /// 即使值與目前相同也會標記為髒。
    pub fn assign(&mut self, key: impl Into<String>, value: Option<PropertyValue>) -> Mutation {
        let key = key.into();
        if is_reserved(&key) {
            tracing::warn!("忽略對保留鍵的寫入: {}", key);
            return Mutation::Ignored;
        }

        let prior = self.entries.get(&key).cloned().flatten();
        self.tracker.mark_dirty(key.clone(), prior);
        self.entries.insert(key, value);
        Mutation::Applied
    }

    /// 立即刪除屬性
    ///
    /// 外部呼叫成功後才從記憶體移除；失敗時鍵、值與髒標記保持不變。
    pub fn delete(&mut self, key: &str) -> Result<Mutation> {
        if is_reserved(key) {
            tracing::warn!("忽略對保留鍵的刪除: {}", key);
            return Ok(Mutation::Ignored);
        }

        self.interface.set_value(key, None).map_err(|source| {
            tracing::warn!("刪除 {} 失敗: {}", key, source);
            VboxError::external(key, source)
        })?;

        self.entries.remove(key);
        self.records.remove(key);
        self.tracker.clean(key);
        tracing::debug!("已刪除客體屬性: {}", key);
        Ok(Mutation::Applied)
    }

    /// 將髒鍵寫回外部介面
    ///
    /// 每個鍵在外部呼叫成功後才清除髒標記；刪除標記的鍵在成功後從映射移除。
    /// 沒有髒鍵時不發出任何呼叫。
    pub fn save(&mut self) -> Result<SaveReport> {
        let mut report = SaveReport::default();
        if self.tracker.is_empty() {
            return Ok(report);
        }

        let mut failed = Vec::new();
        for key in self.tracker.get_dirty_keys() {
            if is_reserved(&key) {
                tracing::warn!("略過髒的保留鍵: {}", key);
                continue;
            }

            let value = self.entries.get(&key).cloned().flatten();
            let wire = value.as_ref().map(PropertyValue::to_wire);
            tracing::debug!("寫回客體屬性 {} = {:?}", key, wire);

            if let Err(source) = self.interface.set_value(&key, wire.as_deref()) {
                tracing::warn!("寫回 {} 失敗: {}", key, source);
                match self.config.save_policy {
                    SavePolicy::FailFast => return Err(VboxError::external(key, source)),
                    SavePolicy::Continue => {
                        failed.push(key);
                        continue;
                    }
                }
            }

            self.tracker.clean(&key);
            match wire {
                Some(wire) => {
                    if let Some(record) = self.records.get_mut(&key) {
                        record.value = wire;
                    }
                    report.written.push(key);
                }
                None => {
                    self.entries.remove(&key);
                    self.records.remove(&key);
                    report.removed.push(key);
                }
            }
        }

        tracing::info!(
            "儲存客體屬性：{}，寫入 {} 筆，移除 {} 筆",
            self.owner,
            report.written.len(),
            report.removed.len()
        );

        if !failed.is_empty() {
            return Err(VboxError::PartialSave { failed });
        }
        Ok(report)
    }

    /// 讀取屬性值（刪除標記視為不存在）
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key).and_then(Option::as_ref)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// 是否已標記為儲存時刪除
    pub fn is_tombstoned(&self, key: &str) -> bool {
        matches!(self.entries.get(key), Some(None))
    }

    /// 目前的屬性（不含刪除標記）
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries
            .iter()
            .filter_map(|(key, value)| value.as_ref().map(|v| (key.as_str(), v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self, key: &str) -> bool {
        self.tracker.is_dirty(key)
    }

    /// 所有髒鍵（已排序）
    pub fn dirty_keys(&self) -> Vec<String> {
        self.tracker.get_dirty_keys()
    }

    pub fn has_changes(&self) -> bool {
        !self.tracker.is_empty()
    }

    /// 載入時取得的屬性記錄（時間戳與旗標）
    ///
    /// 儲存後，寫入的鍵會更新 `value`，移除的鍵不再有記錄；載入後才新增的鍵沒有記錄。
    pub fn record(&self, key: &str) -> Option<&GuestPropertyRecord> {
        self.records.get(key)
    }

    pub fn owner(&self) -> &MachineRef {
        &self.owner
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl Relationship for GuestProperties {
    type Source = Arc<dyn GuestPropertyInterface>;

    fn load(owner: &MachineRef, source: Self::Source, config: &StoreConfig) -> Result<Self> {
        Self::populate_with_config(owner.clone(), source, config.clone())
    }

    fn persist(&mut self) -> Result<SaveReport> {
        self.save()
    }

    fn has_changes(&self) -> bool {
        GuestProperties::has_changes(self)
    }
}

impl fmt::Debug for GuestProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestProperties")
            .field("owner", &self.owner)
            .field("entries", &self.entries)
            .field("dirty", &self.tracker.get_dirty_keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use vbox_core::{DriverCall, DriverError, Enumeration, InMemoryDriver};

    fn owner() -> MachineRef {
        MachineRef::generate("test-vm")
    }

    fn set_call(key: &str, value: Option<&str>) -> DriverCall {
        DriverCall::SetValue {
            key: key.to_string(),
            value: value.map(str::to_string),
        }
    }

    /// 已載入 "/Foo/Bar" = "yes" 與一個保留鍵
    fn loaded() -> (Arc<InMemoryDriver>, GuestProperties) {
        let driver = Arc::new(InMemoryDriver::new());
        driver.seed_property("/Foo/Bar", "yes", "");
        driver.seed_property("/VirtualBox/GuestInfo/OS/Product", "Linux", "TRANSIENT, RDONLYGUEST");

        let store = GuestProperties::populate(owner(), driver.clone()).unwrap();
        driver.clear_calls();
        (driver, store)
    }

    /// 回傳長度不一致序列的介面
    struct BrokenInterface;

    impl GuestPropertyInterface for BrokenInterface {
        fn enumerate(&self, _pattern: &str) -> std::result::Result<Enumeration, DriverError> {
            let mut enumeration = Enumeration::new().with_property("/A", "1", 0, "");
            enumeration.timestamps.pop();
            Ok(enumeration)
        }

        fn set_value(
            &self,
            _key: &str,
            _value: Option<&str>,
        ) -> std::result::Result<(), DriverError> {
            Ok(())
        }
    }

    #[test]
    fn test_populate_is_clean() {
        let (driver, store) = loaded();

        assert_eq!(store.get("/Foo/Bar").unwrap(), &"yes");
        assert_eq!(store.len(), 2);
        assert!(!store.has_changes());
        assert!(driver.write_calls().is_empty());

        let record = store.record("/VirtualBox/GuestInfo/OS/Product").unwrap();
        assert!(record.flags.is_transient());
    }

    #[test]
    fn test_populate_empty() {
        let driver = Arc::new(InMemoryDriver::new());
        let store = GuestProperties::populate(owner(), driver.clone()).unwrap();

        assert!(store.is_empty());
        assert!(!store.has_changes());
        assert_eq!(
            driver.calls(),
            vec![DriverCall::Enumerate {
                pattern: String::new()
            }]
        );
    }

    #[test]
    fn test_populate_with_pattern() {
        let driver = Arc::new(InMemoryDriver::new());
        driver.seed_property("/Foo/Bar", "yes", "");
        driver.seed_property("/Other/Key", "no", "");

        let config = StoreConfig::new().with_enumerate_pattern("/Foo/*");
        let store = GuestProperties::populate_with_config(owner(), driver, config).unwrap();

        assert_eq!(store.keys().collect::<Vec<_>>(), vec!["/Foo/Bar"]);
    }

    #[test]
    fn test_populate_integrity_error() {
        let err = GuestProperties::populate(owner(), Arc::new(BrokenInterface)).unwrap_err();
        assert!(matches!(err, VboxError::Integrity(_)));
    }

    #[test]
    fn test_set_then_save() {
        let (driver, mut store) = loaded();

        assert_eq!(store.set("/Foo/Bar", "no"), Mutation::Applied);
        assert_eq!(store.dirty_keys(), vec!["/Foo/Bar".to_string()]);
        assert_eq!(store.get("/Foo/Bar").unwrap(), &"no");
        // set 不會立即呼叫外部介面
        assert!(driver.write_calls().is_empty());

        let report = store.save().unwrap();

        assert_eq!(report.written, vec!["/Foo/Bar".to_string()]);
        assert_eq!(driver.write_calls(), vec![set_call("/Foo/Bar", Some("no"))]);
        assert!(!store.has_changes());
        assert_eq!(store.get("/Foo/Bar").unwrap(), &"no");
        assert_eq!(store.record("/Foo/Bar").unwrap().value, "no");
    }

    #[test]
    fn test_set_same_value_still_dirty() {
        let (driver, mut store) = loaded();

        store.set("/Foo/Bar", "yes");
        store.set("/Foo/Bar", "yes");
        assert!(store.is_dirty("/Foo/Bar"));

        store.save().unwrap();
        assert_eq!(driver.write_calls(), vec![set_call("/Foo/Bar", Some("yes"))]);
    }

    #[test]
    fn test_save_is_idempotent() {
        let (driver, mut store) = loaded();
        store.set("/New/Key", 7);

        store.save().unwrap();
        driver.clear_calls();

        let report = store.save().unwrap();
        assert!(report.is_empty());
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_values_coerced_at_save() {
        let (driver, mut store) = loaded();
        store.set("/Count", 42);
        store.set("/Enabled", true);

        // 記憶體中保留原始類型
        assert_eq!(store.get("/Count"), Some(&PropertyValue::Integer(42)));

        store.save().unwrap();
        assert_eq!(driver.property("/Count").as_deref(), Some("42"));
        assert_eq!(driver.property("/Enabled").as_deref(), Some("true"));
    }

    #[rstest]
    #[case("/VirtualBox/GuestInfo/OS/Product")]
    #[case("/VirtualBox/HostInfo/New")]
    fn test_reserved_keys_are_read_only(#[case] key: &str) {
        let (driver, mut store) = loaded();
        let before = store.get(key).cloned();

        assert_eq!(store.set(key, "Windows"), Mutation::Ignored);
        assert_eq!(store.remove_on_save(key), Mutation::Ignored);
        assert_eq!(store.delete(key).unwrap(), Mutation::Ignored);
        store.save().unwrap();

        assert_eq!(store.get(key).cloned(), before);
        assert!(!store.is_dirty(key));
        assert!(driver.write_calls().is_empty());
    }

    #[test]
    fn test_save_skips_dirty_reserved_key() {
        let (driver, mut store) = loaded();
        let key = "/VirtualBox/GuestInfo/OS/Product".to_string();
        store.tracker.mark_dirty(key.clone(), None);
        store.set("/Foo/Bar", "no");

        store.save().unwrap();

        assert_eq!(driver.write_calls(), vec![set_call("/Foo/Bar", Some("no"))]);
        assert!(store.is_dirty(&key));
        assert_eq!(store.get(&key).unwrap(), &"Linux");
    }

    #[test]
    fn test_delete_is_eager() {
        let (driver, mut store) = loaded();

        assert_eq!(store.delete("/Foo/Bar").unwrap(), Mutation::Applied);

        assert_eq!(driver.write_calls(), vec![set_call("/Foo/Bar", None)]);
        assert!(!store.contains_key("/Foo/Bar"));
        assert_eq!(driver.property("/Foo/Bar"), None);
        assert!(store.record("/Foo/Bar").is_none());
    }

    #[test]
    fn test_delete_clears_pending_change() {
        let (driver, mut store) = loaded();
        store.set("/Foo/Bar", "no");

        store.delete("/Foo/Bar").unwrap();
        assert!(!store.is_dirty("/Foo/Bar"));

        driver.clear_calls();
        store.save().unwrap();
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_failed_delete_keeps_key() {
        let (driver, mut store) = loaded();
        store.set("/Foo/Bar", "pending");
        driver.fail_on("/Foo/Bar");

        let err = store.delete("/Foo/Bar").unwrap_err();

        assert!(matches!(err, VboxError::ExternalCall { ref key, .. } if key == "/Foo/Bar"));
        assert_eq!(store.get("/Foo/Bar").unwrap(), &"pending");
        assert!(store.is_dirty("/Foo/Bar"));
    }

    #[test]
    fn test_tombstone_round_trip() {
        let (driver, mut store) = loaded();

        store.remove_on_save("/Foo/Bar");
        assert!(store.is_tombstoned("/Foo/Bar"));
        assert!(!store.contains_key("/Foo/Bar"));

        let report = store.save().unwrap();
        assert_eq!(report.removed, vec!["/Foo/Bar".to_string()]);
        assert_eq!(driver.write_calls(), vec![set_call("/Foo/Bar", None)]);
        assert!(!store.is_tombstoned("/Foo/Bar"));
        assert!(!store.has_changes());

        driver.clear_calls();
        store.save().unwrap();
        assert!(driver.calls().is_empty());
    }

    #[test]
    fn test_fail_fast_save_keeps_failed_key_dirty() {
        let (driver, mut store) = loaded();
        store.set("/A", "1");
        store.set("/B", "2");
        store.set("/C", "3");
        driver.fail_on("/B");

        let err = store.save().unwrap_err();
        assert!(matches!(err, VboxError::ExternalCall { ref key, .. } if key == "/B"));

        // /A 已成功，/B 失敗，/C 未嘗試
        assert!(!store.is_dirty("/A"));
        assert!(store.is_dirty("/B"));
        assert!(store.is_dirty("/C"));
        assert_eq!(store.get("/B").unwrap(), &"2");

        driver.recover("/B");
        driver.clear_calls();
        store.save().unwrap();

        assert_eq!(
            driver.write_calls(),
            vec![set_call("/B", Some("2")), set_call("/C", Some("3"))]
        );
        assert!(!store.has_changes());
    }

    #[test]
    fn test_continue_policy_attempts_every_key() {
        let driver = Arc::new(InMemoryDriver::new());
        let config = StoreConfig::new().with_save_policy(SavePolicy::Continue);
        let mut store =
            GuestProperties::populate_with_config(owner(), driver.clone(), config).unwrap();

        store.set("/A", "1");
        store.remove_on_save("/B");
        store.set("/C", "3");
        driver.fail_on("/B");

        let err = store.save().unwrap_err();

        match err {
            VboxError::PartialSave { failed } => assert_eq!(failed, vec!["/B".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(driver.property("/A").as_deref(), Some("1"));
        assert_eq!(driver.property("/C").as_deref(), Some("3"));
        assert_eq!(store.dirty_keys(), vec!["/B".to_string()]);
        // 失敗的刪除標記仍保留
        assert!(store.is_tombstoned("/B"));
    }

    #[test]
    fn test_record_follows_save() {
        let (_driver, mut store) = loaded();
        let loaded_at = store.record("/Foo/Bar").unwrap().timestamp;

        store.set("/Foo/Bar", "no");
        store.set("/Local/Only", 7);
        assert_eq!(store.record("/Foo/Bar").unwrap().value, "yes");
        store.save().unwrap();

        let record = store.record("/Foo/Bar").unwrap();
        assert_eq!(record.value, "no");
        assert_eq!(record.timestamp, loaded_at);
        assert!(store.record("/Local/Only").is_none());

        store.remove_on_save("/Foo/Bar");
        store.save().unwrap();
        assert!(store.record("/Foo/Bar").is_none());
    }

    #[test]
    fn test_reload_discards_local_changes() {
        let (_driver, mut store) = loaded();
        store.set("/Foo/Bar", "no");
        store.set("/Local/Only", "x");

        store.reload().unwrap();

        assert_eq!(store.get("/Foo/Bar").unwrap(), &"yes");
        assert!(!store.contains_key("/Local/Only"));
        assert!(!store.has_changes());
    }

    #[test]
    fn test_relationship_contract() {
        let driver = Arc::new(InMemoryDriver::new());
        driver.seed_property("/Foo/Bar", "yes", "");
        let source: Arc<dyn GuestPropertyInterface> = driver.clone();

        let config = StoreConfig::default();
        let mut store = <GuestProperties as Relationship>::load(&owner(), source, &config).unwrap();
        store.set("/Foo/Bar", "no");
        assert!(Relationship::has_changes(&store));

        store.persist().unwrap();
        assert_eq!(driver.property("/Foo/Bar").as_deref(), Some("no"));
    }

    fn user_key() -> impl Strategy<Value = String> {
        "/[A-Za-z]{1,8}/[A-Za-z0-9]{1,8}"
    }

    proptest! {
        #[test]
        fn prop_load_then_clean(
            props in proptest::collection::btree_map(user_key(), "[a-z0-9]{0,12}", 0..16)
        ) {
            let driver = Arc::new(InMemoryDriver::new());
            for (key, value) in &props {
                driver.seed_property(key.clone(), value.clone(), "");
            }

            let store = GuestProperties::populate(owner(), driver.clone()).unwrap();

            prop_assert!(!store.has_changes());
            prop_assert_eq!(store.len(), props.len());
            for (key, value) in &props {
                let expected = PropertyValue::Text(value.clone());
                prop_assert_eq!(store.get(key), Some(&expected));
            }
            prop_assert!(driver.write_calls().is_empty());
        }

        #[test]
        fn prop_set_marks_dirty_and_save_clears(
            key in user_key(),
            value in "[a-z0-9]{0,12}",
            twice in any::<bool>(),
        ) {
            let (driver, mut store) = loaded();

            store.set(key.clone(), value.clone());
            if twice {
                store.set(key.clone(), value.clone());
            }
            prop_assert!(store.is_dirty(&key));

            store.save().unwrap();
            prop_assert!(!store.is_dirty(&key));
            prop_assert_eq!(driver.property(&key), Some(value));
            prop_assert_eq!(driver.write_calls().len(), 1);
        }
    }
}
