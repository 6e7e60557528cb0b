//! 髒標記追蹤

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

/// 髒標記追蹤器
///
/// 每個髒鍵保存上次清除後第一次被修改前的基準值。
#[derive(Debug, Clone)]
pub struct DirtyTracker<K, V> {
    dirty: HashMap<K, V>,
}

impl<K, V> DirtyTracker<K, V>
where
    K: Eq + Hash,
{
    /// 創建新的追蹤器
    pub fn new() -> Self {
        Self {
            dirty: HashMap::new(),
        }
    }

    /// 標記為髒；已是髒鍵時保留原本的基準值
    pub fn mark_dirty(&mut self, key: K, baseline: V) {
        self.dirty.entry(key).or_insert(baseline);
    }

    /// 檢查是否為髒
    pub fn is_dirty<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.dirty.contains_key(key)
    }

    /// 取得基準值
    pub fn baseline<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.dirty.get(key)
    }

    /// 以新的基準值取代（僅限髒鍵）
    pub fn rebase<Q>(&mut self, key: &Q, baseline: V)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(slot) = self.dirty.get_mut(key) {
            *slot = baseline;
        }
    }

    /// 清除單一鍵的髒標記，回傳其基準值
    pub fn clean<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.dirty.remove(key)
    }

    /// 清除所有髒標記
    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dirty.len()
    }
}

impl<K, V> DirtyTracker<K, V>
where
    K: Eq + Hash + Ord + Clone,
{
    /// 獲取所有髒鍵（已排序）
    pub fn get_dirty_keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self.dirty.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl<K, V> Default for DirtyTracker<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
