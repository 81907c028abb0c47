//! 有界 LRU 订单缓存
//!
//! 进程内缓存，容量在构造时确定，超出容量时淘汰最久未使用的条目。
//!
//! ## 结构
//!
//! - 哈希表：`order_uid -> 槽位下标`，O(1) 定位
//! - 双向链表：节点存放在 `Vec` 中，以下标互相链接，头部为最近使用，尾部为最久未使用
//! - 空闲链：被删除或淘汰的槽位下标，供后续插入复用，避免 `Vec` 无限增长
//!
//! 读取也会修改访问顺序，因此哈希表与链表由同一把互斥锁保护，
//! 任何节点引用都不会逃逸出锁的作用域。缓存不做任何校验，只存放调用方交给它的快照。

use std::collections::HashMap;
use std::sync::Arc;

use order_shared::observability::metrics;
use parking_lot::Mutex;

use crate::models::Order;

/// 订单缓存接口
///
/// 服务层只依赖该 trait，便于在测试中替换实现。
#[cfg_attr(test, mockall::automock)]
pub trait OrderCache: Send + Sync {
    /// 查询订单；命中时将其标记为最近使用
    fn get(&self, order_uid: &str) -> Option<Arc<Order>>;

    /// 插入或覆盖订单，并标记为最近使用；超出容量时淘汰一条最久未使用的订单
    fn set(&self, order_uid: &str, order: Arc<Order>);

    /// 删除订单（不存在时无操作）
    fn delete(&self, order_uid: &str);

    /// 清空缓存
    fn clear(&self);

    /// 当前条目数
    fn len(&self) -> usize;

    /// 容量上限
    fn capacity(&self) -> usize;

    /// 是否包含某订单，不改变访问顺序
    fn contains(&self, order_uid: &str) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 链表节点；`value` 为 None 表示槽位空闲
struct Node {
    key: String,
    value: Option<Arc<Order>>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// 锁内状态
struct LruState {
    capacity: usize,
    map: HashMap<String, usize>,
    nodes: Vec<Node>,
    free: Vec<usize>,
    /// 最近使用
    head: Option<usize>,
    /// 最久未使用
    tail: Option<usize>,
}

impl LruState {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    /// 将节点从链表中摘下
    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };

        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }

        let node = &mut self.nodes[idx];
        node.prev = None;
        node.next = None;
    }

    /// 将节点挂到链表头部
    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let node = &mut self.nodes[idx];
            node.prev = None;
            node.next = old_head;
        }
        match old_head {
            Some(h) => self.nodes[h].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
    }

    /// 摘下节点并归还槽位
    fn release(&mut self, idx: usize) {
        self.detach(idx);
        let node = &mut self.nodes[idx];
        node.value = None;
        let key = std::mem::take(&mut node.key);
        self.map.remove(&key);
        self.free.push(idx);
    }

    fn get(&mut self, key: &str) -> Option<Arc<Order>> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.push_front(idx);
        self.nodes[idx].value.clone()
    }

    /// 返回是否发生了淘汰
    fn set(&mut self, key: &str, value: Arc<Order>) -> bool {
        if let Some(&idx) = self.map.get(key) {
            self.nodes[idx].value = Some(value);
            self.detach(idx);
            self.push_front(idx);
            return false;
        }

        let mut evicted = false;
        if self.map.len() >= self.capacity
            && let Some(lru) = self.tail
        {
            self.release(lru);
            evicted = true;
        }

        let node = Node {
            key: key.to_string(),
            value: Some(value),
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };

        self.push_front(idx);
        self.map.insert(key.to_string(), idx);
        evicted
    }

    fn delete(&mut self, key: &str) {
        if let Some(&idx) = self.map.get(key) {
            self.release(idx);
        }
    }

    fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    /// 从最近使用到最久未使用的键顺序
    #[cfg(test)]
    fn keys_mru_order(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.map.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.nodes[idx].key.clone());
            cursor = self.nodes[idx].next;
        }
        keys
    }
}

/// 基于互斥锁的 LRU 订单缓存
pub struct LruOrderCache {
    state: Mutex<LruState>,
}

impl LruOrderCache {
    /// 创建缓存；容量至少为 1
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::new(capacity.max(1))),
        }
    }
}

impl OrderCache for LruOrderCache {
    fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let found = self.state.lock().get(order_uid);
        metrics::record_cache_lookup(found.is_some());
        found
    }

    fn set(&self, order_uid: &str, order: Arc<Order>) {
        let evicted = self.state.lock().set(order_uid, order);
        if evicted {
            metrics::record_cache_eviction();
        }
    }

    fn delete(&self, order_uid: &str) {
        self.state.lock().delete(order_uid);
    }

    fn clear(&self) {
        self.state.lock().clear();
    }

    fn len(&self) -> usize {
        self.state.lock().map.len()
    }

    fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    fn contains(&self, order_uid: &str) -> bool {
        self.state.lock().map.contains_key(order_uid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_order;

    fn order(uid: &str) -> Arc<Order> {
        Arc::new(sample_order(uid))
    }

    #[test]
    fn test_get_missing_returns_none() {
        let cache = LruOrderCache::new(2);
        assert!(cache.get("missing").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_overflow_evicts_least_recently_used() {
        let cache = LruOrderCache::new(3);
        for uid in ["a", "b", "c", "d"] {
            cache.set(uid, order(uid));
        }

        assert_eq!(cache.len(), 3);
        assert!(!cache.contains("a"));
        for uid in ["b", "c", "d"] {
            assert!(cache.contains(uid), "{uid} should survive");
        }
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = LruOrderCache::new(3);
        cache.set("a", order("a"));
        cache.set("b", order("b"));
        cache.set("c", order("c"));

        assert!(cache.get("a").is_some());
        cache.set("d", order("d"));

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = LruOrderCache::new(2);
        cache.set("a", order("a"));
        cache.set("b", order("b"));

        let mut updated = sample_order("a");
        updated.track_number = "WBILMUPDATED".to_string();
        cache.set("a", Arc::new(updated));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().track_number, "WBILMUPDATED");

        // 覆盖同时刷新了 a 的访问顺序，下一次淘汰 b
        cache.set("c", order("c"));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_contains_does_not_promote() {
        let cache = LruOrderCache::new(2);
        cache.set("a", order("a"));
        cache.set("b", order("b"));

        assert!(cache.contains("a"));
        cache.set("c", order("c"));

        assert!(!cache.contains("a"));
    }

    #[test]
    fn test_delete_and_clear() {
        let cache = LruOrderCache::new(3);
        cache.set("a", order("a"));
        cache.set("b", order("b"));

        cache.delete("a");
        cache.delete("not-there");
        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get("b").is_none());

        // 清空后仍可正常使用
        cache.set("c", order("c"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let cache = LruOrderCache::new(0);
        assert_eq!(cache.capacity(), 1);

        cache.set("a", order("a"));
        cache.set("b", order("b"));
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("b"));
    }

    #[test]
    fn test_recency_order_and_slot_reuse() {
        let mut state = LruState::new(3);
        for uid in ["a", "b", "c"] {
            state.set(uid, order(uid));
        }
        state.get("a");
        assert_eq!(state.keys_mru_order(), vec!["a", "c", "b"]);

        state.delete("c");
        assert_eq!(state.keys_mru_order(), vec!["a", "b"]);

        for i in 0..100 {
            let uid = format!("o{i}");
            state.set(&uid, order(&uid));
        }
        // 槽位被复用，节点数组不会超过容量
        assert_eq!(state.nodes.len(), 3);
        assert_eq!(state.map.len(), 3);
        assert_eq!(state.keys_mru_order(), vec!["o99", "o98", "o97"]);
    }

    #[test]
    fn test_concurrent_access_stays_bounded() {
        let cache = Arc::new(LruOrderCache::new(16));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let uid = format!("t{t}-o{}", i % 40);
                        cache.set(&uid, order(&uid));
                        let _ = cache.get(&uid);
                        if i % 7 == 0 {
                            cache.delete(&uid);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 16);
    }
}
