//! 摄取链路集成测试
//!
//! 以内存存储与脚本化消息流替换 PostgreSQL 和 Kafka，
//! 端到端验证 消费 -> 校验 -> 保存 -> 缓存 -> 查询 的完整链路。

use std::sync::Arc;
use std::time::Duration;

use order_service::cache::{LruOrderCache, OrderCache};
use order_service::consumer::OrderConsumer;
use order_service::error::OrderError;
use order_service::service::OrderService;
use order_service::test_utils::{
    InMemoryOrderStore, ScriptedStream, fast_settings, order_message, raw_message, sample_order,
};
use order_shared::kafka::StreamError;
use tokio::sync::watch;

type TestService = OrderService<InMemoryOrderStore, LruOrderCache>;

fn setup(store: InMemoryOrderStore, capacity: usize) -> (Arc<InMemoryOrderStore>, Arc<TestService>) {
    let store = Arc::new(store);
    let service = Arc::new(OrderService::new(
        Arc::clone(&store),
        Arc::new(LruOrderCache::new(capacity)),
    ));
    (store, service)
}

// ==================== 场景 A：合法消息 ====================

#[tokio::test]
async fn test_valid_message_is_stored_and_served_from_cache() {
    let (store, service) = setup(InMemoryOrderStore::new(), 100);
    let order = sample_order("b563feb7b2b84b6test");

    let (tx, rx) = watch::channel(false);
    let stream = ScriptedStream::new(vec![Ok(order_message(0, &order))]).shutdown_when_drained(tx);
    let stats = OrderConsumer::new(stream, Arc::clone(&service), fast_settings())
        .run(rx)
        .await;

    assert_eq!(stats.saved, 1);
    assert_eq!(stats.discarded, 0);
    assert!(store.contains("b563feb7b2b84b6test"));
    assert_eq!(store.insert_calls(), 1);

    let first = service.get_order("b563feb7b2b84b6test").await.unwrap();
    let second = service.get_order("b563feb7b2b84b6test").await.unwrap();

    assert_eq!(*first, order);
    assert_eq!(first, second);
    assert_eq!(store.get_calls(), 0);
}

// ==================== 场景 B：非法 JSON ====================

#[tokio::test]
async fn test_malformed_message_is_discarded_and_loop_continues() {
    let (store, service) = setup(InMemoryOrderStore::new(), 100);

    let (tx, rx) = watch::channel(false);
    let stream = ScriptedStream::new(vec![
        Ok(raw_message(0, r#"{"order_uid": "broken", "items": [}"#)),
        Ok(order_message(1, &sample_order("next-order"))),
    ])
    .shutdown_when_drained(tx);
    let stats = OrderConsumer::new(stream, Arc::clone(&service), fast_settings())
        .run(rx)
        .await;

    assert_eq!(stats.received, 2);
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.saved, 1);

    // 非法消息没有触达存储，也没有进入缓存
    assert_eq!(store.insert_calls(), 1);
    assert!(!service.cache().contains("broken"));
    assert!(service.cache().contains("next-order"));
}

#[tokio::test]
async fn test_every_failure_kind_is_absorbed() {
    let (store, service) = setup(
        InMemoryOrderStore::with_orders([sample_order("already-there")]),
        100,
    );

    let mut invalid = sample_order("invalid-order");
    invalid.items.clear();

    let (tx, rx) = watch::channel(false);
    let stream = ScriptedStream::new(vec![
        Err(StreamError::Broker("all brokers down".into())),
        Ok(order_message(0, &sample_order("first"))),
        Err(StreamError::Broker("leader not available".into())),
        Ok(raw_message(1, "garbage")),
        Ok(order_message(2, &invalid)),
        Ok(order_message(3, &sample_order("already-there"))),
        Ok(order_message(4, &sample_order("last"))),
    ])
    .shutdown_when_drained(tx);
    let stats = OrderConsumer::new(stream, Arc::clone(&service), fast_settings())
        .run(rx)
        .await;

    assert_eq!(stats.saved, 2);
    assert_eq!(stats.discarded, 3);
    assert_eq!(stats.read_errors, 2);
    assert!(service.cache().contains("first"));
    assert!(service.cache().contains("last"));
    assert!(!service.cache().contains("invalid-order"));
    assert!(!service.cache().contains("already-there"));
    assert!(!store.contains("invalid-order"));
}

// ==================== 场景 C：缓存预热 ====================

#[tokio::test]
async fn test_warmup_skips_unreadable_order() {
    let store = InMemoryOrderStore::with_orders(
        ["o1", "o2", "o3", "o4"].into_iter().map(sample_order),
    );
    store.fail_get_for("o3");
    let (store, service) = setup(store, 100);

    let loaded = service.load_cache().await.unwrap();

    assert_eq!(loaded, 3);
    assert_eq!(service.cache().len(), 3);
    assert!(!service.cache().contains("o3"));
    assert_eq!(store.list_calls(), 1);

    // 预热后的读取命中缓存，不再访问存储
    let gets_after_warmup = store.get_calls();
    for uid in ["o1", "o2", "o4"] {
        service.get_order(uid).await.unwrap();
    }
    assert_eq!(store.get_calls(), gets_after_warmup);
}

#[tokio::test]
async fn test_warmup_listing_failure_is_reported() {
    let store = InMemoryOrderStore::with_orders([sample_order("o1")]);
    store.set_fail_listing(true);
    let (_store, service) = setup(store, 100);

    assert!(service.load_cache().await.is_err());
    assert!(service.cache().is_empty());
}

// ==================== 缓存与存储一致性 ====================

#[tokio::test]
async fn test_read_through_after_eviction() {
    let (store, service) = setup(InMemoryOrderStore::new(), 2);

    for uid in ["a", "b", "c"] {
        service.create_order(sample_order(uid)).await.unwrap();
    }
    assert!(!service.cache().contains("a"));

    // 被淘汰的订单从存储回填
    let order = service.get_order("a").await.unwrap();
    assert_eq!(order.order_uid, "a");
    assert_eq!(store.get_calls(), 1);
    assert!(service.cache().contains("a"));
    assert_eq!(service.cache().len(), 2);
}

#[tokio::test]
async fn test_missing_order_is_not_cached() {
    let (store, service) = setup(InMemoryOrderStore::new(), 10);

    for _ in 0..2 {
        let err = service.get_order("ghost").await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    // 负结果不缓存，每次都回源
    assert_eq!(store.get_calls(), 2);
    assert!(service.cache().is_empty());
}

#[tokio::test]
async fn test_concurrent_readers_and_writers() {
    let (store, service) = setup(InMemoryOrderStore::new(), 32);

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for i in 0..25 {
                    let uid = format!("w{w}-{i}");
                    service.create_order(sample_order(&uid)).await.unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.await.unwrap();
    }

    let readers: Vec<_> = (0..4)
        .map(|w| {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                for i in 0..25 {
                    let uid = format!("w{w}-{i}");
                    let order = service.get_order(&uid).await.unwrap();
                    assert_eq!(order.order_uid, uid);
                }
            })
        })
        .collect();
    for reader in readers {
        reader.await.unwrap();
    }

    assert_eq!(store.len(), 100);
    assert!(service.cache().len() <= 32);
}

#[tokio::test]
async fn test_consumer_stops_while_broker_unavailable() {
    let (_store, service) = setup(InMemoryOrderStore::new(), 10);
    let (tx, rx) = watch::channel(false);

    // 脚本为空且未配置关闭信号：每次读取都超时，消费者停留在探测阶段
    let stream = ScriptedStream::new(vec![]);
    let handle = tokio::spawn(OrderConsumer::new(stream, service, fast_settings()).run(rx));

    tokio::time::sleep(Duration::from_millis(30)).await;
    tx.send(true).unwrap();

    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("consumer did not stop")
        .unwrap();
    assert_eq!(stats.received, 0);
    assert!(stats.read_errors >= 1);
}
