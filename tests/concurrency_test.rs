//! Concurrent callers against isolated and process-wide caches.

use std::sync::Arc;

use serial_test::serial;
use sqlx_named_sql::cache::global;
use sqlx_named_sql::{CacheConfig, NamedSql, TemplateCache};

const SQL: &str = "SELECT * FROM orders WHERE customer = :customer AND status = #{status}";

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_get_or_build_returns_equal_templates() {
    let cache = Arc::new(TemplateCache::new(CacheConfig::for_memory_mb(1024)));

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::task::spawn_blocking(move || cache.get_or_build(SQL))
        })
        .collect();

    let mut templates = Vec::new();
    for handle in handles {
        templates.push(handle.await.unwrap().unwrap());
    }

    let expected = templates[0].default_form().clone();
    for template in &templates {
        assert_eq!(template.default_form(), &expected);
        assert_eq!(template.parameterized_sql(), "SELECT * FROM orders WHERE customer = ? AND status = ?");
    }
    assert_eq!(cache.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_alternate_form_converges() {
    let template = Arc::new(NamedSql::build(SQL).unwrap());

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let template = Arc::clone(&template);
            tokio::task::spawn_blocking(move || template.alternate_form().unwrap().clone())
        })
        .collect();

    for handle in handles {
        let form = handle.await.unwrap();
        assert_eq!(form.sql, "SELECT * FROM orders WHERE customer = $1 AND status = $2");
        assert_eq!(&form, template.alternate_form().unwrap());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mixing_errors_leave_cache_empty() {
    let cache = Arc::new(TemplateCache::new(CacheConfig::for_memory_mb(1024)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::task::spawn_blocking(move || cache.get_or_build("SELECT :a, ?").is_err())
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert!(cache.is_empty());
}

#[test]
#[serial]
fn test_global_cache_memoizes() {
    let sql = "SELECT * FROM global_memo WHERE id = :id";
    global().invalidate(sql);

    let first = NamedSql::parse(sql).unwrap();
    let second = NamedSql::parse(sql).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(global().contains(sql));
}

#[test]
#[serial]
fn test_global_cache_config() {
    let config = global().config();
    assert!((1000..=8000).contains(&config.capacity));
    assert_eq!(config.ttl, sqlx_named_sql::cache::DEFAULT_TTL);
}

#[test]
#[serial]
fn test_global_cache_attributes_apply_on_first_build() {
    let sql = "SELECT * FROM global_attrs WHERE id = :id";
    global().invalidate(sql);

    let template = NamedSql::parse_with_attributes(
        sql,
        [("shard".to_string(), "eu".to_string())].into_iter().collect(),
    )
    .unwrap();

    assert_eq!(template.attribute("shard"), Some("eu"));
}
