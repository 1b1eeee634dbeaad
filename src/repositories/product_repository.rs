use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use crate::cache::BestEffortCache;
use crate::entities::commerce::product::{Column, Entity as Product, Model as ProductModel};
use crate::errors::ServiceError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<i32>,
}

impl ProductFilter {
    pub fn by_id(id: i32) -> Self {
        Self {
            id: Some(id),
            ..Default::default()
        }
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(id) = self.id {
            cond = cond.add(Column::Id.eq(id));
        }
        if let Some(category_id) = self.category_id {
            cond = cond.add(Column::CategoryId.eq(category_id));
        }
        cond
    }
}

/// Read-only product lookups.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get(&self, filter: ProductFilter) -> Result<ProductModel, ServiceError>;
    async fn get_list(&self, filter: ProductFilter) -> Result<Vec<ProductModel>, ServiceError>;
    /// Unknown ids are silently skipped.
    async fn get_list_by_ids(&self, ids: Vec<i32>) -> Result<Vec<ProductModel>, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct DbProductRepository {
    db: Arc<DatabaseConnection>,
}

impl DbProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductRepository for DbProductRepository {
    async fn get(&self, filter: ProductFilter) -> Result<ProductModel, ServiceError> {
        Product::find()
            .filter(filter.condition())
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product matching {:?}", filter)))
    }

    async fn get_list(&self, filter: ProductFilter) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(filter.condition())
            .order_by_asc(Column::Id)
            .all(&*self.db)
            .await?)
    }

    async fn get_list_by_ids(&self, ids: Vec<i32>) -> Result<Vec<ProductModel>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(Product::find()
            .filter(Column::Id.is_in(ids))
            .order_by_asc(Column::Id)
            .all(&*self.db)
            .await?)
    }
}

/// Cache-aside decorator. Keys are derived from the JSON form of the query so
/// identical queries share an entry; entries are never invalidated, only expire.
pub struct CachedProductRepository {
    inner: Arc<dyn ProductRepository>,
    cache: BestEffortCache,
    key_prefix: String,
}

impl CachedProductRepository {
    pub fn new(inner: Arc<dyn ProductRepository>, cache: BestEffortCache, key_prefix: &str) -> Self {
        Self {
            inner,
            cache,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn key<T: Serialize + ?Sized>(&self, kind: &str, query: &T) -> String {
        // Filters are plain structs of integers; serialization cannot fail.
        let encoded = serde_json::to_string(query).unwrap_or_default();
        format!("{}:product:{}:{}", self.key_prefix, kind, encoded)
    }
}

#[async_trait]
impl ProductRepository for CachedProductRepository {
    #[instrument(skip(self))]
    async fn get(&self, filter: ProductFilter) -> Result<ProductModel, ServiceError> {
        let key = self.key("get", &filter);
        if let Some(product) = self.cache.try_get(&key).await {
            return Ok(product);
        }
        let product = self.inner.get(filter).await?;
        self.cache.try_set(&key, &product).await;
        Ok(product)
    }

    #[instrument(skip(self))]
    async fn get_list(&self, filter: ProductFilter) -> Result<Vec<ProductModel>, ServiceError> {
        let key = self.key("get:q", &filter);
        if let Some(products) = self.cache.try_get(&key).await {
            return Ok(products);
        }
        let products = self.inner.get_list(filter).await?;
        self.cache.try_set(&key, &products).await;
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn get_list_by_ids(&self, mut ids: Vec<i32>) -> Result<Vec<ProductModel>, ServiceError> {
        ids.sort_unstable();
        ids.dedup();
        let key = self.key("ids", &ids);
        if let Some(products) = self.cache.try_get(&key).await {
            return Ok(products);
        }
        let products = self.inner.get_list_by_ids(ids).await?;
        self.cache.try_set(&key, &products).await;
        Ok(products)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheBackend, CacheError, InMemoryCache, MockCacheBackend};
    use chrono::Utc;
    use std::time::Duration;

    fn product(id: i32, price: i64) -> ProductModel {
        ProductModel {
            id,
            category_id: 1,
            name: format!("product-{id}"),
            description: String::new(),
            price,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn cached(inner: MockProductRepository, backend: Arc<dyn CacheBackend>) -> CachedProductRepository {
        CachedProductRepository::new(
            Arc::new(inner),
            BestEffortCache::new(backend, Duration::from_secs(60)),
            "test",
        )
    }

    #[tokio::test]
    async fn miss_reads_store_and_fills_cache() {
        let mut inner = MockProductRepository::new();
        inner
            .expect_get()
            .times(1)
            .returning(|_| Ok(product(3, 10_000)));
        let backend = Arc::new(InMemoryCache::new());
        let repo = cached(inner, backend.clone());

        let first = repo.get(ProductFilter::by_id(3)).await.unwrap();
        // second call must be served from cache (store expects exactly one call)
        let second = repo.get(ProductFilter::by_id(3)).await.unwrap();

        assert_eq!(first, second);
        assert!(backend.get(r#"test:product:get:{"id":3}"#).await.is_ok());
    }

    #[tokio::test]
    async fn hit_skips_store() {
        let backend = Arc::new(InMemoryCache::new());
        backend
            .set_with_expiry(
                "test:product:ids:[1,2]",
                &serde_json::to_string(&vec![product(1, 5), product(2, 7)]).unwrap(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        let mut inner = MockProductRepository::new();
        inner.expect_get_list_by_ids().never();
        let repo = cached(inner, backend);

        let products = repo.get_list_by_ids(vec![2, 1, 2]).await.unwrap();
        assert_eq!(products.len(), 2);
    }

    #[tokio::test]
    async fn cache_failures_fall_through_to_store() {
        let mut backend = MockCacheBackend::new();
        backend
            .expect_get()
            .returning(|_| Err(CacheError::InvalidTtl));
        backend
            .expect_set_with_expiry()
            .returning(|_, _, _| Err(CacheError::InvalidTtl));
        let mut inner = MockProductRepository::new();
        inner
            .expect_get_list()
            .times(1)
            .returning(|_| Ok(vec![product(1, 100)]));
        let repo = cached(inner, Arc::new(backend));

        let products = repo.get_list(ProductFilter::default()).await.unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].price, 100);
    }

    #[tokio::test]
    async fn store_failure_after_miss_propagates() {
        let mut inner = MockProductRepository::new();
        inner
            .expect_get()
            .returning(|_| Err(ServiceError::NotFound("product".into())));
        let repo = cached(inner, Arc::new(InMemoryCache::new()));

        let err = repo.get(ProductFilter::by_id(9)).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
