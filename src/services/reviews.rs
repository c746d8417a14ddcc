//! Reviews service.
//!
//! A review belongs to an order and inherits the order's product. The order
//! is read from the orders service through a breaker-guarded invoker, so an
//! unhealthy orders service turns into a 502 here instead of a hung request.
//!
//! Keys: `reviews:review:{id}`, `reviews:all`, the filtered families
//! `reviews:order:{orderId}[:product:{productId}]` and
//! `reviews:byproduct:{productId}`, and the derived per-product average
//! `reviews:product:{productId}:avg`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::cache::{keys, CacheAside, KvCache};
use crate::config::CacheConfig;
use crate::http::request_id;
use crate::services::common::{
    as_integer, health_body, parse_id, parse_object, query_integer, status_body, ServiceError, ServiceResult,
};
use crate::storage::{Filter, NewRecord, Record, RecordPatch, Store, StoreError};
use crate::upstream::{Invocation, UpstreamInvoker, UpstreamRequest};

const LABEL: &str = "Reviews";

pub struct ReviewsService {
    store: Arc<dyn Store>,
    cache: CacheAside,
    ttl: CacheConfig,
    orders: Arc<UpstreamInvoker>,
}

impl ReviewsService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn KvCache>, ttl: CacheConfig, orders: Arc<UpstreamInvoker>) -> Self {
        Self {
            store,
            cache: CacheAside::new(cache, "reviews"),
            ttl,
            orders,
        }
    }

    pub async fn list(&self, order_id: Option<i64>, product_id: Option<i64>) -> ServiceResult<Vec<Value>> {
        let mut filter = Filter::all();
        if let Some(order) = order_id {
            filter = filter.eq("orderId", order);
        }
        if let Some(product) = product_id {
            filter = filter.eq("productId", product);
        }

        let key = match (order_id, product_id) {
            (Some(order), product) => keys::reviews::by_order(order, product),
            (None, Some(product)) => keys::reviews::by_product(product),
            (None, None) => keys::reviews::ALL.to_string(),
        };

        let reviews = self
            .cache
            .get_or_populate(&key, self.ttl.collection_ttl(), || async {
                let records = self.store.find_all(&filter).await?;
                Ok::<_, ServiceError>(Some(records.iter().map(Record::to_dto).collect::<Vec<_>>()))
            })
            .await?;
        Ok(reviews.unwrap_or_default())
    }

    pub async fn get(&self, id: u64) -> ServiceResult<Value> {
        self.cache
            .get_or_populate(&keys::reviews::review(id), self.ttl.entity_ttl(), || async {
                Ok::<_, ServiceError>(self.store.find_by_id(id).await?.map(|r| r.to_dto()))
            })
            .await?
            .ok_or_else(|| ServiceError::not_found("Review not found"))
    }

    pub async fn create(&self, body: Map<String, Value>, request_id: Option<String>) -> ServiceResult<Value> {
        let order_id = body
            .get("orderId")
            .and_then(as_integer)
            .ok_or_else(|| ServiceError::bad_request("orderId must be an integer"))?;
        let rating = body.get("rating").and_then(valid_rating).ok_or_else(rating_error)?;

        let existing = self.store.find_all(&Filter::all().eq("orderId", order_id)).await?;
        if !existing.is_empty() {
            return Err(ServiceError::Conflict("Review already exists for this order".to_string()));
        }

        let order = self.fetch_order(order_id, request_id).await?;
        let product_id = product_of(&order).ok_or_else(|| {
            ServiceError::bad_request("Cannot determine productId from order (need order.productId or order.data.productId)")
        })?;

        let mut fields = Map::new();
        fields.insert("orderId".to_string(), Value::from(order_id));
        fields.insert("productId".to_string(), Value::from(product_id));
        fields.insert("rating".to_string(), Value::from(rating));
        fields.insert("comment".to_string(), body.get("comment").cloned().unwrap_or(Value::Null));

        // Concurrent creates can both pass the lookup above; the store decides.
        let record = self
            .store
            .create(NewRecord {
                fields,
                data: Map::new(),
                unique: vec!["orderId".to_string()],
            })
            .await
            .map_err(|e| match e {
                StoreError::Conflict { .. } => ServiceError::Conflict("Review already exists for this order".to_string()),
                other => other.into(),
            })?;

        self.invalidate(None, product_id).await;
        tracing::info!(review_id = record.id, order_id, product_id, "Review created");
        Ok(record.to_dto())
    }

    pub async fn update(&self, id: u64, body: Map<String, Value>) -> ServiceResult<Value> {
        let mut fields = Map::new();
        match body.get("rating") {
            None | Some(Value::Null) => {}
            Some(raw) => {
                let rating = valid_rating(raw).ok_or_else(rating_error)?;
                fields.insert("rating".to_string(), Value::from(rating));
            }
        }
        if let Some(comment) = body.get("comment") {
            fields.insert("comment".to_string(), comment.clone());
        }

        let record = self
            .store
            .update(
                id,
                RecordPatch {
                    fields,
                    data: Map::new(),
                },
            )
            .await?
            .ok_or_else(|| ServiceError::not_found("Review not found"))?;

        if let Some(product_id) = record.field_i64("productId") {
            self.invalidate(Some(id), product_id).await;
        }
        Ok(record.to_dto())
    }

    pub async fn delete(&self, id: u64) -> ServiceResult<Value> {
        let record = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Review not found"))?;

        if let Some(product_id) = record.field_i64("productId") {
            self.invalidate(Some(id), product_id).await;
        }
        Ok(json!({ "message": "Review deleted", "deletedReview": record.to_dto() }))
    }

    /// Mean rating for a product, rounded to two decimals.
    pub async fn average(&self, product_id: i64) -> ServiceResult<Value> {
        let summary = self
            .cache
            .get_or_populate(
                &keys::reviews::product_average(product_id),
                self.ttl.aggregate_ttl(),
                || async {
                    let records = self.store.find_all(&Filter::all().eq("productId", product_id)).await?;
                    let ratings: Vec<i64> = records.iter().filter_map(|r| r.field_i64("rating")).collect();
                    let count = ratings.len();
                    let average = if count == 0 {
                        0.0
                    } else {
                        ratings.iter().sum::<i64>() as f64 / count as f64
                    };
                    Ok::<_, ServiceError>(Some(json!({
                        "productId": product_id,
                        "averageRating": (average * 100.0).round() / 100.0,
                        "count": count,
                    })))
                },
            )
            .await?;
        Ok(summary.unwrap_or(Value::Null))
    }

    async fn fetch_order(&self, order_id: i64, request_id: Option<String>) -> ServiceResult<Value> {
        let request = UpstreamRequest::get(format!("/orders/{}", order_id)).with_request_id(request_id);
        match self.orders.invoke(request).await {
            Invocation::Success { body, .. } => Ok(body),
            invocation if invocation.is_not_found() => Err(ServiceError::not_found("Order not found")),
            Invocation::ApplicationError { status, .. } => {
                tracing::warn!(order_id, status = status.as_u16(), "Orders service rejected lookup");
                Err(ServiceError::BadGateway("Orders service error".to_string()))
            }
            Invocation::Fallback { reason, .. } => {
                tracing::warn!(order_id, reason = reason.as_str(), "Orders service unavailable");
                Err(ServiceError::BadGateway("Orders service unavailable".to_string()))
            }
        }
    }

    async fn invalidate(&self, id: Option<u64>, product_id: i64) {
        let mut keys_to_drop = Vec::with_capacity(3);
        if let Some(id) = id {
            keys_to_drop.push(keys::reviews::review(id));
        }
        keys_to_drop.push(keys::reviews::ALL.to_string());
        keys_to_drop.push(keys::reviews::product_average(product_id));

        self.cache
            .invalidate(
                &keys_to_drop,
                &[
                    keys::reviews::BY_ORDER_PREFIX.to_string(),
                    keys::reviews::BY_PRODUCT_PREFIX.to_string(),
                ],
            )
            .await;
    }
}

fn valid_rating(value: &Value) -> Option<i64> {
    as_integer(value).filter(|r| (1..=5).contains(r))
}

fn rating_error() -> ServiceError {
    ServiceError::bad_request("rating must be an integer 1..5")
}

/// `order.productId`, else `order.data.productId`.
fn product_of(order: &Value) -> Option<i64> {
    order
        .get("productId")
        .and_then(as_integer)
        .or_else(|| order.get("data").and_then(|d| d.get("productId")).and_then(as_integer))
}

pub fn router(service: Arc<ReviewsService>) -> Router {
    Router::new()
        .route("/reviews/status", get(|| async { status_body(LABEL) }))
        .route("/reviews/health", get(|| async { health_body(LABEL) }))
        .route("/reviews", get(list_reviews).post(create_review))
        .route("/reviews/{reviewId}", get(get_review).put(update_review).delete(delete_review))
        .route("/reviews/product/{productId}/average", get(product_average))
        .with_state(service)
}

async fn list_reviews(
    State(svc): State<Arc<ReviewsService>>,
    Query(query): Query<HashMap<String, String>>,
) -> ServiceResult<Json<Vec<Value>>> {
    let order_id = query_integer(query.get("orderId"), "Invalid orderId in query")?;
    let product_id = query_integer(query.get("productId"), "Invalid productId in query")?;
    Ok(Json(svc.list(order_id, product_id).await?))
}

async fn get_review(State(svc): State<Arc<ReviewsService>>, Path(raw): Path<String>) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "reviewId")?;
    Ok(Json(svc.get(id).await?))
}

async fn create_review(
    State(svc): State<Arc<ReviewsService>>,
    headers: HeaderMap,
    body: Bytes,
) -> ServiceResult<(StatusCode, Json<Value>)> {
    let body = parse_object(&body)?;
    Ok((StatusCode::CREATED, Json(svc.create(body, request_id(&headers)).await?)))
}

async fn update_review(
    State(svc): State<Arc<ReviewsService>>,
    Path(raw): Path<String>,
    body: Bytes,
) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "reviewId")?;
    let body = parse_object(&body)?;
    Ok(Json(svc.update(id, body).await?))
}

async fn delete_review(State(svc): State<Arc<ReviewsService>>, Path(raw): Path<String>) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "reviewId")?;
    Ok(Json(svc.delete(id).await?))
}

async fn product_average(
    State(svc): State<Arc<ReviewsService>>,
    Path(raw): Path<String>,
) -> ServiceResult<Json<Value>> {
    let product_id = as_integer(&Value::String(raw))
        .ok_or_else(|| ServiceError::bad_request("productId must be an integer"))?;
    Ok(Json(svc.average(product_id).await?))
}
