//! Orders service.
//!
//! Keys: `orders:order:{id}`, `orders:all` and the filtered family
//! `orders:user:{userId}`. Every mutation drops the whole `orders:user:`
//! family; an update can move an order between users, so both the old and
//! the new owner's lists are stale.

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::cache::{keys, CacheAside, KvCache};
use crate::config::CacheConfig;
use crate::services::common::{
    as_integer, health_body, object_of, parse_id, parse_object, query_integer, status_body, ServiceError,
    ServiceResult,
};
use crate::storage::{Filter, NewRecord, RecordPatch, Store};

const LABEL: &str = "Orders";

pub struct OrdersService {
    store: Arc<dyn Store>,
    cache: CacheAside,
    ttl: CacheConfig,
}

impl OrdersService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn KvCache>, ttl: CacheConfig) -> Self {
        Self {
            store,
            cache: CacheAside::new(cache, "orders"),
            ttl,
        }
    }

    /// All orders, or one user's orders.
    pub async fn list(&self, user_id: Option<i64>) -> ServiceResult<Vec<Value>> {
        let (key, filter) = match user_id {
            Some(user) if user > 0 => (keys::orders::by_user(user as u64), Filter::all().eq("userId", user)),
            Some(_) => return Ok(Vec::new()),
            None => (keys::orders::ALL.to_string(), Filter::all()),
        };

        let orders = self
            .cache
            .get_or_populate(&key, self.ttl.collection_ttl(), || async {
                let records = self.store.find_all(&filter).await?;
                Ok::<_, ServiceError>(Some(records.iter().map(|r| r.to_dto()).collect::<Vec<_>>()))
            })
            .await?;
        Ok(orders.unwrap_or_default())
    }

    pub async fn get(&self, id: u64) -> ServiceResult<Value> {
        self.cache
            .get_or_populate(&keys::orders::order(id), self.ttl.entity_ttl(), || async {
                Ok::<_, ServiceError>(self.store.find_by_id(id).await?.map(|r| r.to_dto()))
            })
            .await?
            .ok_or_else(|| ServiceError::not_found("Order not found"))
    }

    pub async fn create(&self, body: Map<String, Value>) -> ServiceResult<Value> {
        let user_id = body
            .get("userId")
            .and_then(as_integer)
            .filter(|id| *id > 0)
            .ok_or_else(|| ServiceError::bad_request("userId is required (number > 0)"))?;

        if body.get("productId").map_or(true, Value::is_null) {
            return Err(ServiceError::bad_request("productId is required"));
        }

        let record = self
            .store
            .create(NewRecord {
                fields: object_of("userId", user_id),
                data: body,
                ..Default::default()
            })
            .await?;

        self.invalidate(None).await;
        tracing::info!(order_id = record.id, user_id, "Order created");
        Ok(record.to_dto())
    }

    pub async fn update(&self, id: u64, body: Map<String, Value>) -> ServiceResult<Value> {
        let mut fields = Map::new();
        match body.get("userId") {
            None | Some(Value::Null) => {}
            Some(raw) => {
                let user_id = as_integer(raw)
                    .filter(|id| *id > 0)
                    .ok_or_else(|| ServiceError::bad_request("userId must be > 0"))?;
                fields.insert("userId".to_string(), Value::from(user_id));
            }
        }

        let record = self
            .store
            .update(id, RecordPatch { fields, data: body })
            .await?
            .ok_or_else(|| ServiceError::not_found("Order not found"))?;

        self.invalidate(Some(id)).await;
        Ok(record.to_dto())
    }

    pub async fn delete(&self, id: u64) -> ServiceResult<Value> {
        let record = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Order not found"))?;

        self.invalidate(Some(id)).await;
        Ok(json!({ "message": "Order deleted", "deletedOrder": record.to_dto() }))
    }

    async fn invalidate(&self, id: Option<u64>) {
        let mut keys_to_drop = Vec::with_capacity(2);
        if let Some(id) = id {
            keys_to_drop.push(keys::orders::order(id));
        }
        keys_to_drop.push(keys::orders::ALL.to_string());

        self.cache
            .invalidate(&keys_to_drop, &[keys::orders::BY_USER_PREFIX.to_string()])
            .await;
    }
}

pub fn router(service: Arc<OrdersService>) -> Router {
    Router::new()
        .route("/orders/status", get(|| async { status_body(LABEL) }))
        .route("/orders/health", get(|| async { health_body(LABEL) }))
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/{orderId}", get(get_order).put(update_order).delete(delete_order))
        .with_state(service)
}

async fn list_orders(
    State(svc): State<Arc<OrdersService>>,
    Query(query): Query<HashMap<String, String>>,
) -> ServiceResult<Json<Vec<Value>>> {
    let user_id = query_integer(query.get("userId"), "Invalid userId in query")?;
    Ok(Json(svc.list(user_id).await?))
}

async fn get_order(State(svc): State<Arc<OrdersService>>, Path(raw): Path<String>) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "orderId")?;
    Ok(Json(svc.get(id).await?))
}

async fn create_order(State(svc): State<Arc<OrdersService>>, body: Bytes) -> ServiceResult<(StatusCode, Json<Value>)> {
    let body = parse_object(&body)?;
    Ok((StatusCode::CREATED, Json(svc.create(body).await?)))
}

async fn update_order(
    State(svc): State<Arc<OrdersService>>,
    Path(raw): Path<String>,
    body: Bytes,
) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "orderId")?;
    let body = parse_object(&body)?;
    Ok(Json(svc.update(id, body).await?))
}

async fn delete_order(State(svc): State<Arc<OrdersService>>, Path(raw): Path<String>) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "orderId")?;
    Ok(Json(svc.delete(id).await?))
}
