//! Users service.
//!
//! Keys: `users:user:{id}` (entity TTL), `users:all` (collection TTL).

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Map, Value};

use crate::cache::{keys, CacheAside, KvCache};
use crate::config::CacheConfig;
use crate::services::common::{
    health_body, object_of, parse_id, parse_object, status_body, ServiceError, ServiceResult,
};
use crate::storage::{Filter, NewRecord, RecordPatch, Store};

const LABEL: &str = "Users";

pub struct UsersService {
    store: Arc<dyn Store>,
    cache: CacheAside,
    ttl: CacheConfig,
}

impl UsersService {
    pub fn new(store: Arc<dyn Store>, cache: Arc<dyn KvCache>, ttl: CacheConfig) -> Self {
        Self {
            store,
            cache: CacheAside::new(cache, "users"),
            ttl,
        }
    }

    pub async fn list(&self) -> ServiceResult<Vec<Value>> {
        let users = self
            .cache
            .get_or_populate(keys::users::ALL, self.ttl.collection_ttl(), || async {
                let records = self.store.find_all(&Filter::all()).await?;
                Ok::<_, ServiceError>(Some(records.iter().map(|r| r.to_dto()).collect::<Vec<_>>()))
            })
            .await?;
        Ok(users.unwrap_or_default())
    }

    pub async fn get(&self, id: u64) -> ServiceResult<Value> {
        self.cache
            .get_or_populate(&keys::users::user(id), self.ttl.entity_ttl(), || async {
                Ok::<_, ServiceError>(self.store.find_by_id(id).await?.map(|r| r.to_dto()))
            })
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))
    }

    pub async fn create(&self, body: Map<String, Value>) -> ServiceResult<Value> {
        let name = match body.get("name") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            _ => return Err(ServiceError::bad_request("name is required (non-empty string)")),
        };

        let record = self
            .store
            .create(NewRecord {
                fields: object_of("name", name),
                data: body,
                ..Default::default()
            })
            .await?;

        self.cache.invalidate(&[keys::users::ALL.to_string()], &[]).await;
        tracing::info!(user_id = record.id, "User created");
        Ok(record.to_dto())
    }

    pub async fn update(&self, id: u64, body: Map<String, Value>) -> ServiceResult<Value> {
        let mut fields = Map::new();
        match body.get("name") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if !s.trim().is_empty() => {
                fields.insert("name".to_string(), Value::String(s.trim().to_string()));
            }
            Some(_) => return Err(ServiceError::bad_request("name must be non-empty string")),
        }

        let record = self
            .store
            .update(id, RecordPatch { fields, data: body })
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;

        self.cache
            .invalidate(&[keys::users::user(id), keys::users::ALL.to_string()], &[])
            .await;
        Ok(record.to_dto())
    }

    pub async fn delete(&self, id: u64) -> ServiceResult<Value> {
        let record = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;

        self.cache
            .invalidate(&[keys::users::user(id), keys::users::ALL.to_string()], &[])
            .await;
        Ok(json!({ "message": "User deleted", "deletedUser": record.to_dto() }))
    }
}

pub fn router(service: Arc<UsersService>) -> Router {
    Router::new()
        .route("/users/status", get(|| async { status_body(LABEL) }))
        .route("/users/health", get(|| async { health_body(LABEL) }))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{userId}", get(get_user).put(update_user).delete(delete_user))
        .with_state(service)
}

async fn list_users(State(svc): State<Arc<UsersService>>) -> ServiceResult<Json<Vec<Value>>> {
    Ok(Json(svc.list().await?))
}

async fn get_user(State(svc): State<Arc<UsersService>>, Path(raw): Path<String>) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "userId")?;
    Ok(Json(svc.get(id).await?))
}

async fn create_user(State(svc): State<Arc<UsersService>>, body: Bytes) -> ServiceResult<(StatusCode, Json<Value>)> {
    let body = parse_object(&body)?;
    Ok((StatusCode::CREATED, Json(svc.create(body).await?)))
}

async fn update_user(
    State(svc): State<Arc<UsersService>>,
    Path(raw): Path<String>,
    body: Bytes,
) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "userId")?;
    let body = parse_object(&body)?;
    Ok(Json(svc.update(id, body).await?))
}

async fn delete_user(State(svc): State<Arc<UsersService>>, Path(raw): Path<String>) -> ServiceResult<Json<Value>> {
    let id = parse_id(&raw, "userId")?;
    Ok(Json(svc.delete(id).await?))
}
