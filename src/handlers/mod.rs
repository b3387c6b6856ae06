pub mod admin;
pub mod lookup;


use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{
    corpus::CorpusError,
    manager::{self, Manager},
    models::LangMap,
    store::StoreError,
};

/// Application context passed to all handlers.
pub struct Ctx {
    pub mgr: Arc<Manager>,
    pub langs: LangMap,
    pub consts: Consts,
    pub version: String,
}

/// Application constants.
#[derive(Clone, Serialize)]
pub struct Consts {
    #[serde(skip)]
    pub admin_username: String,
    #[serde(skip)]
    pub admin_password: String,

    pub enrichment: bool,

    pub default_search_limit: i32,
    pub max_search_limit: i32,
    pub default_popular_limit: i32,
}

impl Default for Consts {
    fn default() -> Self {
        Self {
            admin_username: String::new(),
            admin_password: String::new(),
            enrichment: false,
            default_search_limit: 10,
            max_search_limit: 50,
            default_popular_limit: 20,
        }
    }
}

/// API response wrapper.
#[derive(Serialize)]
pub struct ApiResp<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T: Serialize> IntoResponse for ApiResp<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

pub fn json<T: Serialize>(data: T) -> ApiResp<T> {
    ApiResp {
        data: Some(data),
        message: None,
    }
}

/// API error type.
#[derive(Debug)]
pub struct ApiErr {
    pub message: String,
    pub status: StatusCode,
}

impl ApiErr {
    pub fn new(message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            message: message.into(),
            status,
        }
    }
}

impl From<manager::Error> for ApiErr {
    fn from(err: manager::Error) -> Self {
        let status = match err {
            manager::Error::UnknownLang(_) | manager::Error::Validation(_) => {
                StatusCode::BAD_REQUEST
            }
            manager::Error::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(err.to_string(), status)
    }
}

impl From<StoreError> for ApiErr {
    fn from(err: StoreError) -> Self {
        log::error!("store error: {}", err);
        Self::new("error reading from the database", StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<CorpusError> for ApiErr {
    fn from(err: CorpusError) -> Self {
        Self::new(err.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        let json = Json(ApiResp::<()> {
            data: None,
            message: Some(self.message),
        });
        (self.status, json).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiErr>;

/// Clamp a requested result limit. An absent limit gets the default.
pub fn limit(requested: Option<i32>, default: i32, max: i32) -> i32 {
    match requested {
        None => default.min(max),
        Some(n) => n.min(max).max(0),
    }
}

/// Limit query param.
#[derive(Debug, serde::Deserialize, Default)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<i32>,
}
