//! Shared helpers for HTTP-level tests: an in-memory app, tokens, and
//! request shortcuts driven through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use camfleet::api::rest::{AppState, RestApi};
use camfleet::config::{Config, SecurityConfig};
use camfleet::db::repositories::InMemoryCameraRepository;
use camfleet::device_manager::{DeviceScanner, DiscoveredDevice};
use camfleet::security::Role;
use camfleet::services::assembler::RuntimeCameraConfig;
use camfleet::services::reload::{EngineStatus, TrackingEngine};
use camfleet::services::EngineHandle;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub repository: Arc<InMemoryCameraRepository>,
    pub engine: EngineHandle,
    pub admin_token: String,
    pub super_admin_token: String,
}

/// Scanner returning a fixed device list
pub struct StaticScanner(pub Vec<DiscoveredDevice>);

#[async_trait]
impl DeviceScanner for StaticScanner {
    async fn scan(&self, _timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        Ok(self.0.clone())
    }
}

/// Engine double that records every configuration set it receives
#[derive(Default)]
pub struct RecordingEngine {
    running: Mutex<bool>,
    pushed: Mutex<Vec<Vec<RuntimeCameraConfig>>>,
}

impl RecordingEngine {
    pub fn pushed(&self) -> Vec<Vec<RuntimeCameraConfig>> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrackingEngine for RecordingEngine {
    async fn start(&self, configs: Vec<RuntimeCameraConfig>) -> Result<()> {
        *self.running.lock().unwrap() = true;
        self.pushed.lock().unwrap().push(configs);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        *self.running.lock().unwrap() = false;
        Ok(())
    }

    async fn reload(&self, configs: Vec<RuntimeCameraConfig>) -> Result<()> {
        self.pushed.lock().unwrap().push(configs);
        Ok(())
    }

    async fn status(&self) -> Result<EngineStatus> {
        Ok(EngineStatus {
            running: *self.running.lock().unwrap(),
            camera_count: self.pushed.lock().unwrap().last().map_or(0, Vec::len),
        })
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.security = SecurityConfig {
        jwt_secret: "integration-test-secret".to_string(),
        jwt_expiration_minutes: 10,
    };
    config.discovery.default_timeout_secs = 1;
    config
}

pub fn build_test_app(devices: Vec<DiscoveredDevice>) -> TestApp {
    let repository = Arc::new(InMemoryCameraRepository::new());
    let engine = EngineHandle::new();
    let state = AppState::new(
        &test_config(),
        repository.clone(),
        Arc::new(StaticScanner(devices)),
        engine.clone(),
    );

    let token = |subject: &str, role: Role| {
        state
            .security
            .generate_token(subject, subject, role)
            .unwrap()
            .access_token
    };
    let admin_token = token("admin", Role::Admin);
    let super_admin_token = token("root", Role::SuperAdmin);

    TestApp {
        router: RestApi::router(state.clone()),
        state,
        repository,
        engine,
        admin_token,
        super_admin_token,
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        send(&self.router, Method::GET, uri, Some(&self.admin_token), None).await
    }

    pub async fn post(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        send(
            &self.router,
            Method::POST,
            uri,
            Some(&self.super_admin_token),
            Some(body),
        )
        .await
    }

    pub async fn put(&self, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        send(
            &self.router,
            Method::PUT,
            uri,
            Some(&self.super_admin_token),
            Some(body),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        send(
            &self.router,
            Method::DELETE,
            uri,
            Some(&self.super_admin_token),
            None,
        )
        .await
    }
}
