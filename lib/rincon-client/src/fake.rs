//! In-memory registry used by the unit tests

use crate::transport::{Method, RegistryRequest, Transport, TransportResponse};
use crate::{ClientConfig, ClientError, RegistryClient, Result};
use async_trait::async_trait;
use chrono::Utc;
use rincon_api::protocol::V1_PATH_SEPARATOR;
use rincon_api::{Ping, Route, Service};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub user_agent: String,
}

#[derive(Default)]
struct FakeState {
    requests: Vec<RecordedRequest>,
    services: Vec<Service>,
    routes: Vec<Route>,
    next_id: i64,
    v1_only: bool,
    unreachable: bool,
    fail_service_posts: bool,
    fail_deletes: bool,
    rejected_routes: Vec<String>,
    delay: Option<Duration>,
}

pub(crate) struct FakeRegistry {
    state: Mutex<FakeState>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                ..Default::default()
            }),
        })
    }

    /// A registry that only serves the v1 API
    pub fn v1_only() -> Arc<Self> {
        let fake = Self::new();
        fake.state.lock().unwrap().v1_only = true;
        fake
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.state.lock().unwrap().requests.last().cloned().unwrap()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn set_fail_service_posts(&self, fail: bool) {
        self.state.lock().unwrap().fail_service_posts = fail;
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().unwrap().fail_deletes = fail;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn reject_route(&self, route: &str) {
        self.state.lock().unwrap().rejected_routes.push(route.to_string());
    }

    pub fn seed_service(&self, mut service: Service) {
        let mut state = self.state.lock().unwrap();
        if service.id.is_none() {
            service.id = Some(state.next_id);
            state.next_id += 1;
        }
        state.services.push(service);
    }

    fn handle(state: &mut FakeState, request: &RegistryRequest) -> TransportResponse {
        let segments: Vec<&str> = request.path.segments().iter().map(String::as_str).collect();

        match (request.method, segments.as_slice()) {
            (Method::Get, ["rincon", "ping"]) if !state.v1_only => ping(state),
            (Method::Get, ["ping"]) => ping(state),
            (Method::Post, ["rincon", "services"]) => {
                if state.fail_service_posts {
                    return error(500, "database unavailable");
                }
                let mut service: Service = match decode_body(request) {
                    Some(service) => service,
                    None => return error(400, "invalid service"),
                };
                let now = Utc::now();
                match service.id {
                    Some(id) => state.services.retain(|s| s.id != Some(id)),
                    None => {
                        service.id = Some(state.next_id);
                        state.next_id += 1;
                        service.created_at = Some(now);
                    }
                }
                service.updated_at = Some(now);
                state.services.push(service.clone());
                json(200, &service)
            }
            (Method::Delete, ["rincon", "services", id]) => {
                if state.fail_deletes {
                    return error(500, "database unavailable");
                }
                let id: i64 = id.parse().unwrap_or_default();
                let before = state.services.len();
                state.services.retain(|s| s.id != Some(id));
                if state.services.len() == before {
                    error(404, &format!("No service with id {} found", id))
                } else {
                    json(200, &serde_json::json!({"message": "Service deleted"}))
                }
            }
            (Method::Get, ["rincon", "services", name, "routes"]) => {
                let routes: Vec<Route> = state
                    .routes
                    .iter()
                    .filter(|r| r.service_name == *name)
                    .cloned()
                    .collect();
                json(200, &routes)
            }
            (Method::Get, ["rincon", "services", name]) => {
                let services: Vec<Service> = state
                    .services
                    .iter()
                    .filter(|s| s.name == *name)
                    .cloned()
                    .collect();
                json(200, &services)
            }
            (Method::Post, ["rincon", "routes"]) => {
                let mut route: Route = match decode_body(request) {
                    Some(route) => route,
                    None => return error(400, "invalid route"),
                };
                if state.rejected_routes.contains(&route.route) {
                    return error(409, &format!("Route {} is already registered", route.route));
                }
                route.created_at = Some(Utc::now());
                state.routes.push(route.clone());
                json(200, &route)
            }
            (Method::Get, ["rincon", "match"]) => {
                let param = |key: &str| {
                    request
                        .query
                        .iter()
                        .find(|(k, _)| k == key)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                };
                lookup(state, &param("route"), &param("method"))
            }
            (Method::Get, ["rincon", "match", encoded]) if state.v1_only => {
                lookup(state, &encoded.replace(V1_PATH_SEPARATOR, "/"), "")
            }
            _ => error(404, "Not found"),
        }
    }
}

#[async_trait]
impl Transport for FakeRegistry {
    async fn send(&self, request: RegistryRequest) -> Result<TransportResponse> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(RecordedRequest {
                method: request.method,
                path: request.path.to_string(),
                query: request.query.clone(),
                body: request.body.clone(),
                user_agent: request.user_agent.clone(),
            });
            if state.unreachable {
                return Err(ClientError::Transport("connection refused".to_string()));
            }
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        Ok(Self::handle(&mut state, &request))
    }
}

fn ping(state: &FakeState) -> TransportResponse {
    json(
        200,
        &Ping {
            message: "Rincon is online!".to_string(),
            routes: state.routes.len() as u64,
            services: state.services.len() as u64,
        },
    )
}

fn lookup(state: &FakeState, route: &str, method: &str) -> TransportResponse {
    let owner = state.routes.iter().find(|r| {
        r.route.trim_matches('/') == route
            && (r.method.is_empty()
                || r.method == "*"
                || method.is_empty()
                || r.method.eq_ignore_ascii_case(method))
    });
    match owner.and_then(|r| state.services.iter().find(|s| s.name == r.service_name)) {
        Some(service) => json(200, service),
        None => error(404, &format!("No service to handle route {}", route)),
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(request: &RegistryRequest) -> Option<T> {
    request
        .body
        .clone()
        .and_then(|body| serde_json::from_value(body).ok())
}

fn json<T: Serialize>(status: u16, value: &T) -> TransportResponse {
    TransportResponse {
        status,
        body: serde_json::to_vec(value).unwrap(),
    }
}

fn error(status: u16, message: &str) -> TransportResponse {
    json(status, &serde_json::json!({ "message": message }))
}

pub(crate) fn test_config() -> ClientConfig {
    ClientConfig::new("http://rincon.test:10311", "admin", "admin")
}

pub(crate) async fn connect(fake: &Arc<FakeRegistry>, config: ClientConfig) -> RegistryClient {
    RegistryClient::connect_with_transport(config, fake.clone())
        .await
        .unwrap()
}

pub(crate) fn billing() -> Service {
    Service::new(
        "billing",
        "1.0.0",
        "http://billing:8080",
        "http://billing:8080/health",
    )
}
