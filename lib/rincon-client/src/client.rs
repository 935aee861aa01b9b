//! Registry client: connection identity and the registration lifecycle

use crate::config::ClientConfig;
use crate::heartbeat::{HeartbeatEvent, HeartbeatHandle, HeartbeatStats, HEARTBEAT_EVENT_CAPACITY};
use crate::metrics::ClientMetrics;
use crate::transport::{parse_base_url, HttpTransport, Method, RegistryRequest, Transport};
use crate::{ClientError, Result};
use rincon_api::protocol::{service_by_id_path, services_path};
use rincon_api::{ErrorResponse, Ping, ProtocolVersion, Route, Service, REGISTRY_SERVICE_NAME};
use serde::de::DeserializeOwned;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// User agent sent until the client holds a registration
pub(crate) const DEFAULT_USER_AGENT: &str = "rincon-rs";

/// State shared between client handles and the heartbeat task
pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) protocol: ProtocolVersion,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registration: RwLock<Option<Service>>,
    pub(crate) user_agent: RwLock<String>,
    // Serializes register, deregister and heartbeat ticks
    pub(crate) lifecycle: Mutex<()>,
    pub(crate) heartbeat: Mutex<Option<HeartbeatHandle>>,
    pub(crate) heartbeat_stats: HeartbeatStats,
    pub(crate) heartbeat_events: broadcast::Sender<HeartbeatEvent>,
    pub(crate) metrics: ClientMetrics,
    pub(crate) registry_service: OnceLock<Service>,
}

/// RegistryClient talks to a Rincon registry on behalf of one service.
///
/// Handles are cheap to clone and share the same registration and heartbeat.
#[derive(Clone)]
pub struct RegistryClient {
    pub(crate) inner: Arc<ClientInner>,
    pub(crate) timeout: Duration,
}

/// Result of registering a single route during `register`
#[derive(Debug)]
pub struct RouteOutcome {
    pub route: Route,
    pub result: Result<()>,
}

/// Result of `register`: the canonical service plus per-route outcomes
#[derive(Debug)]
pub struct RegistrationReport {
    pub service: Service,
    pub routes: Vec<RouteOutcome>,
}

impl RegistrationReport {
    /// Registry-assigned id of the service
    pub fn id(&self) -> Option<i64> {
        self.service.id
    }

    /// Routes the registry refused
    pub fn failed_routes(&self) -> impl Iterator<Item = &RouteOutcome> {
        self.routes.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn all_routes_registered(&self) -> bool {
        self.routes.iter().all(|outcome| outcome.result.is_ok())
    }
}

impl RegistryClient {
    /// Connect to the registry described by `config` over HTTP.
    ///
    /// The registry is pinged immediately so unreachable or misconfigured
    /// registries fail here instead of on first use.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let base_url = parse_base_url(&config.base_url)?;
        let transport = HttpTransport::new(
            base_url,
            config.auth_user.clone(),
            config.auth_password.clone(),
            config.request_timeout(),
        )?;
        Self::connect_with_transport(config, Arc::new(transport)).await
    }

    /// Connect over a caller-supplied transport
    pub async fn connect_with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        parse_base_url(&config.base_url)?;

        let timeout = config.request_timeout();
        let metrics = ClientMetrics::new()?;
        let (protocol, ping) = negotiate_protocol(transport.as_ref(), &metrics, config.protocol, timeout)
            .await
            .map_err(|e| ClientError::Connection(Box::new(e)))?;

        info!(
            "Connected to registry at {} using protocol {}: {}",
            config.base_url, protocol, ping.message
        );

        let (heartbeat_events, _) = broadcast::channel(HEARTBEAT_EVENT_CAPACITY);
        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                protocol,
                transport,
                registration: RwLock::new(None),
                user_agent: RwLock::new(DEFAULT_USER_AGENT.to_string()),
                lifecycle: Mutex::new(()),
                heartbeat: Mutex::new(None),
                heartbeat_stats: HeartbeatStats::default(),
                heartbeat_events,
                metrics,
                registry_service: OnceLock::new(),
            }),
            timeout,
        };

        match client.services_by_name(REGISTRY_SERVICE_NAME).await {
            Ok(services) => {
                if let Some(service) = services.into_iter().next() {
                    debug!("Registry identifies as {}", service.formatted_name_with_version());
                    let _ = client.inner.registry_service.set(service);
                }
            }
            Err(e) => debug!("Registry service record unavailable: {}", e),
        }

        Ok(client)
    }

    /// A handle sharing this client's state whose requests use `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: self.inner.clone(),
            timeout,
        }
    }

    /// Timeout applied to each request made through this handle
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Registry API revision negotiated at connect
    pub fn protocol(&self) -> ProtocolVersion {
        self.inner.protocol
    }

    pub fn metrics(&self) -> &ClientMetrics {
        &self.inner.metrics
    }

    /// The registry's own service record, when it publishes one
    pub fn registry_service(&self) -> Option<&Service> {
        self.inner.registry_service.get()
    }

    /// User agent currently attached to requests
    pub async fn user_agent(&self) -> String {
        self.inner.user_agent.read().await.clone()
    }

    /// Check that the registry is reachable
    pub async fn ping(&self) -> Result<Ping> {
        self.request_json(
            "ping",
            RegistryRequest::new(Method::Get, self.inner.protocol.ping_path()),
        )
        .await
    }

    pub async fn is_registered(&self) -> bool {
        self.inner.registration.read().await.is_some()
    }

    /// The service this client is registered as, if any
    pub async fn current_registration(&self) -> Option<Service> {
        self.inner.registration.read().await.clone()
    }

    /// Register `service` and its routes, then start the client heartbeat.
    ///
    /// Only the service registration itself can fail this call. Routes the
    /// registry refuses are logged and reported in the returned report.
    pub async fn register(&self, service: Service, routes: Vec<Route>) -> Result<RegistrationReport> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let registered = self.announce(&service).await?;
        info!(
            "Registered service {} with id {:?}",
            registered.name, registered.id
        );

        let mut outcomes = Vec::with_capacity(routes.len());
        for route in routes {
            let result = self.register_route(&route.route, &route.method).await;
            if let Err(e) = &result {
                warn!("Failed to register route {} {}: {}", route.method, route.route, e);
            }
            outcomes.push(RouteOutcome { route, result });
        }

        match self.start_heartbeat().await {
            Ok(()) => {}
            Err(ClientError::ServerHeartbeatMode) | Err(ClientError::HeartbeatAlreadyActive) => {
                debug!("Client heartbeat not started: mode or already running");
            }
            Err(e) => warn!("Failed to start heartbeat: {}", e),
        }

        Ok(RegistrationReport {
            service: registered,
            routes: outcomes,
        })
    }

    /// Remove this client's service from the registry.
    ///
    /// The heartbeat is stopped and the local registration cleared even when
    /// the registry rejects the delete; that rejection is still returned.
    pub async fn deregister(&self) -> Result<()> {
        let _lifecycle = self.inner.lifecycle.lock().await;

        let service = self
            .inner
            .registration
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotRegistered)?;

        let result = match service.id {
            Some(id) => self
                .request("deregister", RegistryRequest::new(Method::Delete, service_by_id_path(id)))
                .await
                .map(|_| ()),
            None => {
                warn!("Service {} has no registry id, clearing locally", service.name);
                Ok(())
            }
        };

        match self.stop_heartbeat().await {
            Ok(()) | Err(ClientError::HeartbeatNotActive) | Err(ClientError::ServerHeartbeatMode) => {}
            Err(e) => warn!("Failed to stop heartbeat: {}", e),
        }

        *self.inner.registration.write().await = None;
        *self.inner.user_agent.write().await = DEFAULT_USER_AGENT.to_string();

        match &result {
            Ok(()) => info!("Deregistered service {}", service.name),
            Err(e) => warn!("Registry rejected deregistration of {}: {}", service.name, e),
        }
        result
    }

    /// Send `service` to the registry and adopt the canonical copy it returns
    pub(crate) async fn announce(&self, service: &Service) -> Result<Service> {
        let body = serde_json::to_value(service)?;
        let registered: Service = self
            .request_json(
                "register",
                RegistryRequest::new(Method::Post, services_path()).body(body),
            )
            .await?;

        let tag = client_tag(&registered);
        *self.inner.registration.write().await = Some(registered.clone());
        *self.inner.user_agent.write().await = tag;
        Ok(registered)
    }

    /// Send a request with this handle's user agent and timeout
    pub(crate) async fn request(&self, operation: &str, request: RegistryRequest) -> Result<Vec<u8>> {
        let user_agent = self.inner.user_agent.read().await.clone();
        let request = request.user_agent(user_agent).timeout(self.timeout);

        let result = exchange(self.inner.transport.as_ref(), request).await;
        self.inner.metrics.record_request(operation, request_outcome(&result));
        result
    }

    pub(crate) async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RegistryRequest,
    ) -> Result<T> {
        let body = self.request(operation, request).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Per-session tag used as the user agent, e.g. "billing-1"
fn client_tag(service: &Service) -> String {
    match service.id {
        Some(id) => format!("{}-{}", service.name, id),
        None => service.name.clone(),
    }
}

/// Deliver a request and turn non-2xx answers into registry errors
async fn exchange(transport: &dyn Transport, request: RegistryRequest) -> Result<Vec<u8>> {
    let timeout = request.timeout;
    let response = match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(response) => response?,
        Err(_) => return Err(ClientError::Timeout(timeout)),
    };

    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ClientError::Registry(ErrorResponse::from_body(
            response.status,
            &response.body,
        )))
    }
}

/// Metrics label for the outcome of a registry request
fn request_outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ClientError::Registry(_)) => "registry_error",
        Err(_) => "transport_error",
    }
}

async fn ping_at(
    transport: &dyn Transport,
    metrics: &ClientMetrics,
    protocol: ProtocolVersion,
    timeout: Duration,
) -> Result<Ping> {
    let request = RegistryRequest::new(Method::Get, protocol.ping_path()).timeout(timeout);
    let result = exchange(transport, request).await;
    metrics.record_request("ping", request_outcome(&result));
    Ok(serde_json::from_slice(&result?)?)
}

/// Ping the registry, falling back to the v1 API when v2 is not served
async fn negotiate_protocol(
    transport: &dyn Transport,
    metrics: &ClientMetrics,
    pinned: Option<ProtocolVersion>,
    timeout: Duration,
) -> Result<(ProtocolVersion, Ping)> {
    if let Some(protocol) = pinned {
        let ping = ping_at(transport, metrics, protocol, timeout).await?;
        return Ok((protocol, ping));
    }

    match ping_at(transport, metrics, ProtocolVersion::V2, timeout).await {
        Ok(ping) => Ok((ProtocolVersion::V2, ping)),
        Err(ClientError::Registry(envelope)) if envelope.status_code == 404 => {
            debug!("Registry does not serve the v2 API, falling back to v1");
            let ping = ping_at(transport, metrics, ProtocolVersion::V1, timeout).await?;
            Ok((ProtocolVersion::V1, ping))
        }
        Err(e) => Err(e),
    }
}
