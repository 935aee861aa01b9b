//! Route registration, lookup and route-to-service matching
//!
//! Matching semantics (longest prefix, wildcards, method precedence) belong to
//! the registry; the client only normalizes the path and forwards the query.

use crate::client::RegistryClient;
use crate::transport::{Method, RegistryRequest};
use crate::{ClientError, Result};
use rincon_api::protocol::{routes_path, service_routes_path, services_by_name_path};
use rincon_api::{Route, Service};
use tracing::debug;

/// Strip leading and trailing `/` from a route path
pub fn normalize_route_path(route: &str) -> &str {
    route.trim_matches('/')
}

impl RegistryClient {
    /// Claim `route` for the registered service
    pub async fn register_route(&self, route: &str, method: &str) -> Result<()> {
        let service_name = self
            .inner
            .registration
            .read()
            .await
            .as_ref()
            .map(|service| service.name.clone())
            .ok_or(ClientError::NotRegistered)?;

        let method = if self.inner.protocol.supports_route_methods() {
            method.to_string()
        } else {
            String::new()
        };
        let body = serde_json::to_value(Route {
            route: route.to_string(),
            service_name,
            method,
            created_at: None,
        })?;

        self.request(
            "register_route",
            RegistryRequest::new(Method::Post, routes_path()).body(body),
        )
        .await?;

        debug!("Registered route {}", route);
        Ok(())
    }

    /// Routes registered by any service named `service_name`
    pub async fn routes_for_service(&self, service_name: &str) -> Result<Vec<Route>> {
        self.request_json(
            "routes_for_service",
            RegistryRequest::new(Method::Get, service_routes_path(service_name)),
        )
        .await
    }

    /// Routes registered by this client's service
    pub async fn routes_for_current_service(&self) -> Result<Vec<Route>> {
        let service_name = self
            .inner
            .registration
            .read()
            .await
            .as_ref()
            .map(|service| service.name.clone())
            .ok_or(ClientError::NotRegistered)?;

        self.routes_for_service(&service_name).await
    }

    /// Ask the registry which service handles `route` for `method`
    pub async fn match_route(&self, route: &str, method: &str) -> Result<Service> {
        if !self.is_registered().await {
            return Err(ClientError::NotRegistered);
        }

        let normalized = normalize_route_path(route);
        let (path, query) = self.inner.protocol.match_request(normalized, method);

        match self
            .request_json::<Service>("match_route", RegistryRequest::new(Method::Get, path).query(query))
            .await
        {
            Ok(service) => Ok(service),
            Err(ClientError::Registry(envelope)) if envelope.status_code == 404 => {
                debug!("No match for {} {}: {}", method, normalized, envelope);
                Err(ClientError::NoMatch {
                    route: normalized.to_string(),
                    method: method.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// All registered instances of the service named `name`
    pub async fn services_by_name(&self, name: &str) -> Result<Vec<Service>> {
        self.request_json(
            "services_by_name",
            RegistryRequest::new(Method::Get, services_by_name_path(name)),
        )
        .await
    }
}
