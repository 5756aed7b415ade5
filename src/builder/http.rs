//! HTTP routers, middlewares and services.

use std::sync::Arc;

use crate::builder::{BuildError, Builder, ComponentKind, InstantiationStack};
use crate::config::dynamic::{
    HttpLoadBalancerConfig, HttpMiddlewareConfig, HttpRouterConfig, HttpServiceConfig, WeightedConfig,
};
use crate::config::schema::Protocol;
use crate::handler::HttpHandler;
use crate::http::forward::ForwardHandler;
use crate::load_balancer::{RoundRobin, WeightedRoundRobin};
use crate::middleware::{
    apply_http, Chain, Headers, HttpIpAllowList, HttpMiddleware, IpAllowList, RateLimit, StripPrefix,
};
use crate::routing::matcher::AndMatcher;
use crate::routing::HttpRoute;

impl Builder<'_> {
    /// Build a router: its middlewares, outermost first, around its service.
    pub fn build_http_router(
        &mut self,
        name: &str,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn HttpHandler>, BuildError> {
        let stack = stack.push(ComponentKind::Router, name)?;
        let config = self.config;
        let router = config
            .http
            .routers
            .get(name)
            .ok_or_else(|| BuildError::not_found(ComponentKind::Router, name))?;
        self.record_construction(Protocol::Http, ComponentKind::Router, name);

        let mut layers = Vec::with_capacity(router.middlewares.len());
        for middleware in &router.middlewares {
            layers.push(self.build_http_middleware(middleware, &stack)?);
        }
        let service = self.build_http_service(&router.service, &stack)?;

        Ok(apply_http(&layers, service))
    }

    pub fn build_http_middleware(
        &mut self,
        name: &str,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn HttpMiddleware>, BuildError> {
        let stack = stack.push(ComponentKind::Middleware, name)?;
        if let Some(built) = self.http_middlewares.get(name) {
            return built.clone();
        }

        let config = self.config;
        let middleware = config
            .http
            .middlewares
            .get(name)
            .ok_or_else(|| BuildError::not_found(ComponentKind::Middleware, name))?;
        self.record_construction(Protocol::Http, ComponentKind::Middleware, name);

        let result = self.construct_http_middleware(name, middleware, &stack);
        self.record_outcome(Protocol::Http, ComponentKind::Middleware, name, &result);
        self.http_middlewares.insert(name.to_string(), result.clone());
        result
    }

    fn construct_http_middleware(
        &mut self,
        name: &str,
        middleware: &HttpMiddlewareConfig,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn HttpMiddleware>, BuildError> {
        let invalid = |reason: String| BuildError::invalid(ComponentKind::Middleware, name, reason);

        let built: Arc<dyn HttpMiddleware> = match middleware {
            HttpMiddlewareConfig::Chain(chain) => {
                let mut layers = Vec::with_capacity(chain.middlewares.len());
                for child in &chain.middlewares {
                    layers.push(self.build_http_middleware(child, stack)?);
                }
                Arc::new(Chain::new(layers))
            }
            HttpMiddlewareConfig::Headers(headers) => {
                Arc::new(Headers::new(&headers.request, &headers.response).map_err(invalid)?)
            }
            HttpMiddlewareConfig::StripPrefix(strip) => {
                Arc::new(StripPrefix::new(&strip.prefixes).map_err(invalid)?)
            }
            HttpMiddlewareConfig::IpAllowList(allow) => Arc::new(HttpIpAllowList::new(
                IpAllowList::parse(&allow.source_range).map_err(invalid)?,
            )),
            HttpMiddlewareConfig::RateLimit(limit) => {
                let limit = match self.states {
                    Some(states) => states.rate_limit(name, limit),
                    None => RateLimit::new(name, limit.average, limit.burst),
                };
                Arc::new(limit.map_err(invalid)?)
            }
        };
        Ok(built)
    }

    pub fn build_http_service(
        &mut self,
        name: &str,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn HttpHandler>, BuildError> {
        let stack = stack.push(ComponentKind::Service, name)?;
        if let Some(built) = self.http_services.get(name) {
            return built.clone();
        }

        let config = self.config;
        let service = config
            .http
            .services
            .get(name)
            .ok_or_else(|| BuildError::not_found(ComponentKind::Service, name))?;
        self.record_construction(Protocol::Http, ComponentKind::Service, name);

        let result = match service {
            HttpServiceConfig::LoadBalancer(lb) => self.http_load_balancer(name, lb),
            HttpServiceConfig::Weighted(weighted) => self.http_weighted(name, weighted, &stack),
        };
        self.record_outcome(Protocol::Http, ComponentKind::Service, name, &result);
        self.http_services.insert(name.to_string(), result.clone());
        result
    }

    fn http_load_balancer(
        &self,
        name: &str,
        config: &HttpLoadBalancerConfig,
    ) -> Result<Arc<dyn HttpHandler>, BuildError> {
        let balancer: RoundRobin<dyn HttpHandler> = RoundRobin::new(name);
        for server in &config.servers {
            let forwarder = ForwardHandler::new(
                &server.url,
                config.pass_host_header,
                self.client.clone(),
                self.timeouts.request(),
            )
            .map_err(|reason| BuildError::invalid(ComponentKind::Service, name, reason))?;

            if !self.is_healthy(&server.url) {
                tracing::debug!(service = name, server = %server.url, "Skipping unhealthy server");
                continue;
            }
            balancer.add_server(Arc::new(forwarder));
        }

        if balancer.is_empty() {
            tracing::warn!(service = name, "Service has no available server");
        }
        Ok(Arc::new(balancer))
    }

    fn http_weighted(
        &mut self,
        name: &str,
        config: &WeightedConfig,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn HttpHandler>, BuildError> {
        let balancer: WeightedRoundRobin<dyn HttpHandler> = WeightedRoundRobin::new(name);
        for child in &config.services {
            let handler = self.build_http_service(&child.name, stack)?;
            balancer.add_server(handler, child.weight);
        }
        Ok(Arc::new(balancer))
    }
}

pub(crate) fn route(name: &str, config: &HttpRouterConfig, handler: Arc<dyn HttpHandler>) -> HttpRoute {
    HttpRoute::new(name, config.priority, AndMatcher::from_rule(&config.rule), handler)
}
