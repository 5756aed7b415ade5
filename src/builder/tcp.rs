//! TCP routers, middlewares and services.

use std::sync::Arc;

use crate::builder::{BuildError, Builder, ComponentKind, InstantiationStack};
use crate::config::dynamic::{
    TcpLoadBalancerConfig, TcpMiddlewareConfig, TcpRouterConfig, TcpServiceConfig, WeightedConfig,
};
use crate::config::schema::Protocol;
use crate::handler::TcpHandler;
use crate::load_balancer::{RoundRobin, WeightedRoundRobin};
use crate::middleware::{apply_tcp, InFlightConn, IpAllowList, TcpIpAllowList, TcpMiddleware};
use crate::net::forward::TcpForwarder;
use crate::routing::TcpRoute;

impl Builder<'_> {
    pub fn build_tcp_router(
        &mut self,
        name: &str,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn TcpHandler>, BuildError> {
        let stack = stack.push(ComponentKind::Router, name)?;
        let config = self.config;
        let router = config
            .tcp
            .routers
            .get(name)
            .ok_or_else(|| BuildError::not_found(ComponentKind::Router, name))?;
        self.record_construction(Protocol::Tcp, ComponentKind::Router, name);

        let mut layers = Vec::with_capacity(router.middlewares.len());
        for middleware in &router.middlewares {
            layers.push(self.build_tcp_middleware(middleware, &stack)?);
        }
        let service = self.build_tcp_service(&router.service, &stack)?;

        Ok(apply_tcp(&layers, service))
    }

    pub fn build_tcp_middleware(
        &mut self,
        name: &str,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn TcpMiddleware>, BuildError> {
        let _stack = stack.push(ComponentKind::Middleware, name)?;
        if let Some(built) = self.tcp_middlewares.get(name) {
            return built.clone();
        }

        let config = self.config;
        let middleware = config
            .tcp
            .middlewares
            .get(name)
            .ok_or_else(|| BuildError::not_found(ComponentKind::Middleware, name))?;
        self.record_construction(Protocol::Tcp, ComponentKind::Middleware, name);

        let invalid = |reason: String| BuildError::invalid(ComponentKind::Middleware, name, reason);
        let result: Result<Arc<dyn TcpMiddleware>, BuildError> = match middleware {
            TcpMiddlewareConfig::IpAllowList(allow) => IpAllowList::parse(&allow.source_range)
                .map(|list| Arc::new(TcpIpAllowList::new(list)) as Arc<dyn TcpMiddleware>)
                .map_err(invalid),
            TcpMiddlewareConfig::InFlightConn(limit) => match self.states {
                Some(states) => states.in_flight_conn(name, limit),
                None => InFlightConn::new(limit.amount),
            }
            .map(|m| Arc::new(m) as Arc<dyn TcpMiddleware>)
            .map_err(invalid),
        };
        self.record_outcome(Protocol::Tcp, ComponentKind::Middleware, name, &result);
        self.tcp_middlewares.insert(name.to_string(), result.clone());
        result
    }

    pub fn build_tcp_service(
        &mut self,
        name: &str,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn TcpHandler>, BuildError> {
        let stack = stack.push(ComponentKind::Service, name)?;
        if let Some(built) = self.tcp_services.get(name) {
            return built.clone();
        }

        let config = self.config;
        let service = config
            .tcp
            .services
            .get(name)
            .ok_or_else(|| BuildError::not_found(ComponentKind::Service, name))?;
        self.record_construction(Protocol::Tcp, ComponentKind::Service, name);

        let result = match service {
            TcpServiceConfig::LoadBalancer(lb) => self.tcp_load_balancer(name, lb),
            TcpServiceConfig::Weighted(weighted) => self.tcp_weighted(name, weighted, &stack),
        };
        self.record_outcome(Protocol::Tcp, ComponentKind::Service, name, &result);
        self.tcp_services.insert(name.to_string(), result.clone());
        result
    }

    fn tcp_load_balancer(
        &self,
        name: &str,
        config: &TcpLoadBalancerConfig,
    ) -> Result<Arc<dyn TcpHandler>, BuildError> {
        let balancer: RoundRobin<dyn TcpHandler> = RoundRobin::new(name);
        for server in &config.servers {
            let forwarder = TcpForwarder::new(&server.address, self.timeouts.connect())
                .map_err(|reason| BuildError::invalid(ComponentKind::Service, name, reason))?;

            if !self.is_healthy(&server.address) {
                tracing::debug!(service = name, server = %server.address, "Skipping unhealthy server");
                continue;
            }
            balancer.add_server(Arc::new(forwarder));
        }

        if balancer.is_empty() {
            tracing::warn!(service = name, "Service has no available server");
        }
        Ok(Arc::new(balancer))
    }

    fn tcp_weighted(
        &mut self,
        name: &str,
        config: &WeightedConfig,
        stack: &InstantiationStack,
    ) -> Result<Arc<dyn TcpHandler>, BuildError> {
        let balancer: WeightedRoundRobin<dyn TcpHandler> = WeightedRoundRobin::new(name);
        for child in &config.services {
            let handler = self.build_tcp_service(&child.name, stack)?;
            balancer.add_server(handler, child.weight);
        }
        Ok(Arc::new(balancer))
    }
}

pub(crate) fn route(name: &str, config: &TcpRouterConfig, handler: Arc<dyn TcpHandler>) -> TcpRoute {
    TcpRoute::new(name, config.priority, handler)
}
