//! Client IP allow-listing for HTTP and TCP.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use ipnet::IpNet;
use tokio::io::AsyncWriteExt;

use crate::handler::{client_addr, HandlerError, HttpHandler, TcpConnection, TcpHandler};
use crate::middleware::{HttpMiddleware, TcpMiddleware};

/// A set of CIDR ranges. Bare addresses are treated as single-host ranges.
#[derive(Debug, Clone)]
pub struct IpAllowList {
    ranges: Vec<IpNet>,
}

impl IpAllowList {
    pub fn parse(source_range: &[String]) -> Result<Self, String> {
        let ranges = source_range
            .iter()
            .map(|range| parse_range(range).ok_or_else(|| format!("invalid IP range {range:?}")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { ranges })
    }

    pub fn allows(&self, ip: IpAddr) -> bool {
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };
        self.ranges.iter().any(|range| range.contains(&ip))
    }
}

fn parse_range(range: &str) -> Option<IpNet> {
    if let Ok(net) = range.parse::<IpNet>() {
        return Some(net);
    }
    let ip = range.parse::<IpAddr>().ok()?;
    let prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, prefix).ok()
}

/// HTTP flavour: answers 403 to clients outside the list.
pub struct HttpIpAllowList {
    list: Arc<IpAllowList>,
}

impl HttpIpAllowList {
    pub fn new(list: IpAllowList) -> Self {
        Self { list: Arc::new(list) }
    }
}

impl HttpMiddleware for HttpIpAllowList {
    fn wrap(&self, next: Arc<dyn HttpHandler>) -> Arc<dyn HttpHandler> {
        Arc::new(HttpAllowHandler {
            list: self.list.clone(),
            next,
        })
    }
}

struct HttpAllowHandler {
    list: Arc<IpAllowList>,
    next: Arc<dyn HttpHandler>,
}

#[async_trait]
impl HttpHandler for HttpAllowHandler {
    async fn handle(&self, req: Request<Body>) -> Result<Response, HandlerError> {
        match client_addr(&req) {
            Some(addr) if self.list.allows(addr.ip()) => self.next.handle(req).await,
            client => {
                tracing::debug!(client = ?client, "Client not in allow list");
                Ok((StatusCode::FORBIDDEN, "Forbidden").into_response())
            }
        }
    }
}

/// TCP flavour: shuts down connections from clients outside the list.
pub struct TcpIpAllowList {
    list: Arc<IpAllowList>,
}

impl TcpIpAllowList {
    pub fn new(list: IpAllowList) -> Self {
        Self { list: Arc::new(list) }
    }
}

impl TcpMiddleware for TcpIpAllowList {
    fn wrap(&self, next: Arc<dyn TcpHandler>) -> Arc<dyn TcpHandler> {
        Arc::new(TcpAllowHandler {
            list: self.list.clone(),
            next,
        })
    }
}

struct TcpAllowHandler {
    list: Arc<IpAllowList>,
    next: Arc<dyn TcpHandler>,
}

#[async_trait]
impl TcpHandler for TcpAllowHandler {
    async fn handle(&self, mut conn: TcpConnection) -> Result<(), HandlerError> {
        if self.list.allows(conn.peer.ip()) {
            return self.next.handle(conn).await;
        }
        tracing::debug!(connection_id = %conn.id, client = %conn.peer, "Client not in allow list");
        conn.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::testing::Echo;
    use axum::extract::ConnectInfo;
    use std::net::SocketAddr;

    fn list(ranges: &[&str]) -> IpAllowList {
        IpAllowList::parse(&ranges.iter().map(|r| r.to_string()).collect::<Vec<_>>()).unwrap()
    }

    #[test]
    fn matches_ranges_and_single_hosts() {
        let allow = list(&["10.0.0.0/8", "192.168.1.7", "::1/128"]);
        assert!(allow.allows("10.20.30.40".parse().unwrap()));
        assert!(allow.allows("192.168.1.7".parse().unwrap()));
        assert!(!allow.allows("192.168.1.8".parse().unwrap()));
        assert!(allow.allows("::1".parse().unwrap()));
        assert!(allow.allows("::ffff:10.1.1.1".parse().unwrap()));
    }

    #[test]
    fn invalid_range_is_reported() {
        let err = IpAllowList::parse(&["10.0.0.0/33".to_string()]).unwrap_err();
        assert!(err.contains("10.0.0.0/33"));
    }

    fn request_from(addr: &str) -> Request<Body> {
        let mut req = Request::new(Body::empty());
        req.extensions_mut()
            .insert(ConnectInfo(addr.parse::<SocketAddr>().unwrap()));
        req
    }

    #[tokio::test]
    async fn http_rejects_outsiders_with_403() {
        let handler = HttpIpAllowList::new(list(&["127.0.0.0/8"])).wrap(Arc::new(Echo));

        let inside = handler.handle(request_from("127.0.0.1:5000")).await.unwrap();
        assert_eq!(inside.status(), StatusCode::OK);

        let outside = handler.handle(request_from("8.8.8.8:5000")).await.unwrap();
        assert_eq!(outside.status(), StatusCode::FORBIDDEN);

        let unknown = handler.handle(Request::new(Body::empty())).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::FORBIDDEN);
    }
}
