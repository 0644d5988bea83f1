//! HTTP middleware (CORS, 404 handler)

use axum::Json;
use axum::extract::Request;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::IntoResponse;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::core::config::{ServerConfig, is_all_interfaces};

/// Allowed origins configuration
#[derive(Debug, Clone)]
pub struct AllowedOrigins {
    origins: Vec<String>,
}

impl AllowedOrigins {
    /// Origins for the bound host and port plus any configured extras
    pub fn new(server: &ServerConfig) -> Self {
        let host = server.host.as_str();
        let is_all = is_all_interfaces(host);

        let base_hosts: Vec<&str> = if is_all || host == "127.0.0.1" || host == "localhost" {
            vec!["localhost", "127.0.0.1"]
        } else {
            vec![host]
        };

        let mut origins: Vec<String> = base_hosts
            .iter()
            .flat_map(|h| {
                [
                    format!("http://{}:{}", h, server.port),
                    format!("http://{}", h),
                ]
            })
            .collect();

        // LAN dashboards when binding to all interfaces
        if is_all && let Ok(interfaces) = local_ip_address::list_afinet_netifas() {
            for (_, ip) in interfaces
                .iter()
                .filter(|(_, ip)| ip.is_ipv4() && !ip.is_loopback())
            {
                origins.push(format!("http://{}:{}", ip, server.port));
            }
        }

        for origin in &server.cors_origins {
            let origin = origin.trim_end_matches('/').to_string();
            if !origins.contains(&origin) {
                origins.push(origin);
            }
        }

        Self { origins }
    }

    /// Check if an origin is allowed
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.iter().any(|o| o == origin)
    }

    fn as_header_values(&self) -> Vec<HeaderValue> {
        self.origins.iter().filter_map(|o| o.parse().ok()).collect()
    }
}

/// Create CORS layer
pub fn cors(allowed: &AllowedOrigins) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed.as_header_values()))
        .allow_methods([Method::GET, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
            header::CACHE_CONTROL,
            header::IF_NONE_MATCH,
        ])
        .expose_headers([header::ETAG, header::RETRY_AFTER])
}

/// Handle 404 Not Found with logging
pub async fn handle_404(req: Request) -> impl IntoResponse {
    tracing::debug!(method = %req.method(), uri = %req.uri(), "[404]");
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "not_found",
            "code": "ROUTE_NOT_FOUND",
            "message": format!("No route for {} {}", req.method(), req.uri().path())
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str, extra: &[&str]) -> ServerConfig {
        ServerConfig {
            host: host.to_string(),
            port: 5390,
            cors_origins: extra.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_localhost_origins() {
        let allowed = AllowedOrigins::new(&server("127.0.0.1", &[]));
        assert!(allowed.is_allowed("http://localhost:5390"));
        assert!(allowed.is_allowed("http://127.0.0.1:5390"));
        assert!(!allowed.is_allowed("http://evil.example"));
    }

    #[test]
    fn test_configured_origins_are_added() {
        let allowed = AllowedOrigins::new(&server("127.0.0.1", &["http://localhost:3000/"]));
        assert!(allowed.is_allowed("http://localhost:3000"));
    }

    #[test]
    fn test_specific_host() {
        let allowed = AllowedOrigins::new(&server("dash.internal", &[]));
        assert!(allowed.is_allowed("http://dash.internal:5390"));
        assert!(!allowed.is_allowed("http://localhost:5390"));
    }
}
