//! HTTP gateway to a robot's REST API.

use mir_protocol::SearchRequest;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use super::{RemoteGateway, Verb};
use crate::config::MirConfig;
use crate::error::{MirError, Result};

/// Blocking client for `http://<host>/api/v2.0.0/`.
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &MirConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(auth) = &config.auth {
            let value = HeaderValue::from_str(auth)
                .map_err(|e| MirError::Config(format!("invalid authorization header: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| MirError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send and check the status; returns the raw body text on success.
    fn send(&self, verb: Verb, path: &str, request: RequestBuilder) -> Result<String> {
        debug!("{} {}", verb, path);
        let response = request.send().map_err(|e| MirError::RemoteUnavailable {
            verb,
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|e| MirError::RemoteUnavailable {
            verb,
            path: path.to_string(),
            message: format!("failed to read response body: {}", e),
        })?;

        if !verb.accepts(status) {
            return Err(MirError::RemoteRejected {
                verb,
                path: path.to_string(),
                status,
                body,
            });
        }
        Ok(body)
    }

    fn send_json(&self, verb: Verb, path: &str, request: RequestBuilder) -> Result<Value> {
        let body = self.send(verb, path, request)?;
        serde_json::from_str(&body).map_err(|source| MirError::MalformedResponse {
            path: path.to_string(),
            source,
        })
    }
}

impl RemoteGateway for HttpGateway {
    fn get(&self, path: &str) -> Result<Value> {
        self.send_json(Verb::Get, path, self.client.get(self.url(path)))
    }

    fn search(&self, collection: &str, request: &SearchRequest) -> Result<Value> {
        let path = format!("{}/search", collection.trim_end_matches('/'));
        let builder = self.client.post(self.url(&path)).json(request);
        self.send_json(Verb::Search, &path, builder)
    }

    fn create(&self, collection: &str, body: &Value) -> Result<Value> {
        self.send_json(Verb::Create, collection, self.client.post(self.url(collection)).json(body))
    }

    fn replace(&self, resource: &str, body: &Value) -> Result<Value> {
        self.send_json(Verb::Replace, resource, self.client.put(self.url(resource)).json(body))
    }

    fn delete(&self, resource: &str) -> Result<()> {
        self.send(Verb::Delete, resource, self.client.delete(self.url(resource)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    /// Answer a single request with `status` and `body`, then close.
    fn serve_once(status: &'static str, body: &'static str) -> (HttpGateway, JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = reader.into_inner();
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )
            .unwrap();
        });

        let gateway = HttpGateway {
            client: Client::builder().no_proxy().build().unwrap(),
            base_url: format!("http://{}/api/v2.0.0/", addr),
        };
        (gateway, server)
    }

    #[test]
    fn test_urls_join_under_api_root() {
        let config = MirConfig {
            host: "mir.local".to_string(),
            ..MirConfig::default()
        };
        let gateway = HttpGateway::new(&config).unwrap();
        assert_eq!(gateway.base_url(), "http://mir.local/api/v2.0.0/");
        assert_eq!(
            gateway.url("/missions/abc/actions"),
            "http://mir.local/api/v2.0.0/missions/abc/actions"
        );
    }

    #[test]
    fn test_rejects_unprintable_auth_header() {
        let config = MirConfig {
            auth: Some("Basic \nabc".to_string()),
            ..MirConfig::default()
        };
        assert!(matches!(HttpGateway::new(&config), Err(MirError::Config(_))));
    }

    #[test]
    fn test_not_found_is_rejected_with_body() {
        let (gateway, server) = serve_once("404 Not Found", r#"{"error_human":"no such mission"}"#);
        let err = gateway.get("missions/missing").unwrap_err();
        server.join().unwrap();

        match err {
            MirError::RemoteRejected {
                verb,
                path,
                status,
                body,
            } => {
                assert_eq!(verb, Verb::Get);
                assert_eq!(path, "missions/missing");
                assert_eq!(status, 404);
                assert!(body.contains("no such mission"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_json_success_is_malformed() {
        let (gateway, server) = serve_once("200 OK", "not json");
        let err = gateway.get("status").unwrap_err();
        server.join().unwrap();

        assert!(matches!(
            err,
            MirError::MalformedResponse { ref path, .. } if path == "status"
        ));
    }

    #[test]
    fn test_create_requires_created_status() {
        let (gateway, server) = serve_once("200 OK", r#"{"guid":"m-1"}"#);
        let err = gateway
            .create("missions", &serde_json::json!({"name": "tour"}))
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(
            err,
            MirError::RemoteRejected { verb: Verb::Create, status: 200, .. }
        ));
    }

    #[test]
    fn test_get_decodes_json_body() {
        let (gateway, server) = serve_once("200 OK", r#"{"state_text":"Ready"}"#);
        let value = gateway.get("status").unwrap();
        server.join().unwrap();

        assert_eq!(value["state_text"], "Ready");
    }
}
