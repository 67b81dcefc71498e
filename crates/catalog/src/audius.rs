use crate::{Catalog, CatalogError, TrendingWindow};
use async_trait::async_trait;
use ocean_player_core::{urls, Track};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("ocean-player/", env!("CARGO_PKG_VERSION"));

/// REST client for an Audius discovery node.
pub struct AudiusClient {
    http: reqwest::Client,
    api_base: String,
}

impl AudiusClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let api_base = urls::normalize_base(api_base).to_string();
        let parsed = Url::parse(&api_base).map_err(|err| CatalogError::InvalidBase {
            base: api_base.clone(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CatalogError::InvalidBase {
                base: api_base,
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, api_base })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn get_data(&self, url: &str) -> Result<Value, CatalogError> {
        debug!(%url, "catalog request");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(CatalogError::Status { status, details });
        }
        let body = response.bytes().await?;
        let payload: Value = serde_json::from_slice(&body)?;
        Ok(unwrap_data(payload))
    }
}

/// Most endpoints wrap their result as `{ "data": ... }`.
fn unwrap_data(payload: Value) -> Value {
    match payload {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn decode_list(data: Value) -> Vec<Track> {
    let Value::Array(items) = data else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<Track>(item) {
            Ok(track) => Some(track),
            Err(err) => {
                debug!(error = %err, "skipping undecodable track");
                None
            }
        })
        .collect()
}

fn decode_one(data: Value) -> Result<Option<Track>, CatalogError> {
    let item = match data {
        Value::Array(items) => items.into_iter().next(),
        Value::Null => None,
        other => Some(other),
    };
    match item {
        Some(item) => Ok(Some(serde_json::from_value(item)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl Catalog for AudiusClient {
    async fn fetch_trending(
        &self,
        limit: u32,
        offset: u32,
        window: TrendingWindow,
    ) -> Result<Vec<Track>, CatalogError> {
        let url = urls::trending_url(&self.api_base, limit, offset, window.as_str());
        let data = self.get_data(&url).await?;
        Ok(decode_list(data))
    }

    async fn search(&self, query: &str, limit: u32, offset: u32) -> Result<Vec<Track>, CatalogError> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let url = urls::search_url(&self.api_base, query, limit, offset);
        let data = self.get_data(&url).await?;
        Ok(decode_list(data))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<Track>, CatalogError> {
        if id.trim().is_empty() {
            return Ok(None);
        }
        let url = urls::track_url(&self.api_base, id);
        match self.get_data(&url).await {
            Ok(data) => decode_one(data),
            Err(CatalogError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                debug!(%id, "track not found");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn stream_url(&self, id: &str) -> String {
        urls::stream_url(&self.api_base, id)
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_list, decode_one, unwrap_data, AudiusClient};
    use crate::{fetch_many, Catalog, CatalogError};
    use serde_json::json;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn offline_client() -> AudiusClient {
        AudiusClient::new("http://127.0.0.1:9/", Duration::from_millis(200)).expect("valid base")
    }

    /// Local node answering `/v1/tracks/missing` with 404 and everything else with 500.
    fn local_node() -> AudiusClient {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut request_line = String::new();
                let _ = reader.read_line(&mut request_line);
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 2).unwrap_or(false) {
                    line.clear();
                }
                let (status, body) = if request_line.contains("/v1/tracks/missing") {
                    ("404 Not Found", "{\"message\":\"track not found\"}")
                } else {
                    ("500 Internal Server Error", "boom")
                };
                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });
        AudiusClient::new(&format!("http://{addr}"), Duration::from_secs(5)).expect("valid base")
    }

    #[test]
    fn data_envelope_is_unwrapped() {
        assert_eq!(unwrap_data(json!({ "data": [1, 2] })), json!([1, 2]));
        assert_eq!(unwrap_data(json!([3])), json!([3]));
        assert_eq!(unwrap_data(json!({ "other": 1 })), json!({ "other": 1 }));
    }

    #[test]
    fn list_decoding_skips_bad_items() {
        let tracks = decode_list(json!([
            { "id": "a", "title": "One" },
            { "id": 7 },
            { "id": "b" }
        ]));
        let ids: Vec<_> = tracks.iter().filter_map(|t| t.id()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(decode_list(json!(null)).is_empty());
    }

    #[test]
    fn single_track_accepts_array_payloads() {
        let first = decode_one(json!([{ "id": "x" }, { "id": "y" }])).unwrap();
        assert_eq!(first.and_then(|t| t.id).as_deref(), Some("x"));
        assert!(decode_one(json!([])).unwrap().is_none());
        assert!(decode_one(json!(null)).unwrap().is_none());
        assert!(decode_one(json!({ "id": "z" })).unwrap().is_some());
    }

    #[test]
    fn base_url_is_validated_and_trimmed() {
        let client = offline_client();
        assert_eq!(client.api_base(), "http://127.0.0.1:9");
        assert_eq!(client.stream_url("q 1"), "http://127.0.0.1:9/v1/tracks/q%201/stream");

        assert!(matches!(
            AudiusClient::new("not a url", Duration::from_secs(1)),
            Err(CatalogError::InvalidBase { .. })
        ));
        assert!(matches!(
            AudiusClient::new("ftp://example.org", Duration::from_secs(1)),
            Err(CatalogError::InvalidBase { .. })
        ));
    }

    #[tokio::test]
    async fn blank_inputs_short_circuit() {
        let client = offline_client();
        assert!(client.search("   ", 20, 0).await.unwrap().is_empty());
        assert!(client.fetch_by_id("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_track_is_none_not_an_error() {
        let client = local_node();
        assert!(client.fetch_by_id("missing").await.unwrap().is_none());

        let ids = vec!["missing".to_string()];
        assert!(fetch_many(&client, &ids, 24).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn server_errors_still_fail_the_lookup() {
        let client = local_node();
        match client.fetch_by_id("other").await {
            Err(CatalogError::Status { status, details }) => {
                assert_eq!(status.as_u16(), 500);
                assert_eq!(details, "boom");
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }
}
