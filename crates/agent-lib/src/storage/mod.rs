//! Storage publishing to InfluxDB
//!
//! The sink is consumed as a capability: provision the target database if
//! needed and persist a batch of records as a unit. The wire protocol is
//! the InfluxDB v1 HTTP API.

mod line_protocol;

pub use line_protocol::{encode, encode_batch};

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::DatabaseConfig;
use crate::record::Record;

/// Request timeout for storage calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures provisioning or writing to the storage sink.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage endpoint {endpoint:?}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to create storage client")]
    Client(#[source] reqwest::Error),

    #[error("storage request {operation:?} failed")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("storage request {operation:?} returned {status}: {body}")]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("malformed response to {operation:?}")]
    Malformed { operation: &'static str },
}

/// Capability interface of the storage sink.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persist a batch of records as a unit, provisioning the target
    /// database when it does not exist yet. Atomic from the caller's
    /// perspective: the batch is written, or it is not.
    async fn publish(&self, records: &[Record]) -> Result<(), StorageError>;
}

/// InfluxDB v1 publisher over the HTTP API.
///
/// The HTTP client lives for one publish call, so connections are released
/// at the end of every cycle and nothing is pooled across cycles.
pub struct InfluxPublisher {
    base_url: Url,
    database: String,
    user: String,
    password: String,
}

impl InfluxPublisher {
    /// Create a publisher for the configured database.
    pub fn new(config: &DatabaseConfig) -> Result<Self, StorageError> {
        Self::with_endpoint(
            &config.endpoint(),
            &config.name,
            &config.user,
            &config.password,
        )
    }

    /// Create a publisher against an explicit endpoint URL.
    pub fn with_endpoint(
        endpoint: &str,
        database: &str,
        user: &str,
        password: &str,
    ) -> Result<Self, StorageError> {
        let base_url = Url::parse(endpoint).map_err(|source| StorageError::Endpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;
        Ok(Self {
            base_url,
            database: database.to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, StorageError> {
        self.base_url
            .join(path)
            .map_err(|source| StorageError::Endpoint {
                endpoint: format!("{}{path}", self.base_url),
                source,
            })
    }

    async fn show_databases(&self, http: &Client) -> Result<Vec<String>, StorageError> {
        const OPERATION: &str = "show databases";
        let response = http
            .get(self.url("query")?)
            .basic_auth(&self.user, Some(&self.password))
            .query(&[("q", "SHOW DATABASES")])
            .send()
            .await
            .map_err(|source| StorageError::Request {
                operation: OPERATION,
                source,
            })?;
        let body: Value = check(OPERATION, response)
            .await?
            .json()
            .await
            .map_err(|source| StorageError::Request {
                operation: OPERATION,
                source,
            })?;

        if body.get("results").is_none() {
            return Err(StorageError::Malformed {
                operation: OPERATION,
            });
        }

        let names = body
            .pointer("/results/0/series/0/values")
            .and_then(Value::as_array)
            .map(|rows| {
                rows.iter()
                    .filter_map(|row| row.get(0))
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn create_database(&self, http: &Client) -> Result<(), StorageError> {
        const OPERATION: &str = "create database";
        let statement = format!("CREATE DATABASE \"{}\"", self.database);
        let response = http
            .post(self.url("query")?)
            .basic_auth(&self.user, Some(&self.password))
            .query(&[("q", statement.as_str())])
            .send()
            .await
            .map_err(|source| StorageError::Request {
                operation: OPERATION,
                source,
            })?;
        check(OPERATION, response).await?;
        Ok(())
    }

    async fn write_batch(&self, http: &Client, records: &[Record]) -> Result<(), StorageError> {
        const OPERATION: &str = "write points";
        let response = http
            .post(self.url("write")?)
            .basic_auth(&self.user, Some(&self.password))
            .query(&[("db", self.database.as_str()), ("precision", "s")])
            .body(line_protocol::encode_batch(records))
            .send()
            .await
            .map_err(|source| StorageError::Request {
                operation: OPERATION,
                source,
            })?;
        check(OPERATION, response).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for InfluxPublisher {
    async fn publish(&self, records: &[Record]) -> Result<(), StorageError> {
        // Connection scope is this call; dropping the client releases it
        // on every exit path.
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(StorageError::Client)?;

        let existing = self.show_databases(&http).await?;
        if !existing.iter().any(|name| name == &self.database) {
            info!(database = %self.database, "target database missing, creating it");
            self.create_database(&http).await?;
        }

        self.write_batch(&http, records).await?;
        debug!(
            count = records.len(),
            database = %self.database,
            "record batch written"
        );
        Ok(())
    }
}

async fn check(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, StorageError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StorageError::Status {
        operation,
        status,
        body,
    })
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;

    use super::*;
    use crate::record::build;
    use crate::testutil::sample_result;

    const EXISTING: &str = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"],["speed"]]}]}]}"#;
    const WITHOUT_TARGET: &str = r#"{"results":[{"statement_id":0,"series":[{"name":"databases","columns":["name"],"values":[["_internal"]]}]}]}"#;

    fn publisher(server: &mockito::Server) -> InfluxPublisher {
        InfluxPublisher::with_endpoint(&server.url(), "speed", "collector", "hunter2").unwrap()
    }

    fn write_mock(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("POST", "/write")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "speed".into()),
                Matcher::UrlEncoded("precision".into(), "s".into()),
            ]))
            .with_status(204)
    }

    #[tokio::test]
    async fn creates_the_database_when_absent() {
        let mut server = mockito::Server::new_async().await;
        let show = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("q".into(), "SHOW DATABASES".into()))
            .with_body(WITHOUT_TARGET)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/query")
            .match_query(Matcher::UrlEncoded(
                "q".into(),
                "CREATE DATABASE \"speed\"".into(),
            ))
            .with_body(r#"{"results":[{"statement_id":0}]}"#)
            .create_async()
            .await;
        let write = write_mock(&mut server).create_async().await;

        let record = build(&sample_result());
        publisher(&server)
            .publish(std::slice::from_ref(&record))
            .await
            .unwrap();

        show.assert_async().await;
        create.assert_async().await;
        write.assert_async().await;
    }

    #[tokio::test]
    async fn provisioning_is_idempotent() {
        let mut server = mockito::Server::new_async().await;
        let show = server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("q".into(), "SHOW DATABASES".into()))
            .with_body(EXISTING)
            .expect(2)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/query")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;
        let write = write_mock(&mut server).expect(2).create_async().await;

        let sink = publisher(&server);
        let record = build(&sample_result());
        sink.publish(std::slice::from_ref(&record)).await.unwrap();
        sink.publish(std::slice::from_ref(&record)).await.unwrap();

        show.assert_async().await;
        create.assert_async().await;
        write.assert_async().await;
    }

    #[tokio::test]
    async fn write_body_is_line_protocol() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("q".into(), "SHOW DATABASES".into()))
            .with_body(EXISTING)
            .create_async()
            .await;

        let record = build(&sample_result());
        let write = write_mock(&mut server)
            .match_body(encode(&record).as_str())
            .create_async()
            .await;

        publisher(&server)
            .publish(std::slice::from_ref(&record))
            .await
            .unwrap();
        write.assert_async().await;
    }

    #[tokio::test]
    async fn credentials_are_forwarded() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("q".into(), "SHOW DATABASES".into()))
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .with_body(EXISTING)
            .create_async()
            .await;
        let write = write_mock(&mut server)
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .create_async()
            .await;

        let record = build(&sample_result());
        publisher(&server)
            .publish(std::slice::from_ref(&record))
            .await
            .unwrap();
        write.assert_async().await;
    }

    #[tokio::test]
    async fn failed_write_surfaces_a_storage_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("q".into(), "SHOW DATABASES".into()))
            .with_body(EXISTING)
            .create_async()
            .await;
        server
            .mock("POST", "/write")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("engine: cache-max-memory-size exceeded")
            .create_async()
            .await;

        let record = build(&sample_result());
        let err = publisher(&server)
            .publish(std::slice::from_ref(&record))
            .await
            .unwrap_err();

        match err {
            StorageError::Status {
                operation, status, ..
            } => {
                assert_eq!(operation, "write points");
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_a_request_error() {
        // Nothing listens on port 1.
        let sink =
            InfluxPublisher::with_endpoint("http://127.0.0.1:1", "speed", "u", "p").unwrap();
        let record = build(&sample_result());
        let err = sink.publish(std::slice::from_ref(&record)).await.unwrap_err();
        assert!(matches!(err, StorageError::Request { .. }));
    }

    #[tokio::test]
    async fn malformed_query_response_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/query")
            .match_query(Matcher::UrlEncoded("q".into(), "SHOW DATABASES".into()))
            .with_body(r#"{"error": "unauthorized"}"#)
            .create_async()
            .await;

        let record = build(&sample_result());
        let err = publisher(&server)
            .publish(std::slice::from_ref(&record))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Malformed { .. }));
    }
}
