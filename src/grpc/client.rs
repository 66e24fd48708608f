// Dynamic RPC dispatch: a method full name, raw JSON request bytes and a
// metadata map in; a decoded response with a symbolic status out.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use prost_reflect::{DynamicMessage, MessageDescriptor};
use tokio::time::Instant;
use tonic::Request;
use tonic::Status;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::{Channel, Uri};

use crate::config::services::Services;
use crate::error::user_error;
use crate::grpc::channel::ChannelPool;
use crate::grpc::descriptors::DescriptorStore;
use crate::grpc::response::{GrpcResponse, is_transport_error};

pub mod codec;
use self::codec::DynamicCodec;

/// One dispatcher per configured service, sharing the compiled
/// descriptors.
pub struct ClientPool {
    clients: HashMap<String, RpcClient>,
}

impl ClientPool {
    pub fn new(
        services: &Services,
        channels: &ChannelPool,
        descriptors: Arc<DescriptorStore>,
    ) -> Result<Self> {
        let mut clients = HashMap::with_capacity(services.len());
        for name in services.keys() {
            let channel = channels
                .get(name)
                .ok_or_else(|| anyhow!("no channel for service {name}"))?;
            clients.insert(name.clone(), RpcClient::new(channel, descriptors.clone()));
        }
        Ok(Self { clients })
    }

    pub fn get_mut(&mut self, service_name: &str) -> Option<&mut RpcClient> {
        self.clients.get_mut(service_name)
    }
}

pub struct RpcClient {
    grpc: tonic::client::Grpc<Channel>,
    descriptors: Arc<DescriptorStore>,
}

impl RpcClient {
    pub fn new(channel: Channel, descriptors: Arc<DescriptorStore>) -> Self {
        Self {
            grpc: tonic::client::Grpc::new(channel),
            descriptors,
        }
    }

    /// Invoke `full_name` with the given JSON request text. Unary and
    /// client-streaming calls return a complete response; server-streaming
    /// calls return a receive handle. Bidirectional methods are rejected.
    pub async fn invoke(
        &mut self,
        full_name: &str,
        request: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<GrpcResponse> {
        let path = method_path(full_name)?;
        let method = self
            .descriptors
            .get(full_name)
            .ok_or_else(|| anyhow!("no descriptor loaded for method {full_name}"))?
            .clone();

        if method.is_client_streaming() && method.is_server_streaming() {
            return Err(user_error(format!(
                "bidirectional streaming is not supported ({full_name})"
            )));
        }

        let metadata_map = build_metadata(metadata)?;
        // One deadline for the whole call, derived up front: it bounds the
        // opening call and every later frame read on a stream.
        let deadline = parse_timeout(metadata)?.map(|limit| Instant::now() + limit);

        // Drive readiness first so connection-level failures stay dispatch
        // errors and never masquerade as checkable statuses.
        self.grpc
            .ready()
            .await
            .map_err(|err| anyhow!("transport is not ready: {err}"))?;

        let codec = DynamicCodec::new(method.output());

        if method.is_server_streaming() {
            let message = build_message(&method.input(), request)?;
            let mut req = Request::new(message);
            *req.metadata_mut() = metadata_map;

            match with_deadline(deadline, self.grpc.server_streaming(req, path, codec)).await {
                Ok(response) => Ok(GrpcResponse::stream(response.into_inner(), deadline)),
                Err(status) => error_response(status),
            }
        } else if method.is_client_streaming() {
            let messages = build_message_stream(&method.input(), request)?;
            let mut req = Request::new(futures::stream::iter(messages));
            *req.metadata_mut() = metadata_map;

            match with_deadline(deadline, self.grpc.client_streaming(req, path, codec)).await {
                Ok(response) => GrpcResponse::unary(&response.into_inner()),
                Err(status) => error_response(status),
            }
        } else {
            let message = build_message(&method.input(), request)?;
            let mut req = Request::new(message);
            *req.metadata_mut() = metadata_map;

            match with_deadline(deadline, self.grpc.unary(req, path, codec)).await {
                Ok(response) => GrpcResponse::unary(&response.into_inner()),
                Err(status) => error_response(status),
            }
        }
    }
}

async fn with_deadline<T>(
    deadline: Option<Instant>,
    call: impl Future<Output = Result<T, Status>>,
) -> Result<T, Status> {
    match deadline {
        None => call.await,
        Some(deadline) => match tokio::time::timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(Status::deadline_exceeded(
                "call deadline exceeded before a response arrived",
            )),
        },
    }
}

/// An RPC status (OK included) becomes part of the response; anything the
/// transport could not express as a status aborts the dispatch.
fn error_response(status: Status) -> Result<GrpcResponse> {
    if is_transport_error(&status) {
        return Err(anyhow!(status).context("failed to send a request"));
    }
    Ok(GrpcResponse::from_error_status(&status))
}

/// Map `<package>.<service>.<method>` onto the HTTP/2 path
/// `/<package>.<service>/<method>`. Fewer than two segments is an error.
pub fn method_path(full_name: &str) -> Result<PathAndQuery> {
    let (service, method) = full_name
        .rsplit_once('.')
        .ok_or_else(|| user_error(format!("invalid method name {full_name}")))?;
    if service.is_empty() || method.is_empty() {
        return Err(user_error(format!("invalid method name {full_name}")));
    }

    let uri: Uri = format!("/{service}/{method}")
        .parse()
        .map_err(|_| user_error(format!("invalid method name {full_name}")))?;
    uri.path_and_query()
        .cloned()
        .ok_or_else(|| user_error(format!("invalid method name {full_name}")))
}

/// Build a dynamic request message from JSON text, strict on unknown
/// fields.
pub fn build_message(descriptor: &MessageDescriptor, request: &str) -> Result<DynamicMessage> {
    let mut deserializer = serde_json::Deserializer::from_str(request);
    let message = DynamicMessage::deserialize(descriptor.clone(), &mut deserializer)
        .map_err(|err| user_error(format!("failed to build request: {err}")))?;
    Ok(message)
}

/// Client-streaming request bodies are JSON arrays, one message each.
fn build_message_stream(
    descriptor: &MessageDescriptor,
    request: &str,
) -> Result<Vec<DynamicMessage>> {
    let items: Vec<serde_json::Value> = serde_json::from_str(request)
        .map_err(|err| user_error(format!("client-streaming request must be a JSON array: {err}")))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            build_message(descriptor, &item.to_string())
                .with_context(|| format!("request message {}", i + 1))
        })
        .collect()
}

fn build_metadata(metadata: &HashMap<String, String>) -> Result<MetadataMap> {
    let mut map = MetadataMap::new();
    for (key, value) in metadata {
        let key = MetadataKey::from_str(&key.to_ascii_lowercase())
            .map_err(|_| user_error(format!("invalid metadata key '{key}'")))?;
        let value = MetadataValue::from_str(value)
            .map_err(|_| user_error(format!("invalid metadata value for '{key}'")))?;
        map.insert(key, value);
    }
    Ok(map)
}

/// A `timeout` entry in the merged step metadata bounds the single
/// outstanding call; absence means no timeout.
fn parse_timeout(metadata: &HashMap<String, String>) -> Result<Option<Duration>> {
    match metadata.get("timeout") {
        None => Ok(None),
        Some(value) => humantime::parse_duration(value)
            .map(Some)
            .map_err(|err| user_error(format!("malformed timeout header '{value}': {err}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_path() {
        let path = method_path("shop.v1.Cart.AddItem").unwrap();
        assert_eq!(path.path(), "/shop.v1.Cart/AddItem");
    }

    #[test]
    fn test_method_path_without_package() {
        let path = method_path("Cart.AddItem").unwrap();
        assert_eq!(path.path(), "/Cart/AddItem");
    }

    #[test]
    fn test_method_path_rejects_single_segment() {
        assert!(method_path("AddItem").is_err());
        assert!(method_path("").is_err());
        assert!(method_path(".AddItem").is_err());
    }

    #[test]
    fn test_parse_timeout() {
        let mut metadata = HashMap::new();
        assert_eq!(parse_timeout(&metadata).unwrap(), None);

        metadata.insert("timeout".to_string(), "3s".to_string());
        assert_eq!(parse_timeout(&metadata).unwrap(), Some(Duration::from_secs(3)));

        metadata.insert("timeout".to_string(), "150ms".to_string());
        assert_eq!(parse_timeout(&metadata).unwrap(), Some(Duration::from_millis(150)));
    }

    #[test]
    fn test_parse_timeout_rejects_garbage() {
        let metadata = HashMap::from([("timeout".to_string(), "soon".to_string())]);
        let err = parse_timeout(&metadata).unwrap_err();
        assert!(crate::error::find_user_error(&err).is_some());
    }

    #[test]
    fn test_build_metadata_normalizes_keys() {
        let metadata = HashMap::from([("X-Request-Id".to_string(), "abc".to_string())]);
        let map = build_metadata(&metadata).unwrap();
        assert_eq!(map.get("x-request-id").unwrap(), "abc");
    }

    #[test]
    fn test_build_metadata_rejects_invalid_key() {
        let metadata = HashMap::from([("bad key".to_string(), "v".to_string())]);
        assert!(build_metadata(&metadata).is_err());
    }
}
