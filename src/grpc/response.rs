// Decoded RPC responses. A response always carries a symbolic status and
// a body in the canonical proto JSON shape with unpopulated fields
// emitted, so the assertion engine can match zero values.

use anyhow::{Context, Result, anyhow};
use prost_reflect::{DynamicMessage, SerializeOptions};
use serde_json::Value;
use tokio::time::Instant;
use tonic::{Code, Status, Streaming};

/// Symbolic RPC status: `OK` on success, the canonical SCREAMING_SNAKE
/// code name otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub code: String,
    pub message: String,
}

impl StatusInfo {
    pub fn ok() -> Self {
        Self {
            code: code_name(Code::Ok).to_string(),
            message: String::new(),
        }
    }

    pub fn from_status(status: &Status) -> Self {
        Self {
            code: code_name(status.code()).to_string(),
            message: status.message().to_string(),
        }
    }
}

/// Canonical gRPC code names, the form expectations are written in.
pub fn code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "OK",
        Code::Cancelled => "CANCELLED",
        Code::Unknown => "UNKNOWN",
        Code::InvalidArgument => "INVALID_ARGUMENT",
        Code::DeadlineExceeded => "DEADLINE_EXCEEDED",
        Code::NotFound => "NOT_FOUND",
        Code::AlreadyExists => "ALREADY_EXISTS",
        Code::PermissionDenied => "PERMISSION_DENIED",
        Code::ResourceExhausted => "RESOURCE_EXHAUSTED",
        Code::FailedPrecondition => "FAILED_PRECONDITION",
        Code::Aborted => "ABORTED",
        Code::OutOfRange => "OUT_OF_RANGE",
        Code::Unimplemented => "UNIMPLEMENTED",
        Code::Internal => "INTERNAL",
        Code::Unavailable => "UNAVAILABLE",
        Code::DataLoss => "DATA_LOSS",
        Code::Unauthenticated => "UNAUTHENTICATED",
    }
}

/// A status synthesized by the client from a connection-level failure
/// carries the transport error as its source; a status sent by the server
/// does not. The former aborts the run, the latter is checkable.
pub fn is_transport_error(status: &Status) -> bool {
    std::error::Error::source(status).is_some()
}

/// Next event on a server stream, distinct from transport errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Frame,
    EndOfStream,
}

/// One RPC result. Unary responses are complete on construction; streaming
/// responses re-materialize `status` and `body` on every [`receive`].
///
/// [`receive`]: GrpcResponse::receive
pub struct GrpcResponse {
    pub status: StatusInfo,
    pub body: Value,
    stream: Option<Streaming<DynamicMessage>>,
    /// Call deadline derived from the `timeout` metadata; bounds every
    /// frame read, not just the call that opened the stream.
    deadline: Option<Instant>,
}

impl GrpcResponse {
    pub fn unary(message: &DynamicMessage) -> Result<Self> {
        Ok(Self {
            status: StatusInfo::ok(),
            body: decode_body(message)?,
            stream: None,
            deadline: None,
        })
    }

    /// A call that ended with a non-OK status carries an empty body.
    pub fn from_error_status(status: &Status) -> Self {
        Self {
            status: StatusInfo::from_status(status),
            body: Value::Object(serde_json::Map::new()),
            stream: None,
            deadline: None,
        }
    }

    pub fn stream(stream: Streaming<DynamicMessage>, deadline: Option<Instant>) -> Self {
        Self {
            status: StatusInfo::ok(),
            body: Value::Object(serde_json::Map::new()),
            stream: Some(stream),
            deadline,
        }
    }

    pub fn is_stream(&self) -> bool {
        self.stream.is_some()
    }

    /// Pull the next frame, replacing `status` and `body`. A terminal
    /// server status counts as a frame (with an empty body); the stream is
    /// closed afterwards. Connection-level failures surface as errors.
    /// Reads past the call deadline yield a DEADLINE_EXCEEDED frame.
    pub async fn receive(&mut self) -> Result<StreamEvent> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(StreamEvent::EndOfStream);
        };

        let next = match self.deadline {
            None => stream.message().await,
            Some(deadline) => match tokio::time::timeout_at(deadline, stream.message()).await {
                Ok(next) => next,
                Err(_) => Err(Status::deadline_exceeded(
                    "call deadline exceeded while waiting for the next frame",
                )),
            },
        };

        match next {
            Ok(Some(message)) => {
                self.status = StatusInfo::ok();
                self.body = decode_body(&message)?;
                Ok(StreamEvent::Frame)
            }
            Ok(None) => {
                self.stream = None;
                Ok(StreamEvent::EndOfStream)
            }
            Err(status) if is_transport_error(&status) => {
                Err(anyhow!(status).context("error on stream receiving"))
            }
            Err(status) => {
                self.status = StatusInfo::from_status(&status);
                self.body = Value::Object(serde_json::Map::new());
                self.stream = None;
                Ok(StreamEvent::Frame)
            }
        }
    }
}

/// Canonical proto to JSON decoding. Unpopulated fields are emitted (zero
/// values included) and keys use the `.proto` field names; the assertion
/// engine consumes exactly this shape.
pub fn decode_body(message: &DynamicMessage) -> Result<Value> {
    let options = SerializeOptions::new()
        .skip_default_fields(false)
        .use_proto_field_name(true);
    message
        .serialize_with_options(serde_json::value::Serializer, &options)
        .context("failed to marshal response")
}
