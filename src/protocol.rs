//! Newline-delimited JSON framing for the batch entry point.
//!
//! A client sends one [`BatchRequest`] per line and receives one
//! [`BatchResponse`] per line, or an [`ErrorResponse`] when the request line
//! cannot be decoded. The connection stays open either way.

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_REQUEST_SIZE: usize = 8192;
pub const MAX_RESPONSE_SIZE: usize = 65536;
pub const MAX_BATCH_COMMANDS: usize = 256;

pub type RequestBuffer = ArrayString<MAX_REQUEST_SIZE>;
pub type ResponseBuffer = ArrayString<MAX_RESPONSE_SIZE>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub responses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON format")]
    InvalidJson,
    #[error("Request is not valid UTF-8")]
    InvalidUtf8,
    #[error("Message exceeds buffer size")]
    MessageTooLarge,
    #[error("Too many commands in one batch (max {})", MAX_BATCH_COMMANDS)]
    TooManyCommands,
    #[error("Serialization failed")]
    SerializationError,
}

/// Decodes request lines and encodes replies into preallocated buffers.
#[derive(Debug)]
pub struct ProtocolHandler {
    request_buffer: RequestBuffer,
    response_buffer: ResponseBuffer,
}

impl ProtocolHandler {
    pub fn new() -> Self {
        Self {
            request_buffer: ArrayString::new(),
            response_buffer: ArrayString::new(),
        }
    }

    pub fn parse_request(&mut self, line: &str) -> Result<BatchRequest, ProtocolError> {
        self.request_buffer.clear();
        self.request_buffer
            .try_push_str(line.trim())
            .map_err(|_| ProtocolError::MessageTooLarge)?;

        let request: BatchRequest =
            serde_json::from_str(&self.request_buffer).map_err(|_| ProtocolError::InvalidJson)?;

        if request.commands.len() > MAX_BATCH_COMMANDS {
            return Err(ProtocolError::TooManyCommands);
        }
        Ok(request)
    }

    /// Decodes a raw request line as read off the socket.
    pub fn parse_request_bytes(&mut self, line: &[u8]) -> Result<BatchRequest, ProtocolError> {
        let line = core::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
        self.parse_request(line)
    }

    pub fn serialize_response(&mut self, response: &BatchResponse) -> Result<&str, ProtocolError> {
        self.encode(response)
    }

    pub fn serialize_error(&mut self, error: &str) -> Result<&str, ProtocolError> {
        self.encode(&ErrorResponse {
            error: error.to_string(),
        })
    }

    fn encode<T: Serialize>(&mut self, body: &T) -> Result<&str, ProtocolError> {
        self.response_buffer.clear();

        let json_str = serde_json::to_string(body).map_err(|_| ProtocolError::SerializationError)?;
        self.response_buffer
            .try_push_str(&json_str)
            .map_err(|_| ProtocolError::MessageTooLarge)?;

        Ok(&self.response_buffer)
    }
}

impl Default for ProtocolHandler {
    fn default() -> Self {
        Self::new()
    }
}
