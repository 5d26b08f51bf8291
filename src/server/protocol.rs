//! Wire format between the CLI and the daemon.
//!
//! Every message is a big-endian `u32` byte length followed by that many
//! bytes of JSON. Messages are internally tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::models::{ChatResponse, ErrorResponse, IngestResponse, QueryRequest, QueryResponse};
use crate::services::MetricsSummary;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Shutdown,
    Status,
    Ingest(IngestRequest),
    Query(QueryRequest),
    Chat(QueryRequest),
}

/// A document upload. The bytes travel base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub content_base64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    ShutdownAck,
    Status(StatusResponse),
    Ingest(IngestResponse),
    Query(QueryResponse),
    Chat(ChatResponse),
    Error(ErrorResponse),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub running: bool,
    pub embedding_model: String,
    #[serde(default)]
    pub answer_model: String,
    pub sessions: usize,
    pub chunks: usize,
    pub uptime_secs: u64,
    pub idle_secs: u64,
    pub requests_served: u64,
    pub metrics: Option<MetricsSummary>,
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error(ErrorResponse::new(kind, message))
    }
}

pub fn encode_message(msg: &impl Serialize) -> Result<Vec<u8>, serde_json::Error> {
    let json = serde_json::to_vec(msg)?;
    let len = (json.len() as u32).to_be_bytes();
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len);
    buf.extend_from_slice(&json);
    Ok(buf)
}

pub fn decode_length(buf: &[u8; 4]) -> usize {
    u32::from_be_bytes(*buf) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let encoded = encode_message(&Request::Ping).unwrap();
        let len = decode_length(encoded[..4].try_into().unwrap());
        assert_eq!(len, encoded.len() - 4);
        assert_eq!(&encoded[4..], br#"{"type":"ping"}"#);
    }

    #[test]
    fn test_query_request_wire_shape() {
        let json = r#"{"type":"query","session_id":"abc","question":"Tell me about cats"}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        match request {
            Request::Query(q) => {
                assert_eq!(q.session_id, "abc");
                assert_eq!(q.top_k, None);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_chat_wire_shape() {
        let request: Request =
            serde_json::from_str(r#"{"type":"chat","session_id":"abc","question":"why?","top_k":2}"#)
                .unwrap();
        assert!(matches!(request, Request::Chat(QueryRequest { top_k: Some(2), .. })));

        let response = Response::Chat(ChatResponse {
            answer: "Because.".to_string(),
            top_chunks: vec!["Cats are mammals.".to_string()],
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["answer"], "Because.");
        assert_eq!(value["top_chunks"][0], "Cats are mammals.");
    }

    #[test]
    fn test_ingest_request_filename_optional() {
        let request: Request =
            serde_json::from_str(r#"{"type":"ingest","content_base64":"aGk="}"#).unwrap();
        assert!(matches!(
            request,
            Request::Ingest(IngestRequest { filename: None, .. })
        ));
    }

    #[test]
    fn test_error_response_carries_kind() {
        let response = Response::error(ErrorKind::SessionNotFound, "invalid session_id: x");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["kind"], "session_not_found");
        assert_eq!(value["message"], "invalid session_id: x");
    }

    #[test]
    fn test_ingest_response_wire_shape() {
        let response = Response::Ingest(IngestResponse {
            session_id: "s-1".to_string(),
            num_chunks: 3,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "ingest");
        assert_eq!(value["num_chunks"], 3);
    }
}
