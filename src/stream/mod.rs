//! Push channel ingestion: SSE framing, frame parsing and the ingestor task.

pub mod event;
pub mod ingestor;
pub mod sse;

pub use event::{ConversationEvent, Speaker, StreamFrame, parse_frame};
pub use ingestor::{IngestEnd, IngestorHandle, StreamIngestor, ingest};
pub use sse::SseDecoder;
