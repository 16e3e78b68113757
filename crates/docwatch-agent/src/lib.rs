//! Agent-side pipeline: instruction building, progress translation and the
//! console and SSE dispatch sinks.

pub mod console_sink;
pub mod instruction;
pub mod runner;
pub mod stream_sink;
pub mod translator;

pub use console_sink::{render_console_line, AgentReplyDispatcher, ConsoleSink};
pub use instruction::{build_instruction, extract_request_text};
pub use runner::run_agent_streaming;
pub use stream_sink::{
    data_frame, error_frame, ChannelTransport, SinkError, SseStreamSink, SseTransport,
    StreamOutcome, DONE_FRAME,
};
pub use translator::{translate_progress_stream, AgentEventStream, AgentEventTranslator};
