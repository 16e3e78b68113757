//! HTTP-backed collaborators: the document comment API, the agent runtime
//! and the local credential cache.

pub mod agent_client;
pub mod comment_fetcher;
pub mod credential_session;
pub mod transport_helpers;

pub use agent_client::{
    HttpAgentRuntime, HttpAgentRuntimeConfig, NdjsonDecoder, DEFAULT_MAX_ITERATIONS,
};
pub use comment_fetcher::{HttpCommentFetcher, HttpCommentFetcherConfig};
pub use credential_session::FileCredentialSession;
