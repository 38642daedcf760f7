pub mod gemini;
pub mod sql_http;

pub use gemini::{GeminiEmbedder, GeminiGenerator};
pub use sql_http::SqlHttpStore;
