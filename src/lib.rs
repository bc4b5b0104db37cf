pub mod chunking;
pub mod clock;
pub mod database;
pub mod errors;
pub mod gateway;
pub mod gemini;
pub mod ingest;
pub mod pending;
pub mod rag;
pub mod scheduler;
pub mod server;
