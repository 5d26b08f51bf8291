mod chat;
mod config;
mod ingest;
mod query;
mod serve;
mod status;

pub use chat::ChatArgs;
pub use config::ConfigCommand;
pub use ingest::IngestArgs;
pub use query::QueryArgs;
pub use serve::ServeArgs;

pub use chat::handle_chat;
pub use config::handle_config;
pub use ingest::handle_ingest;
pub use query::handle_query;
pub use serve::handle_serve;
pub use status::handle_status;
