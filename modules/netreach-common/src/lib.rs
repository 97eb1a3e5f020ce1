pub mod config;
pub mod error;
pub mod retry;
pub mod types;

pub use config::Config;
pub use error::{EngineError, Result};
pub use types::{
    Link, LinkType, MergedLink, ResultType, SearchRequest, SearchResponse, SearchResult,
    SourceType,
};
