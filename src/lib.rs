pub mod config;
pub mod document;
pub mod external;
pub mod generation;
pub mod model;
pub mod normalize;
pub mod prompt;
pub mod search;

pub use config::Config;
pub use document::{Query, RetrievedDocument};
pub use external::{
    Embedder, EmbeddingEngine, LLMEngine, QdrantVectorDB, StackError, StackResult,
    TextGenerator, VectorDB,
};
pub use generation::{flatten, flatten_strict, Generation, GenerationNode};
pub use model::{ChatHistory, StackModel};
pub use normalize::{normalize, ChatResult, NormalizedResult, QaResult};
pub use prompt::PromptTemplate;
pub use search::{search, BackendPolicy, QueryDispatcher, SearchMethod, SearchOptions, VectorSearch};
