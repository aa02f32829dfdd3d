pub mod azure_openai;
pub mod hashing;

pub use azure_openai::AzureOpenAiEmbeddings;
pub use hashing::HashingEmbeddings;
