pub mod claude;
pub mod claude_cli;
pub mod gemini;
pub mod gemini_cli;
pub mod openai_chat;
pub mod openai_responses;

pub use claude::ClaudeChatNormalizer;
pub use claude_cli::ClaudeCliNormalizer;
pub use gemini::GeminiChatNormalizer;
pub use gemini_cli::GeminiCliNormalizer;
pub use openai_chat::OpenAiChatNormalizer;
pub use openai_responses::OpenAiResponsesNormalizer;
