pub mod conversation;
pub mod gemini;
pub mod model_client;
pub mod session;

pub use conversation::MemoryManager;
pub use gemini::{GeminiService, GenerativeBackend};
pub use model_client::ModelClient;
pub use session::SessionManager;
