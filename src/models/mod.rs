mod content;
mod session;
mod tool;

pub use content::ensure_string_content;
pub use session::{Message, Session};
pub use tool::{FunctionCall, ToolCall};
