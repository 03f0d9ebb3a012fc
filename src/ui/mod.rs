mod highlight;
mod output;

pub use highlight::CodeBuffer;
pub use output::{
    display_content, display_tool_error, display_tool_list, display_tool_result, TerminalObserver,
};
