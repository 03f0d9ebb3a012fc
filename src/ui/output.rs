use crate::orchestrator::ChatObserver;
use crate::tools::RegisteredTool;
use crate::ui::highlight::CodeBuffer;
use colored::*;
use std::io::{self, Write};

fn render_block(label: &str, body: &str) -> String {
    let sep = if body.ends_with('\n') { "" } else { "\n" };
    let block = format!("```{}\n{}{}```\n", label, body, sep);
    let mut code_buffer = CodeBuffer::new();
    let mut rendered = code_buffer.append(&block);
    rendered.push_str(&code_buffer.flush());
    rendered
}

/// Display a tool result in a boxed format
pub fn display_tool_result(name: &str, result: &str) {
    print!("{}", render_block(&format!("TOOL: {}", name), result));
}

/// Display a tool error in a boxed format
pub fn display_tool_error(name: &str, error: &str) {
    print!("{}", render_block(&format!("TOOL ERROR: {}", name), error));
}

/// Display content with syntax highlighting
pub fn display_content(content: &str) {
    let mut code_buffer = CodeBuffer::new();
    let formatted = code_buffer.append(content);
    print!("{}", formatted);
    let remaining = code_buffer.flush();
    print!("{}", remaining.trim_end());
    println!();
}

pub fn display_tool_list(tools: &[&RegisteredTool]) {
    if tools.is_empty() {
        println!("{}", "No tools available.".yellow());
        return;
    }

    println!("{}", format!("Available tools ({}):", tools.len()).cyan());
    for tool in tools {
        println!(
            "  {} {} {}",
            tool.name.green().bold(),
            format!("({})", tool.source()).dimmed(),
            tool.description
        );
    }
}

/// Renders a turn on the terminal: tool boxes as they run and the answer
/// streamed through the highlighter.
pub struct TerminalObserver {
    code_buffer: CodeBuffer,
    stream: bool,
    printed_any: bool,
}

impl TerminalObserver {
    pub fn new(stream: bool) -> Self {
        Self {
            code_buffer: CodeBuffer::new(),
            stream,
            printed_any: false,
        }
    }

    /// Flush what is left of a streamed answer.
    pub fn finish(&mut self) {
        let remaining = self.code_buffer.flush();
        if !remaining.is_empty() {
            print!("{}", remaining.trim_end());
            self.printed_any = true;
        }
        if self.printed_any {
            println!();
        }
        let _ = io::stdout().flush();
        self.printed_any = false;
    }
}

impl ChatObserver for TerminalObserver {
    fn on_tool_call(&mut self, name: &str, _arguments: &str) {
        println!("{}", format!("Calling tool: {}...", name).cyan());
    }

    fn on_tool_result(&mut self, name: &str, result: &str, is_error: bool) {
        if is_error {
            display_tool_error(name, result);
        } else {
            display_tool_result(name, result);
        }
    }

    fn on_delta(&mut self, text: &str) {
        let formatted = self.code_buffer.append(text);
        if !formatted.is_empty() {
            print!("{}", formatted);
            let _ = io::stdout().flush();
            self.printed_any = true;
        }
    }

    fn wants_stream(&self) -> bool {
        self.stream
    }
}
