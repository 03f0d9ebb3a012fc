use colored::*;
use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::as_24_bit_terminal_escaped;
use terminal_size::{terminal_size, Width};

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME: Lazy<Theme> = Lazy::new(|| {
    let mut themes = ThemeSet::load_defaults().themes;
    themes
        .remove("Solarized (dark)")
        .or_else(|| themes.into_values().next())
        .unwrap_or_default()
});

const FENCE: &str = "```";
const MAX_BOX_WIDTH: usize = 100;

/// Streaming markdown renderer: fenced code blocks are boxed and syntax
/// highlighted, everything else passes through. Text outside code blocks is
/// emitted as soon as it cannot be the start of a fence.
pub struct CodeBuffer {
    pending: String,
    /// Part of the current line has already been emitted as plain text.
    line_started: bool,
    code_lang: Option<String>,
    highlighter: Option<HighlightLines<'static>>,
    in_code_block: bool,
    width: usize,
}

impl CodeBuffer {
    pub fn new() -> Self {
        let width = terminal_size()
            .map(|(Width(w), _)| w as usize)
            .unwrap_or(80)
            .clamp(20, MAX_BOX_WIDTH);
        Self::with_width(width)
    }

    pub fn with_width(width: usize) -> Self {
        Self {
            pending: String::new(),
            line_started: false,
            code_lang: None,
            highlighter: None,
            in_code_block: false,
            width,
        }
    }

    pub fn append(&mut self, content: &str) -> String {
        let mut output = String::new();

        for piece in content.split_inclusive('\n') {
            self.pending.push_str(piece);

            if piece.ends_with('\n') {
                let line = std::mem::take(&mut self.pending);
                if self.line_started {
                    output.push_str(&line);
                } else {
                    output.push_str(&self.render_line(&line));
                }
                self.line_started = false;
            } else if !self.in_code_block
                && (self.line_started || !could_be_fence(&self.pending))
            {
                output.push_str(&self.pending);
                self.pending.clear();
                self.line_started = true;
            }
        }

        output
    }

    pub fn flush(&mut self) -> String {
        let mut output = String::new();

        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            if self.line_started {
                output.push_str(&line);
            } else {
                output.push_str(&self.render_line(&line));
            }
        }

        if self.in_code_block {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&self.footer());
            self.close_block();
        }

        self.line_started = false;
        output
    }

    fn render_line(&mut self, line: &str) -> String {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix(FENCE) {
            if self.in_code_block {
                if rest.trim().is_empty() {
                    let footer = self.footer();
                    self.close_block();
                    return footer;
                }
            } else {
                let lang = rest.trim();
                self.open_block(if lang.is_empty() { None } else { Some(lang) });
                return self.header();
            }
        }

        if self.in_code_block {
            self.highlight(line)
        } else {
            line.to_string()
        }
    }

    fn open_block(&mut self, lang: Option<&str>) {
        let syntax = lang
            .and_then(|l| {
                SYNTAX_SET
                    .find_syntax_by_token(l)
                    .or_else(|| SYNTAX_SET.find_syntax_by_extension(l))
            })
            .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

        self.code_lang = lang.map(|l| l.to_string());
        self.highlighter = Some(HighlightLines::new(syntax, &THEME));
        self.in_code_block = true;
    }

    fn close_block(&mut self) {
        self.code_lang = None;
        self.highlighter = None;
        self.in_code_block = false;
    }

    fn highlight(&mut self, line: &str) -> String {
        let line = if line.ends_with('\n') {
            line.to_string()
        } else {
            format!("{}\n", line)
        };

        let Some(highlighter) = self.highlighter.as_mut() else {
            return line;
        };

        match highlighter.highlight_line(&line, &SYNTAX_SET) {
            Ok(ranges) => {
                let ranges: Vec<(Style, &str)> = ranges;
                format!("{}\x1b[0m", as_24_bit_terminal_escaped(&ranges[..], false))
            }
            Err(_) => line,
        }
    }

    fn header(&self) -> String {
        let label = self.code_lang.as_deref().unwrap_or("code");
        let used = 4 + label.chars().count();
        let fill = self.width.saturating_sub(used).max(3);
        format!(
            "{}[{}]{}\n",
            "┌─".dimmed(),
            label.cyan(),
            "─".repeat(fill).dimmed()
        )
    }

    fn footer(&self) -> String {
        format!("{}\n", format!("└{}", "─".repeat(self.width.saturating_sub(1))).dimmed())
    }
}

impl Default for CodeBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a partial line might still turn into a code fence.
fn could_be_fence(partial: &str) -> bool {
    let t = partial.trim_start();
    FENCE.starts_with(t) || t.starts_with(FENCE)
}
