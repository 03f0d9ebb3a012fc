use crate::error::{ChatError, Result};
use crate::models::Message;
use std::fs;
use std::path::Path;

pub const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "csv", "md", "json", "yaml", "yml", "log", "xml", "html", "toml",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: String,
    pub content: String,
}

/// Files attached to a conversation. They are sent as context with every
/// request but never stored in the session history.
#[derive(Debug, Clone, Default)]
pub struct Attachments {
    files: Vec<Attachment>,
    max_bytes: u64,
}

impl Attachments {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            files: Vec::new(),
            max_bytes,
        }
    }

    /// Read a file and attach it under its file name. Unsupported formats are
    /// attached as a notice rather than rejected.
    pub fn attach_path(&mut self, path: &Path) -> Result<&Attachment> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ChatError::Other(format!("Invalid file name: {}", path.display())))?
            .to_string();

        let metadata = fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(ChatError::Other(format!("Not a file: {}", path.display())));
        }
        if metadata.len() > self.max_bytes {
            return Err(ChatError::Other(format!(
                "File too large: {} ({} bytes, max {} bytes)",
                name,
                metadata.len(),
                self.max_bytes
            )));
        }

        let content = if is_text_file(path) {
            let bytes = fs::read(path)?;
            String::from_utf8(bytes).map_err(|_| {
                ChatError::Other(format!("File {} is not valid UTF-8 text", name))
            })?
        } else {
            format!("File {} not extracted (unsupported format)", name)
        };

        Ok(self.attach(name, content))
    }

    /// Re-attaching a name replaces its content in place.
    pub fn attach(&mut self, name: impl Into<String>, content: impl Into<String>) -> &Attachment {
        let attachment = Attachment {
            name: name.into(),
            content: content.into(),
        };

        let index = match self.files.iter().position(|f| f.name == attachment.name) {
            Some(index) => {
                self.files[index] = attachment;
                index
            }
            None => {
                self.files.push(attachment);
                self.files.len() - 1
            }
        };
        &self.files[index]
    }

    pub fn detach(&mut self, name: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.name != name);
        self.files.len() != before
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn context_message(&self) -> Option<Message> {
        if self.files.is_empty() {
            return None;
        }

        let blocks: Vec<String> = self
            .files
            .iter()
            .map(|f| format!("=== {} ===\n{}", f.name, f.content))
            .collect();

        Some(Message::system(format!(
            "Attached files:\n{}",
            blocks.join("\n\n")
        )))
    }

    /// Request messages: `history` with the context message placed after the
    /// leading system messages.
    pub fn apply(&self, history: &[Message]) -> Vec<Message> {
        let mut messages = history.to_vec();
        if let Some(context) = self.context_message() {
            let position = messages
                .iter()
                .position(|m| m.role != "system")
                .unwrap_or(messages.len());
            messages.insert(position, context);
        }
        messages
    }
}

pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_attach_text_and_unsupported() {
        let temp_dir = TempDir::new().unwrap();
        let notes = temp_dir.path().join("notes.md");
        let image = temp_dir.path().join("photo.png");
        fs::write(&notes, "# Title").unwrap();
        fs::write(&image, [0u8, 159, 146, 150]).unwrap();

        let mut attachments = Attachments::new(1024);
        assert_eq!(attachments.attach_path(&notes).unwrap().content, "# Title");
        assert_eq!(
            attachments.attach_path(&image).unwrap().content,
            "File photo.png not extracted (unsupported format)"
        );
        assert_eq!(attachments.names(), vec!["notes.md", "photo.png"]);
    }

    #[test]
    fn test_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        let big = temp_dir.path().join("big.txt");
        fs::write(&big, "x".repeat(20)).unwrap();

        let mut attachments = Attachments::new(10);
        assert!(attachments.attach_path(&big).is_err());
        assert!(attachments.is_empty());
    }

    #[test]
    fn test_reattach_replaces_in_place() {
        let mut attachments = Attachments::new(1024);
        attachments.attach("a.txt", "one");
        attachments.attach("b.txt", "two");
        attachments.attach("a.txt", "three");

        assert_eq!(attachments.names(), vec!["a.txt", "b.txt"]);
        let context = attachments.context_message().unwrap();
        assert_eq!(
            context.content.as_deref(),
            Some("Attached files:\n=== a.txt ===\nthree\n\n=== b.txt ===\ntwo")
        );

        assert!(attachments.detach("a.txt"));
        assert!(!attachments.detach("a.txt"));
        assert_eq!(attachments.len(), 1);
    }

    #[test]
    fn test_apply_inserts_after_system_messages() {
        let mut attachments = Attachments::new(1024);
        let history = vec![Message::system("sys"), Message::user("hi")];
        assert_eq!(attachments.apply(&history), history);

        attachments.attach("a.txt", "content");
        let messages = attachments.apply(&history);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content.as_deref(), Some("sys"));
        assert!(messages[1]
            .content
            .as_deref()
            .unwrap()
            .starts_with("Attached files:"));
        assert_eq!(messages[2].role, "user");
    }
}
