pub const DEFAULT_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";

pub fn default_api_type() -> String {
    "azure".to_string()
}

pub fn default_stream() -> bool {
    true
}

pub fn default_request_timeout() -> u64 {
    120
}

pub fn default_stream_timeout() -> u64 {
    30
}

pub fn default_history_turns() -> usize {
    10
}

pub fn default_expiry_minutes() -> i64 {
    30
}

pub fn default_tools_enabled() -> bool {
    true
}

pub fn default_tools_directory() -> String {
    "tools".to_string()
}

pub fn default_workspace_dir() -> String {
    ".".to_string()
}

pub fn default_max_rounds() -> usize {
    3
}

pub fn default_max_file_size_mb() -> u64 {
    10
}

pub fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_port() -> u16 {
    8000
}

pub fn default_tool_timeout() -> u64 {
    30
}

pub fn default_max_output_bytes() -> u64 {
    1_048_576 // 1MB
}

pub fn default_true() -> bool {
    true
}

pub fn is_true(value: &bool) -> bool {
    *value
}
