use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(name = "toolchat")]
#[command(about = "Chat with Azure OpenAI / OpenAI models, with tool plugins loaded from a directory", long_about = None)]
pub struct Args {
    #[arg(short = 'n', long = "new", help = "Start a new conversation")]
    pub new_conversation: bool,

    #[arg(
        short = 'c',
        long = "continue",
        help = "Continue the previous conversation even if expired"
    )]
    pub force_continue: bool,

    #[arg(long = "clear", help = "Clear all conversation history")]
    pub clear_history: bool,

    #[arg(short = 'i', long = "interactive", help = "Start an interactive chat session")]
    pub interactive: bool,

    #[arg(long = "serve", help = "Run the HTTP chat API instead of the terminal client")]
    pub serve: bool,

    #[arg(long = "host", help = "Address to bind with --serve")]
    pub host: Option<String>,

    #[arg(long = "port", help = "Port to bind with --serve")]
    pub port: Option<u16>,

    #[arg(
        short = 'a',
        long = "attach",
        value_name = "FILE",
        help = "Attach a text file as conversation context (repeatable)"
    )]
    pub attach: Vec<String>,

    #[arg(long = "no-tools", help = "Disable tools for this query")]
    pub no_tools: bool,

    #[arg(long = "list-tools", help = "List the available tools and exit")]
    pub list_tools: bool,

    #[arg(
        long = "install-tool",
        value_name = "MANIFEST",
        help = "Copy a tool manifest into the tools directory"
    )]
    pub install_tool: Option<String>,

    #[arg(long = "remove-tool", value_name = "NAME", help = "Remove a plugin tool")]
    pub remove_tool: Option<String>,

    #[arg(
        long = "config-init",
        help = "Write a default config file to ~/.config/toolchat/toolchat.yaml"
    )]
    pub config_init: bool,

    #[arg(long = "api-type", help = "API flavour: azure or openai")]
    pub api_type: Option<String>,

    #[arg(long = "api-base", help = "API base URL (Azure resource endpoint or OpenAI-compatible /v1)")]
    pub api_base: Option<String>,

    #[arg(long = "api-version", help = "Azure OpenAI API version")]
    pub api_version: Option<String>,

    #[arg(short = 'm', long = "model", help = "Model name (Azure deployment name)")]
    pub model: Option<String>,

    #[arg(long = "tools-dir", help = "Directory scanned for tool-<name> manifests")]
    pub tools_dir: Option<String>,

    #[arg(short = 'v', long = "verbose", help = "Print diagnostic logs to stderr")]
    pub verbose: bool,

    #[arg(help = "Prompt to send")]
    pub prompt: Vec<String>,
}
