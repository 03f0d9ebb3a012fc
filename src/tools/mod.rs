//! Tool plugins: built-in tools plus manifests discovered in the tools
//! directory, exposed to the model as function definitions.

pub mod builtins;
pub mod executor;
pub mod manifest;
pub mod paths;
mod registry;

pub use builtins::BuiltinTool;
pub use manifest::{PluginKind, PluginManifest};
pub use registry::{RegisteredTool, ToolHandler, ToolRegistry, ToolSettings};
