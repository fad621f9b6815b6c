//! Static table of every operation the assistant can request.

use deskpilot_core::Arguments;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Capability group an operation belongs to. Each group has exactly one
/// handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationGroup {
    System,
    File,
    Terminal,
    Web,
    Media,
}

impl OperationGroup {
    pub const ALL: [OperationGroup; 5] = [
        OperationGroup::System,
        OperationGroup::File,
        OperationGroup::Terminal,
        OperationGroup::Web,
        OperationGroup::Media,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationGroup::System => "system",
            OperationGroup::File => "file",
            OperationGroup::Terminal => "terminal",
            OperationGroup::Web => "web",
            OperationGroup::Media => "media",
        }
    }
}

impl fmt::Display for OperationGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
}

#[derive(Debug)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub description: &'static str,
    pub required: bool,
    pub allowed: &'static [&'static str],
}

const fn req(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::String,
        description,
        required: true,
        allowed: &[],
    }
}

const fn opt(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::String,
        description,
        required: false,
        allowed: &[],
    }
}

const fn opt_int(name: &'static str, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Integer,
        description,
        required: false,
        allowed: &[],
    }
}

const fn action(description: &'static str, allowed: &'static [&'static str]) -> ParamSpec {
    ParamSpec {
        name: "action",
        kind: ParamKind::String,
        description,
        required: true,
        allowed,
    }
}

#[derive(Debug)]
pub struct Operation {
    pub name: &'static str,
    pub group: OperationGroup,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

impl Operation {
    pub fn required_params(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.params.iter().filter(|p| p.required).map(|p| p.name)
    }

    /// Required parameters absent (or null) in `arguments`.
    pub fn missing_params(&self, arguments: &Arguments) -> Vec<&'static str> {
        self.required_params()
            .filter(|name| arguments.get(*name).map_or(true, Value::is_null))
            .collect()
    }

    /// JSON-schema description of the parameters.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in self.params {
            let mut prop = json!({
                "type": match param.kind {
                    ParamKind::String => "string",
                    ParamKind::Integer => "integer",
                },
                "description": param.description,
            });
            if !param.allowed.is_empty() {
                prop["enum"] = json!(param.allowed);
            }
            properties.insert(param.name.to_string(), prop);
        }
        let required: Vec<&str> = self.required_params().collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

macro_rules! op {
    ($group:ident, $name:literal, $desc:literal, [$($param:expr),* $(,)?]) => {
        Operation {
            name: $name,
            group: OperationGroup::$group,
            description: $desc,
            params: &[$($param),*],
        }
    };
}

pub static OPERATIONS: &[Operation] = &[
    // system
    op!(System, "control_volume", "Control system volume", [
        action("Volume control action", &["mute", "unmute", "up", "down", "set"]),
        opt_int("value", "Volume value (0-100) for 'set' action"),
    ]),
    op!(System, "control_brightness", "Control screen brightness", [
        action("Brightness control action", &["up", "down", "set"]),
        opt_int("value", "Brightness value (0-100) for 'set' action"),
    ]),
    op!(System, "power_management", "Sleep, shut down, restart or hibernate the computer", [
        action("Power action", &["sleep", "shutdown", "restart", "hibernate"]),
    ]),
    op!(System, "window_management", "Minimize, maximize, close or focus an application window", [
        action("Window action", &["minimize", "maximize", "close", "focus"]),
        opt("window_name", "Title (or part of it) of the window to manage"),
    ]),
    op!(System, "process_control", "Start, stop, restart or query a process by name", [
        action("Process action", &["start", "stop", "restart", "status"]),
        req("process_name", "Name of the process"),
    ]),
    // file
    op!(File, "create_file", "Create a file, optionally with initial content", [
        req("path", "Path of the file to create"),
        opt("content", "Initial content"),
    ]),
    op!(File, "read_file", "Read the contents of a text file", [
        req("path", "Path of the file to read"),
    ]),
    op!(File, "write_file", "Overwrite a file with new content", [
        req("path", "Path of the file to write"),
        req("content", "Content to write"),
    ]),
    op!(File, "append_file", "Append content to the end of a file", [
        req("path", "Path of the file to append to"),
        req("content", "Content to append"),
    ]),
    op!(File, "delete_file", "Delete a file", [
        req("path", "Path of the file to delete"),
    ]),
    op!(File, "create_directory", "Create a directory and any missing parents", [
        req("path", "Path of the directory to create"),
    ]),
    op!(File, "list_directory", "List the entries of a directory", [
        req("path", "Path of the directory to list"),
    ]),
    op!(File, "delete_directory", "Delete a directory and everything in it", [
        req("path", "Path of the directory to delete"),
    ]),
    op!(File, "get_file_info", "Get size, timestamps and permissions of a file", [
        req("path", "Path of the file"),
    ]),
    op!(File, "get_directory_size", "Total size in bytes of all files under a directory", [
        req("path", "Path of the directory"),
    ]),
    // terminal
    op!(Terminal, "execute_command", "Run a shell command and return its output", [
        req("command", "Command line to run"),
    ]),
    op!(Terminal, "execute_command_with_output", "Run a shell command and return exit code, stdout and stderr", [
        req("command", "Command line to run"),
    ]),
    op!(Terminal, "start_process", "Start a program in the background", [
        req("process_name", "Program or command line to start"),
    ]),
    op!(Terminal, "stop_process", "Terminate a running process by exact name", [
        req("process_name", "Name of the process to stop"),
    ]),
    op!(Terminal, "list_processes", "List running processes", []),
    op!(Terminal, "get_system_info", "Get operating system, CPU, memory and disk information", []),
    op!(Terminal, "get_network_info", "Get network interfaces and traffic counters", []),
    op!(Terminal, "run_os_command", "Run a command through the platform's native shell", [
        req("command", "Command line to run"),
    ]),
    op!(Terminal, "print_message", "Print a message on the assistant's console", [
        req("message", "Message to print"),
    ]),
    op!(Terminal, "build_project", "Build a project, detecting its type when not given", [
        req("project_path", "Path of the project"),
        ParamSpec {
            name: "build_type",
            kind: ParamKind::String,
            description: "Project type",
            required: false,
            allowed: &["auto", "python", "node", "java", "rust", "docker"],
        },
    ]),
    // web
    op!(Web, "search_web", "Search the web", [req("query", "Search query")]),
    op!(Web, "search_images", "Search for images", [req("query", "Search query")]),
    op!(Web, "search_videos", "Search for videos", [req("query", "Search query")]),
    op!(Web, "search_news", "Search news articles", [req("query", "Search query")]),
    op!(Web, "search_academic", "Search academic papers", [req("query", "Search query")]),
    op!(Web, "download_file", "Download a URL to a local file", [
        req("url", "URL to download"),
        req("path", "Destination path"),
    ]),
    op!(Web, "download_image", "Download an image URL to a local file", [
        req("url", "Image URL"),
        req("path", "Destination path"),
    ]),
    op!(Web, "download_video", "Download a video URL to a local file", [
        req("url", "Video URL"),
        req("path", "Destination path"),
    ]),
    // media
    op!(Media, "generate_image", "Generate an image from a text prompt", [
        req("prompt", "Description of the image"),
        ParamSpec {
            name: "size",
            kind: ParamKind::String,
            description: "Image size",
            required: false,
            allowed: &["256x256", "512x512", "1024x1024"],
        },
    ]),
    op!(Media, "edit_image", "Apply an edit (grayscale, blur, sharpen, invert, rotate, flip, resize) to an image", [
        req("path", "Path of the image"),
        req("instruction", "Edit to apply"),
    ]),
    op!(Media, "analyze_image", "Report dimensions, color type and average color of an image", [
        req("path", "Path of the image"),
    ]),
    op!(Media, "generate_audio", "Synthesize speech from text", [
        req("text", "Text to speak"),
        opt("voice", "Voice to use"),
    ]),
    op!(Media, "transcribe_audio", "Transcribe speech in an audio file", [
        req("path", "Path of the audio file"),
    ]),
    op!(Media, "edit_audio", "Edit a WAV file (louder, quieter, reverse, trim N seconds)", [
        req("path", "Path of the WAV file"),
        req("instruction", "Edit to apply"),
    ]),
];

/// Requested operation name is not registered.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown action: {0}")]
pub struct NotFound(pub String);

/// Read-only index over [`OPERATIONS`].
pub struct OperationRegistry {
    operations: &'static [Operation],
    index: HashMap<&'static str, usize>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::from_table(OPERATIONS)
    }

    pub fn from_table(operations: &'static [Operation]) -> Self {
        let index = operations
            .iter()
            .enumerate()
            .map(|(i, op)| (op.name, i))
            .collect();
        Self { operations, index }
    }

    pub fn lookup(&self, name: &str) -> Result<&'static Operation, NotFound> {
        let operations = self.operations;
        self.index
            .get(name)
            .map(|&i| &operations[i])
            .ok_or_else(|| NotFound(name.to_string()))
    }

    /// Operations in table order.
    pub fn operations(&self) -> &'static [Operation] {
        self.operations
    }

    pub fn by_group(&self, group: OperationGroup) -> impl Iterator<Item = &'static Operation> {
        self.operations.iter().filter(move |op| op.group == group)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Tool list in OpenAI function format.
    pub fn schemas(&self) -> Vec<Value> {
        self.operations
            .iter()
            .map(|op| {
                json!({
                    "type": "function",
                    "function": {
                        "name": op.name,
                        "description": op.description,
                        "parameters": op.parameters_schema()
                    }
                })
            })
            .collect()
    }

    /// Tool list in the flat realtime-session format.
    pub fn realtime_schemas(&self) -> Vec<Value> {
        self.operations
            .iter()
            .map(|op| {
                json!({
                    "type": "function",
                    "name": op.name,
                    "description": op.description,
                    "parameters": op.parameters_schema()
                })
            })
            .collect()
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_operation_names_are_unique() {
        let mut seen = HashSet::new();
        for op in OPERATIONS {
            assert!(seen.insert(op.name), "duplicate operation {}", op.name);
        }
        assert_eq!(OperationRegistry::new().index.len(), OPERATIONS.len());
    }

    #[test]
    fn test_catalogue_size_per_group() {
        let registry = OperationRegistry::new();
        assert_eq!(registry.by_group(OperationGroup::System).count(), 5);
        assert_eq!(registry.by_group(OperationGroup::File).count(), 10);
        assert_eq!(registry.by_group(OperationGroup::Terminal).count(), 10);
        assert_eq!(registry.by_group(OperationGroup::Web).count(), 8);
        assert_eq!(registry.by_group(OperationGroup::Media).count(), 6);
        assert_eq!(registry.len(), 39);
    }

    #[test]
    fn test_lookup() {
        let registry = OperationRegistry::new();
        let op = registry.lookup("read_file").unwrap();
        assert_eq!(op.group, OperationGroup::File);
        assert_eq!(op.required_params().collect::<Vec<_>>(), vec!["path"]);

        let err = registry.lookup("teleport").unwrap_err();
        assert_eq!(err.to_string(), "Unknown action: teleport");
    }

    #[test]
    fn test_missing_params_treats_null_as_missing() {
        let registry = OperationRegistry::new();
        let op = registry.lookup("write_file").unwrap();
        let mut args = Arguments::new();
        args.insert("path".into(), json!("a.txt"));
        args.insert("content".into(), Value::Null);
        assert_eq!(op.missing_params(&args), vec!["content"]);
    }

    #[test]
    fn test_schema_shape() {
        let registry = OperationRegistry::new();
        let schema = registry.lookup("control_volume").unwrap().parameters_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["action"]));
        assert_eq!(schema["properties"]["value"]["type"], "integer");
        assert_eq!(
            schema["properties"]["action"]["enum"],
            json!(["mute", "unmute", "up", "down", "set"])
        );

        let tools = registry.schemas();
        assert_eq!(tools.len(), 39);
        assert_eq!(tools[0]["function"]["name"], "control_volume");

        let realtime = registry.realtime_schemas();
        assert_eq!(realtime[0]["name"], "control_volume");
    }

    #[test]
    fn test_group_display() {
        assert_eq!(OperationGroup::Terminal.to_string(), "terminal");
        assert_eq!(
            serde_json::to_string(&OperationGroup::Media).unwrap(),
            r#""media""#
        );
    }
}
