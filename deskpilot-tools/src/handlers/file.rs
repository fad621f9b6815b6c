//! File and directory operations.

use crate::error::HandlerError;
use crate::handler::CapabilityHandler;
use crate::params::{require, FileParams, ParamRecord};
use crate::registry::OperationGroup;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use deskpilot_core::{Arguments, ToolCallResult};
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Largest file `read_file` returns in full.
const MAX_READ_BYTES: u64 = 1024 * 1024;

pub struct FileHandler {
    base_dir: Option<PathBuf>,
}

impl FileHandler {
    /// Relative paths resolve against the process working directory.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Relative paths resolve against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, raw: Option<String>) -> Result<(PathBuf, String), HandlerError> {
        let raw = require(raw, "path")?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HandlerError::InvalidArgument("path cannot be empty".into()));
        }
        let expanded = expand_home(trimmed);
        let path = match &self.base_dir {
            Some(base) if expanded.is_relative() => base.join(expanded),
            _ => expanded,
        };
        Ok((path, trimmed.to_string()))
    }

    async fn create_file(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        ensure_parent(&path).await?;
        fs::write(&path, p.content.unwrap_or_default())
            .await
            .map_err(HandlerError::io(format!("Error creating file {shown}")))?;
        Ok(ToolCallResult::success(format!("File created successfully at {shown}")))
    }

    async fn read_file(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(HandlerError::io(format!("Error reading file {shown}")))?;
        if meta.is_dir() {
            return Err(HandlerError::InvalidArgument(format!("{shown} is a directory")));
        }
        if meta.len() > MAX_READ_BYTES {
            return Err(HandlerError::Failed(format!(
                "{shown} is {} bytes; files over {MAX_READ_BYTES} bytes are not read",
                meta.len()
            )));
        }
        let bytes = fs::read(&path)
            .await
            .map_err(HandlerError::io(format!("Error reading file {shown}")))?;
        Ok(ToolCallResult::success(String::from_utf8_lossy(&bytes).into_owned()))
    }

    async fn write_file(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        let content = require(p.content, "content")?;
        ensure_parent(&path).await?;
        fs::write(&path, content)
            .await
            .map_err(HandlerError::io(format!("Error writing to file {shown}")))?;
        Ok(ToolCallResult::success(format!("File written successfully at {shown}")))
    }

    async fn append_file(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        let content = require(p.content, "content")?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(HandlerError::io(format!("Error appending to file {shown}")))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(HandlerError::io(format!("Error appending to file {shown}")))?;
        file.flush()
            .await
            .map_err(HandlerError::io(format!("Error appending to file {shown}")))?;
        Ok(ToolCallResult::success(format!("Content appended successfully to {shown}")))
    }

    async fn delete_file(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        fs::remove_file(&path)
            .await
            .map_err(HandlerError::io(format!("Error deleting file {shown}")))?;
        Ok(ToolCallResult::success(format!("File deleted successfully: {shown}")))
    }

    async fn create_directory(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        fs::create_dir_all(&path)
            .await
            .map_err(HandlerError::io(format!("Error creating directory {shown}")))?;
        Ok(ToolCallResult::success(format!("Directory created successfully at {shown}")))
    }

    async fn list_directory(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        let context = format!("Error listing directory {shown}");
        let mut entries = fs::read_dir(&path)
            .await
            .map_err(HandlerError::io(context.clone()))?;

        let mut items = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(HandlerError::io(context.clone()))?
        {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            items.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": if meta.is_dir() { "directory" } else { "file" },
                "size": meta.len(),
                "modified": meta.modified().ok().map(format_time),
            }));
        }
        items.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));

        let listing = items
            .iter()
            .map(|item| {
                format!(
                    "{} ({}, {} bytes)",
                    item["name"].as_str().unwrap_or_default(),
                    item["type"].as_str().unwrap_or_default(),
                    item["size"]
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let message = if items.is_empty() {
            format!("{shown} is empty")
        } else {
            format!("Contents of {shown}:\n{listing}")
        };

        let mut data = Map::new();
        data.insert("entries".into(), Value::Array(items));
        Ok(ToolCallResult::success_with(message, data))
    }

    async fn delete_directory(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        if path.parent().is_none() {
            return Err(HandlerError::InvalidArgument(format!(
                "refusing to delete filesystem root {shown}"
            )));
        }
        fs::remove_dir_all(&path)
            .await
            .map_err(HandlerError::io(format!("Error deleting directory {shown}")))?;
        Ok(ToolCallResult::success(format!("Directory deleted successfully: {shown}")))
    }

    async fn get_file_info(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        let meta = fs::metadata(&path)
            .await
            .map_err(HandlerError::io(format!("Error getting file info for {shown}")))?;

        let info = json!({
            "size": meta.len(),
            "is_dir": meta.is_dir(),
            "created": meta.created().ok().map(format_time),
            "modified": meta.modified().ok().map(format_time),
            "accessed": meta.accessed().ok().map(format_time),
            "permissions": permissions(&meta),
        });
        let message = format!("File info for {shown}: {info}");
        let data = info.as_object().cloned().unwrap_or_default();
        Ok(ToolCallResult::success_with(message, data))
    }

    async fn get_directory_size(&self, p: FileParams) -> Result<ToolCallResult, HandlerError> {
        let (path, shown) = self.resolve(p.path)?;
        let total = directory_size(&path)
            .await
            .map_err(HandlerError::io(format!("Error calculating directory size of {shown}")))?;
        let mut data = Map::new();
        data.insert("bytes".into(), json!(total));
        Ok(ToolCallResult::success_with(
            format!("Directory size: {total} bytes"),
            data,
        ))
    }
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityHandler for FileHandler {
    fn group(&self) -> OperationGroup {
        OperationGroup::File
    }

    async fn execute(
        &self,
        operation: &str,
        params: &Arguments,
    ) -> Result<ToolCallResult, HandlerError> {
        let p = FileParams::from_args(params);
        match operation {
            "create_file" => self.create_file(p).await,
            "read_file" => self.read_file(p).await,
            "write_file" => self.write_file(p).await,
            "append_file" => self.append_file(p).await,
            "delete_file" => self.delete_file(p).await,
            "create_directory" => self.create_directory(p).await,
            "list_directory" => self.list_directory(p).await,
            "delete_directory" => self.delete_directory(p).await,
            "get_file_info" => self.get_file_info(p).await,
            "get_directory_size" => self.get_directory_size(p).await,
            other => Err(HandlerError::UnsupportedOperation(other.to_string())),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

async fn ensure_parent(path: &Path) -> Result<(), HandlerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(HandlerError::io(format!("Error creating {}", parent.display())))?;
    }
    Ok(())
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

#[cfg(unix)]
fn permissions(meta: &std::fs::Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    format!("{:03o}", meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permissions(meta: &std::fs::Metadata) -> String {
    if meta.permissions().readonly() {
        "readonly".to_string()
    } else {
        "readwrite".to_string()
    }
}

/// Sum of file sizes below `root`. Symlinks are not followed.
async fn directory_size(root: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                total += entry.metadata().await?.len();
            }
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn args(value: Value) -> Arguments {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_create_read_append() {
        let dir = TempDir::new().unwrap();
        let handler = FileHandler::with_base_dir(dir.path());

        let result = handler
            .execute("create_file", &args(json!({"path": "notes/a.txt", "content": "one"})))
            .await
            .unwrap();
        assert_eq!(result.message, "File created successfully at notes/a.txt");

        handler
            .execute("append_file", &args(json!({"path": "notes/a.txt", "content": "+two"})))
            .await
            .unwrap();

        let result = handler
            .execute("read_file", &args(json!({"path": "notes/a.txt"})))
            .await
            .unwrap();
        assert!(result.ok);
        assert_eq!(result.message, "one+two");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let handler = FileHandler::with_base_dir(dir.path());
        let err = handler
            .execute("read_file", &args(json!({"path": "missing.txt"})))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Error reading file missing.txt"));
    }

    #[tokio::test]
    async fn test_write_requires_content() {
        let dir = TempDir::new().unwrap();
        let handler = FileHandler::with_base_dir(dir.path());
        let err = handler
            .execute("write_file", &args(json!({"path": "a.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::MissingParameter("content")));
    }

    #[tokio::test]
    async fn test_list_and_size() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.bin"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("sub/b.bin"), vec![0u8; 5]).unwrap();
        let handler = FileHandler::with_base_dir(dir.path());

        let result = handler
            .execute("list_directory", &args(json!({"path": "."})))
            .await
            .unwrap();
        let entries = result.data.unwrap()["entries"].as_array().unwrap().clone();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["name"], "a.bin");
        assert_eq!(entries[1]["type"], "directory");

        let result = handler
            .execute("get_directory_size", &args(json!({"path": "."})))
            .await
            .unwrap();
        assert_eq!(result.message, "Directory size: 15 bytes");
    }

    #[tokio::test]
    async fn test_delete_file_and_directory() {
        let dir = TempDir::new().unwrap();
        let handler = FileHandler::with_base_dir(dir.path());
        handler
            .execute("create_directory", &args(json!({"path": "x/y"})))
            .await
            .unwrap();
        handler
            .execute("create_file", &args(json!({"path": "x/y/z.txt"})))
            .await
            .unwrap();

        let result = handler
            .execute("delete_file", &args(json!({"path": "x/y/z.txt"})))
            .await
            .unwrap();
        assert_eq!(result.message, "File deleted successfully: x/y/z.txt");

        let result = handler
            .execute("delete_directory", &args(json!({"path": "x"})))
            .await
            .unwrap();
        assert!(result.ok);
        assert!(!dir.path().join("x").exists());
    }

    #[tokio::test]
    async fn test_file_info() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "12345").unwrap();
        let handler = FileHandler::with_base_dir(dir.path());
        let result = handler
            .execute("get_file_info", &args(json!({"path": "f.txt"})))
            .await
            .unwrap();
        let data = result.data.unwrap();
        assert_eq!(data["size"], 5);
        assert_eq!(data["is_dir"], false);
    }
}
