//! xAPI paths and typed call helpers
//!
//! RoomOS exposes its configuration, status, command and event trees as
//! nested paths (`Status/SystemUnit/Uptime`, `Command/Macros/Macro/Get`).
//! [`XPath`] is the validated form of such a path; [`XapiExt`] adds
//! tree-specific helpers on top of any [`RpcClient`].

use crate::transport::RpcClient;
use crate::{Result, SessionError};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Top level of the xAPI tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XRoot {
    /// Persistent configuration (`xConfiguration`)
    Config,
    /// Read-only status (`xStatus`)
    Status,
    /// Commands (`xCommand`)
    Command,
    /// Events (`xEvent`)
    Event,
}

impl XRoot {
    /// Segment name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            XRoot::Config => "Config",
            XRoot::Status => "Status",
            XRoot::Command => "Command",
            XRoot::Event => "Event",
        }
    }

    fn from_segment(segment: &str) -> Option<Self> {
        match segment.to_ascii_lowercase().as_str() {
            "config" | "configuration" | "xconfig" | "xconfiguration" => Some(XRoot::Config),
            "status" | "xstatus" => Some(XRoot::Status),
            "command" | "xcommand" => Some(XRoot::Command),
            "event" | "xevent" => Some(XRoot::Event),
            _ => None,
        }
    }
}

impl fmt::Display for XRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated xAPI path
///
/// Accepts dotted, slashed or CLI-style input:
///
/// ```rust
/// use roomos_session::xapi::{XPath, XRoot};
///
/// let a: XPath = "Status.SystemUnit.Uptime".parse().unwrap();
/// let b: XPath = "Status/SystemUnit/Uptime".parse().unwrap();
/// let c: XPath = "xStatus SystemUnit Uptime".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b, c);
/// assert_eq!(a.root(), XRoot::Status);
/// assert_eq!(a.to_string(), "Status/SystemUnit/Uptime");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPath {
    root: XRoot,
    segments: Vec<String>,
}

impl XPath {
    /// Parse a full path, root included
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = split_segments(input);
        if parts.is_empty() {
            return Err(SessionError::InvalidPath("empty path".to_string()));
        }
        let first = parts.remove(0);
        let root = XRoot::from_segment(&first).ok_or_else(|| {
            SessionError::InvalidPath(format!(
                "'{}' must start with Config, Status, Command or Event",
                input
            ))
        })?;
        Self::build(root, parts, input)
    }

    /// Parse a path relative to `root`; a leading root segment is allowed if it matches
    ///
    /// ```rust
    /// use roomos_session::xapi::{XPath, XRoot};
    ///
    /// let path = XPath::with_root(XRoot::Config, "SystemUnit.Name").unwrap();
    /// assert_eq!(path.to_string(), "Config/SystemUnit/Name");
    /// assert!(XPath::with_root(XRoot::Config, "Status/SystemUnit").is_err());
    /// ```
    pub fn with_root(root: XRoot, input: &str) -> Result<Self> {
        let mut parts = split_segments(input);
        if let Some(first) = parts.first() {
            if let Some(given) = XRoot::from_segment(first) {
                if given != root {
                    return Err(SessionError::InvalidPath(format!(
                        "'{}' is not under {}",
                        input, root
                    )));
                }
                parts.remove(0);
            }
        }
        Self::build(root, parts, input)
    }

    /// Build a path from segments known to be valid (built-in paths)
    pub fn from_parts(root: XRoot, parts: &[&str]) -> Self {
        debug_assert!(!parts.is_empty() && parts.iter().all(|p| is_valid_segment(p)));
        Self {
            root,
            segments: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    fn build(root: XRoot, segments: Vec<String>, input: &str) -> Result<Self> {
        if segments.is_empty() {
            return Err(SessionError::InvalidPath(format!(
                "'{}' names only the {} root",
                input, root
            )));
        }
        if let Some(bad) = segments.iter().find(|s| !is_valid_segment(s)) {
            return Err(SessionError::InvalidPath(format!(
                "invalid segment '{}' in '{}'",
                bad, input
            )));
        }
        Ok(Self { root, segments })
    }

    /// Root of the tree this path lives in
    pub fn root(&self) -> XRoot {
        self.root
    }

    /// Segments below the root
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Full path as sent in `xGet`/`xSet` params (root first)
    pub fn to_wire(&self) -> Vec<String> {
        std::iter::once(self.root.as_str().to_string())
            .chain(self.segments.iter().cloned())
            .collect()
    }

    /// Append a segment
    pub fn child(&self, segment: &str) -> Result<Self> {
        if !is_valid_segment(segment) {
            return Err(SessionError::InvalidPath(format!(
                "invalid segment '{}'",
                segment
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Ok(Self {
            root: self.root,
            segments,
        })
    }

    /// JSON-RPC method name for invoking this path as a command
    ///
    /// ```rust
    /// use roomos_session::xapi::XPath;
    ///
    /// let cmd: XPath = "Command/Macros/Macro/Get".parse().unwrap();
    /// assert_eq!(cmd.command_method(), "xCommand/Macros/Macro/Get");
    /// ```
    pub fn command_method(&self) -> String {
        format!("xCommand/{}", self.segments.join("/"))
    }
}

impl fmt::Display for XPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.root, self.segments.join("/"))
    }
}

impl FromStr for XPath {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        XPath::parse(s)
    }
}

fn split_segments(input: &str) -> Vec<String> {
    input
        .split(|c: char| c == '.' || c == '/' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Render a leaf value the way the device's own CLI prints it
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Tree-specific helpers for any RPC client
#[async_trait]
pub trait XapiExt {
    /// Read a status leaf or subtree (`path` may omit the `Status` root)
    async fn status(&self, path: &str) -> Result<Value>;

    /// Read a configuration leaf or subtree
    async fn config(&self, path: &str) -> Result<Value>;

    /// Write a configuration leaf
    async fn set_config(&self, path: &str, value: Value) -> Result<()>;

    /// Invoke a command with named arguments
    async fn command(&self, path: &str, args: Value) -> Result<Value>;

    /// Read a leaf and render it as text
    async fn get_text(&self, path: &XPath) -> Result<String>;
}

#[async_trait]
impl<T> XapiExt for T
where
    T: RpcClient + ?Sized,
{
    async fn status(&self, path: &str) -> Result<Value> {
        let path = XPath::with_root(XRoot::Status, path)?;
        self.get(&path).await
    }

    async fn config(&self, path: &str) -> Result<Value> {
        let path = XPath::with_root(XRoot::Config, path)?;
        self.get(&path).await
    }

    async fn set_config(&self, path: &str, value: Value) -> Result<()> {
        let path = XPath::with_root(XRoot::Config, path)?;
        self.set(&path, value).await
    }

    async fn command(&self, path: &str, args: Value) -> Result<Value> {
        let path = XPath::with_root(XRoot::Command, path)?;
        self.invoke(&path, args).await
    }

    async fn get_text(&self, path: &XPath) -> Result<String> {
        let value = self.get(path).await?;
        Ok(value_to_text(&value))
    }
}
