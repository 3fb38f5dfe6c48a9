use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Server-assigned changelist number, kept opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChangelistId(String);

impl ChangelistId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The workspace's default changelist.
    pub fn default_changelist() -> Self {
        Self("default".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == "default"
    }
}

impl fmt::Display for ChangelistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChangelistId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Action recorded for a file, either at head or in a pending changelist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileAction {
    Add,
    Edit,
    Delete,
    /// Any other server action (`move/add`, `integrate`, `branch`...).
    Other(String),
}

impl FileAction {
    pub fn as_str(&self) -> &str {
        match self {
            FileAction::Add => "add",
            FileAction::Edit => "edit",
            FileAction::Delete => "delete",
            FileAction::Other(action) => action,
        }
    }
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileAction {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "add" => FileAction::Add,
            "edit" => FileAction::Edit,
            "delete" => FileAction::Delete,
            other => FileAction::Other(other.to_string()),
        })
    }
}

/// Server view of one local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    /// Local path in the workspace.
    pub path: PathBuf,
    /// Last submitted action, `None` if the file was never submitted.
    pub head_action: Option<FileAction>,
    /// Pending action in this workspace, `None` if the file is not opened.
    pub action: Option<FileAction>,
}

impl FileStatus {
    pub fn is_opened_for(&self, action: &FileAction) -> bool {
        self.action.as_ref() == Some(action)
    }

    pub fn is_deleted_at_head(&self) -> bool {
        self.head_action == Some(FileAction::Delete)
    }
}
