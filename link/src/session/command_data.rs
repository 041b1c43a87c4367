use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::fmt;

use crate::error::{RavenLinkError, Result};

/// Kind of a deferred command, as named in the batch wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "PATCH")]
    Patch,
    #[serde(rename = "DELETE")]
    Delete,
    #[serde(rename = "AttachmentPUT")]
    AttachmentPut,
    #[serde(rename = "AttachmentDELETE")]
    AttachmentDelete,
    #[serde(rename = "AttachmentMOVE")]
    AttachmentMove,
    #[serde(rename = "AttachmentCOPY")]
    AttachmentCopy,
    #[serde(rename = "ForceRevisionCreation")]
    ForceRevisionCreation,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::AttachmentPut => "AttachmentPUT",
            Self::AttachmentDelete => "AttachmentDELETE",
            Self::AttachmentMove => "AttachmentMOVE",
            Self::AttachmentCopy => "AttachmentCOPY",
            Self::ForceRevisionCreation => "ForceRevisionCreation",
        }
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite ledger key: document id, command type and optional sub-name.
///
/// Document ids are case-insensitive, so the id is stored lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdTypeAndName {
    pub id: String,
    pub command_type: CommandType,
    pub name: Option<String>,
}

impl IdTypeAndName {
    pub fn create(id: &str, command_type: CommandType, name: Option<&str>) -> Self {
        Self {
            id: id.to_lowercase(),
            command_type,
            name: name.map(str::to_string),
        }
    }
}

impl fmt::Display for IdTypeAndName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} '{}' on '{}'", self.command_type, name, self.id),
            None => write!(f, "{} on '{}'", self.command_type, self.id),
        }
    }
}

/// Server-side patch script with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PatchRequest {
    pub script: String,
    #[serde(default)]
    pub values: Map<String, JsonValue>,
}

impl PatchRequest {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            values: Map::new(),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// A pending mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandData {
    Put {
        id: String,
        change_vector: Option<String>,
        document: JsonValue,
    },
    Patch {
        id: String,
        change_vector: Option<String>,
        patch: PatchRequest,
        patch_if_missing: Option<PatchRequest>,
    },
    Delete {
        id: String,
        change_vector: Option<String>,
    },
    AttachmentPut {
        id: String,
        name: String,
        content_type: Option<String>,
        change_vector: Option<String>,
    },
    AttachmentDelete {
        id: String,
        name: String,
        change_vector: Option<String>,
    },
    AttachmentMove {
        id: String,
        name: String,
        destination_id: String,
        destination_name: String,
        change_vector: Option<String>,
    },
    AttachmentCopy {
        id: String,
        name: String,
        destination_id: String,
        destination_name: String,
        change_vector: Option<String>,
    },
    ForceRevisionCreation {
        id: String,
    },
}

fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RavenLinkError::InvalidArgument(format!("{} cannot be empty", what)));
    }
    Ok(())
}

impl CommandData {
    pub fn put(id: impl Into<String>, document: JsonValue, change_vector: Option<String>) -> Result<Self> {
        let id = id.into();
        require(&id, "document id")?;
        if !document.is_object() {
            return Err(RavenLinkError::InvalidArgument(format!(
                "document '{}' must be a JSON object",
                id
            )));
        }
        Ok(Self::Put {
            id,
            change_vector,
            document,
        })
    }

    pub fn patch(id: impl Into<String>, patch: PatchRequest, change_vector: Option<String>) -> Result<Self> {
        let id = id.into();
        require(&id, "document id")?;
        require(&patch.script, "patch script")?;
        Ok(Self::Patch {
            id,
            change_vector,
            patch,
            patch_if_missing: None,
        })
    }

    pub fn delete(id: impl Into<String>, change_vector: Option<String>) -> Result<Self> {
        let id = id.into();
        require(&id, "document id")?;
        Ok(Self::Delete { id, change_vector })
    }

    pub fn attachment_put(
        id: impl Into<String>,
        name: impl Into<String>,
        content_type: Option<String>,
        change_vector: Option<String>,
    ) -> Result<Self> {
        let (id, name) = (id.into(), name.into());
        require(&id, "document id")?;
        require(&name, "attachment name")?;
        Ok(Self::AttachmentPut {
            id,
            name,
            content_type,
            change_vector,
        })
    }

    pub fn attachment_delete(
        id: impl Into<String>,
        name: impl Into<String>,
        change_vector: Option<String>,
    ) -> Result<Self> {
        let (id, name) = (id.into(), name.into());
        require(&id, "document id")?;
        require(&name, "attachment name")?;
        Ok(Self::AttachmentDelete {
            id,
            name,
            change_vector,
        })
    }

    pub fn attachment_move(
        id: impl Into<String>,
        name: impl Into<String>,
        destination_id: impl Into<String>,
        destination_name: impl Into<String>,
    ) -> Result<Self> {
        let (id, name) = (id.into(), name.into());
        let (destination_id, destination_name) = (destination_id.into(), destination_name.into());
        require(&id, "source document id")?;
        require(&name, "source attachment name")?;
        require(&destination_id, "destination document id")?;
        require(&destination_name, "destination attachment name")?;
        Ok(Self::AttachmentMove {
            id,
            name,
            destination_id,
            destination_name,
            change_vector: None,
        })
    }

    pub fn attachment_copy(
        id: impl Into<String>,
        name: impl Into<String>,
        destination_id: impl Into<String>,
        destination_name: impl Into<String>,
    ) -> Result<Self> {
        let (id, name) = (id.into(), name.into());
        let (destination_id, destination_name) = (destination_id.into(), destination_name.into());
        require(&id, "source document id")?;
        require(&name, "source attachment name")?;
        require(&destination_id, "destination document id")?;
        require(&destination_name, "destination attachment name")?;
        Ok(Self::AttachmentCopy {
            id,
            name,
            destination_id,
            destination_name,
            change_vector: None,
        })
    }

    pub fn force_revision_creation(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        require(&id, "document id")?;
        Ok(Self::ForceRevisionCreation { id })
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            Self::Put { .. } => CommandType::Put,
            Self::Patch { .. } => CommandType::Patch,
            Self::Delete { .. } => CommandType::Delete,
            Self::AttachmentPut { .. } => CommandType::AttachmentPut,
            Self::AttachmentDelete { .. } => CommandType::AttachmentDelete,
            Self::AttachmentMove { .. } => CommandType::AttachmentMove,
            Self::AttachmentCopy { .. } => CommandType::AttachmentCopy,
            Self::ForceRevisionCreation { .. } => CommandType::ForceRevisionCreation,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Put { id, .. }
            | Self::Patch { id, .. }
            | Self::Delete { id, .. }
            | Self::AttachmentPut { id, .. }
            | Self::AttachmentDelete { id, .. }
            | Self::AttachmentMove { id, .. }
            | Self::AttachmentCopy { id, .. }
            | Self::ForceRevisionCreation { id } => id,
        }
    }

    /// Attachment name for attachment commands.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::AttachmentPut { name, .. }
            | Self::AttachmentDelete { name, .. }
            | Self::AttachmentMove { name, .. }
            | Self::AttachmentCopy { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn change_vector(&self) -> Option<&str> {
        match self {
            Self::Put { change_vector, .. }
            | Self::Patch { change_vector, .. }
            | Self::Delete { change_vector, .. }
            | Self::AttachmentPut { change_vector, .. }
            | Self::AttachmentDelete { change_vector, .. }
            | Self::AttachmentMove { change_vector, .. }
            | Self::AttachmentCopy { change_vector, .. } => change_vector.as_deref(),
            Self::ForceRevisionCreation { .. } => None,
        }
    }

    pub fn key(&self) -> IdTypeAndName {
        IdTypeAndName::create(self.id(), self.command_type(), self.name())
    }

    /// Batch wire shape: `{Id, ChangeVector, Type, ...}`.
    pub fn serialize(&self) -> JsonValue {
        let mut obj = Map::new();
        obj.insert("Id".into(), json!(self.id()));
        obj.insert("ChangeVector".into(), json!(self.change_vector()));
        obj.insert("Type".into(), json!(self.command_type().as_str()));
        match self {
            Self::Put { document, .. } => {
                obj.insert("Document".into(), document.clone());
            },
            Self::Patch {
                patch,
                patch_if_missing,
                ..
            } => {
                obj.insert("Patch".into(), json!(patch));
                if let Some(missing) = patch_if_missing {
                    obj.insert("PatchIfMissing".into(), json!(missing));
                }
            },
            Self::AttachmentPut {
                name, content_type, ..
            } => {
                obj.insert("Name".into(), json!(name));
                obj.insert("ContentType".into(), json!(content_type));
            },
            Self::AttachmentDelete { name, .. } => {
                obj.insert("Name".into(), json!(name));
            },
            Self::AttachmentMove {
                name,
                destination_id,
                destination_name,
                ..
            }
            | Self::AttachmentCopy {
                name,
                destination_id,
                destination_name,
                ..
            } => {
                obj.insert("Name".into(), json!(name));
                obj.insert("DestinationId".into(), json!(destination_id));
                obj.insert("DestinationName".into(), json!(destination_name));
            },
            Self::Delete { .. } | Self::ForceRevisionCreation { .. } => {},
        }
        JsonValue::Object(obj)
    }
}
