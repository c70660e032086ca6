//! Minimal JSON:API single-resource documents.

use serde::{Deserialize, Serialize};

/// Media type for JSON:API payloads.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// A type that can be rendered as JSON:API resource attributes.
pub trait Resource: Serialize {
    /// The JSON:API `type` member.
    const TYPE: &'static str;

    /// The JSON:API `id` member, if the resource has one.
    fn id(&self) -> Option<String> {
        None
    }
}

/// Top-level document carrying one resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<A> {
    pub data: ResourceObject<A>,
}

/// A resource object: type, optional id, and attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject<A> {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub attributes: A,
}

impl<A: Resource> Document<A> {
    /// Wrap `resource` in a document.
    pub fn new(resource: A) -> Self {
        Self {
            data: ResourceObject {
                kind: A::TYPE.to_string(),
                id: resource.id(),
                attributes: resource,
            },
        }
    }

    /// Encode the document.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
