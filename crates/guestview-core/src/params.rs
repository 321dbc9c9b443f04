//! Guest construction parameters.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::ViewInstanceId;

/// Current value of one host attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Boolean attribute (present = true).
    Flag(bool),
    /// Non-negative integer attribute (dimensions).
    Number(u32),
    /// Free-form string attribute.
    Text(String),
    /// Attribute not set on the host element.
    #[default]
    Unset,
}

impl AttributeValue {
    /// The text value, if this is a non-empty text attribute.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttributeValue::Text(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u32> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> bool {
        matches!(self, AttributeValue::Flag(true))
    }

    /// Render the value the way it would appear as a host attribute string.
    ///
    /// Returns `None` when the attribute should be absent.
    pub fn to_attribute_string(&self) -> Option<String> {
        match self {
            AttributeValue::Flag(true) => Some(String::new()),
            AttributeValue::Flag(false) | AttributeValue::Unset => None,
            AttributeValue::Number(n) => Some(n.to_string()),
            AttributeValue::Text(s) => Some(s.clone()),
        }
    }
}

/// Parameters sent to the Guest View Service on creation and attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestParams {
    /// View instance id of the owning host element.
    pub instance_id: ViewInstanceId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent_override: Option<String>,

    /// Every registered attribute's current value, keyed by attribute name.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Layout hint: rendered width, or computed style width when not laid out.
    pub element_width: u32,

    /// Layout hint: rendered height, or computed style height when not laid out.
    pub element_height: u32,
}

impl GuestParams {
    /// Look up one attribute value.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}
