//! Sizes and autosize bounds.

use serde::{Deserialize, Serialize};

/// Width and height in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True when either axis is zero (element not laid out).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Inclusive min/max bounds on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBounds {
    pub min: Size,
    pub max: Size,
}

impl SizeBounds {
    /// Build bounds, pulling each min down to its max so min <= max always holds.
    pub fn new(min: Size, max: Size) -> Self {
        Self {
            min: Size::new(min.width.min(max.width), min.height.min(max.height)),
            max,
        }
    }

    /// Whether `size` lies within the bounds on both axes.
    pub fn contains(&self, size: Size) -> bool {
        (self.min.width..=self.max.width).contains(&size.width)
            && (self.min.height..=self.max.height).contains(&size.height)
    }
}

/// Size update sent to the Guest View Service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normal: Option<Size>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_auto_size: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Size>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Size>,
}

impl SizeParams {
    /// Set the guest's normal (non-autosize) size.
    pub fn normal(size: Size) -> Self {
        Self {
            normal: Some(size),
            ..Self::default()
        }
    }

    /// Toggle autosize with the given bounds.
    pub fn autosize(enabled: bool, bounds: SizeBounds) -> Self {
        Self {
            normal: None,
            enable_auto_size: Some(enabled),
            min: Some(bounds.min),
            max: Some(bounds.max),
        }
    }
}
