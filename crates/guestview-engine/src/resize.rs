//! Resize Coordinator.
//!
//! Two inputs:
//! - host layout resize: proposed size is checked against the autosize
//!   bounds before it is committed
//! - guest intrinsic size change: always forwarded, never clamped
//!
//! Each bound defaults to the element's current rendered size on its own
//! axis when the attribute is unset.

use guestview_core::{Size, SizeBounds, SizeParams};

use crate::attributes::{names, AttributeRegistry};

/// Outcome of a host layout resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    /// Commit the proposed size and notify listeners.
    Commit(Size),
    /// Leave the element alone; no notification.
    Reject { proposed: Size, bounds: SizeBounds },
}

/// Autosize bounds, falling back to `current` for unset attributes.
pub fn autosize_bounds(attrs: &AttributeRegistry, current: Size) -> SizeBounds {
    let bound = |name: &str, fallback: u32| attrs.dimension(name).unwrap_or(fallback);
    SizeBounds::new(
        Size::new(
            bound(names::MIN_WIDTH, current.width),
            bound(names::MIN_HEIGHT, current.height),
        ),
        Size::new(
            bound(names::MAX_WIDTH, current.width),
            bound(names::MAX_HEIGHT, current.height),
        ),
    )
}

/// Decide whether a host layout resize may be committed.
pub fn evaluate_layout_resize(
    attrs: &AttributeRegistry,
    current: Size,
    proposed: Size,
) -> ResizeDecision {
    let bounds = autosize_bounds(attrs, current);
    if !attrs.flag(names::AUTOSIZE) || bounds.contains(proposed) {
        ResizeDecision::Commit(proposed)
    } else {
        ResizeDecision::Reject { proposed, bounds }
    }
}

/// Size update forwarding the autosize attributes to the guest.
pub fn autosize_params(attrs: &AttributeRegistry, current: Size) -> SizeParams {
    SizeParams::autosize(attrs.flag(names::AUTOSIZE), autosize_bounds(attrs, current))
}
