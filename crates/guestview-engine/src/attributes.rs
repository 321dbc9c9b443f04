//! Attribute Registry.
//!
//! Turns host attribute mutations into internal state and into guest
//! construction parameters.
//!
//! ## Feedback loops
//!
//! Writing a host attribute makes the platform report a mutation back.
//! When the engine itself is the origin of a write (the guest navigated,
//! a rejected value is being restored) it uses
//! [`AttributeRegistry::set_value_ignore_mutation`], which arms a one-shot
//! flag on the descriptor. The next observed mutation of that attribute is
//! swallowed and the flag is cleared.
//!
//! The flag is a single slot, not a counter: two uncoordinated self-writes
//! to the same attribute would only suppress one echo.

use std::collections::BTreeMap;
use std::path::Path;

use guestview_core::{AttributeValue, EngineError, GuestParams, Size, ViewInstanceId};

use crate::service::HostElement;

/// Attribute names.
pub mod names {
    pub const SRC: &str = "src";
    pub const PARTITION: &str = "partition";
    pub const AUTOSIZE: &str = "autosize";
    pub const MIN_WIDTH: &str = "minwidth";
    pub const MAX_WIDTH: &str = "maxwidth";
    pub const MIN_HEIGHT: &str = "minheight";
    pub const MAX_HEIGHT: &str = "maxheight";
    pub const HTTP_REFERRER: &str = "httpreferrer";
    pub const USER_AGENT: &str = "useragent";
    pub const PRELOAD: &str = "preload";
    pub const NODE_INTEGRATION: &str = "nodeintegration";
    pub const PLUGINS: &str = "plugins";
    pub const DISABLE_WEB_SECURITY: &str = "disablewebsecurity";
    pub const ALLOW_POPUPS: &str = "allowpopups";
    pub const BLINK_FEATURES: &str = "blinkfeatures";

    /// Attribute on the plugin attachment element carrying its id.
    pub const INTERNAL_INSTANCE_ID: &str = "internalinstanceid";
}

/// Partition value that cannot name a storage partition.
const INVALID_PARTITION: &str = "persist:";

// =============================================================================
// Descriptor
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttributeKind {
    Src,
    Partition,
    Autosize,
    Dimension,
    UserAgent,
    Preload,
    Flag,
    Text,
}

/// State the mutation handlers need from the owning instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationContext {
    pub before_first_navigation: bool,
}

/// What the instance must do after a handled mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeEffect {
    None,
    /// `src` changed: navigate or request the guest.
    Navigate,
    /// Autosize toggle or a bound changed.
    AutosizeChanged,
    UserAgentChanged(Option<String>),
}

/// One registered attribute.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    name: &'static str,
    kind: AttributeKind,
    value: AttributeValue,
    ignore_mutation: bool,
}

impl AttributeDescriptor {
    fn new(name: &'static str, kind: AttributeKind) -> Self {
        let value = match kind {
            AttributeKind::Autosize | AttributeKind::Flag => AttributeValue::Flag(false),
            _ => AttributeValue::Unset,
        };
        Self {
            name,
            kind,
            value,
            ignore_mutation: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current value.
    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    /// Whether the next observed mutation will be swallowed.
    pub fn ignores_next_mutation(&self) -> bool {
        self.ignore_mutation
    }

    /// Convert a raw host attribute string into a value.
    fn validate(&self, raw: Option<&str>) -> Result<AttributeValue, EngineError> {
        let invalid = |value: &str, reason: &str| EngineError::InvalidAttribute {
            name: self.name.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self.kind {
            AttributeKind::Autosize | AttributeKind::Flag => Ok(AttributeValue::Flag(raw.is_some())),
            AttributeKind::Dimension => match raw.map(str::trim) {
                None | Some("") => Ok(AttributeValue::Unset),
                Some(s) => s
                    .strip_suffix("px")
                    .unwrap_or(s)
                    .trim()
                    .parse::<u32>()
                    .map(AttributeValue::Number)
                    .map_err(|_| invalid(s, "expected a non-negative integer")),
            },
            AttributeKind::Partition => match raw {
                None | Some("") => Ok(AttributeValue::Unset),
                Some(INVALID_PARTITION) => Err(invalid(INVALID_PARTITION, "invalid partition")),
                Some(s) => Ok(AttributeValue::Text(s.to_string())),
            },
            AttributeKind::Preload => match raw {
                None | Some("") => Ok(AttributeValue::Unset),
                Some(s) if s.starts_with("file:") || Path::new(s).is_absolute() => {
                    Ok(AttributeValue::Text(s.to_string()))
                }
                Some(s) => Err(invalid(s, "only file: URLs and absolute paths are supported")),
            },
            AttributeKind::Src | AttributeKind::UserAgent | AttributeKind::Text => match raw {
                None | Some("") => Ok(AttributeValue::Unset),
                Some(s) => Ok(AttributeValue::Text(s.to_string())),
            },
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Per-instance attribute descriptors.
#[derive(Debug, Clone)]
pub struct AttributeRegistry {
    attributes: BTreeMap<&'static str, AttributeDescriptor>,
    partition_valid: bool,
}

impl AttributeRegistry {
    /// Create a registry with the standard attribute set.
    pub fn new() -> Self {
        use names::*;

        let descriptors = [
            (SRC, AttributeKind::Src),
            (PARTITION, AttributeKind::Partition),
            (AUTOSIZE, AttributeKind::Autosize),
            (MIN_WIDTH, AttributeKind::Dimension),
            (MAX_WIDTH, AttributeKind::Dimension),
            (MIN_HEIGHT, AttributeKind::Dimension),
            (MAX_HEIGHT, AttributeKind::Dimension),
            (HTTP_REFERRER, AttributeKind::Text),
            (USER_AGENT, AttributeKind::UserAgent),
            (PRELOAD, AttributeKind::Preload),
            (NODE_INTEGRATION, AttributeKind::Flag),
            (PLUGINS, AttributeKind::Flag),
            (DISABLE_WEB_SECURITY, AttributeKind::Flag),
            (ALLOW_POPUPS, AttributeKind::Flag),
            (BLINK_FEATURES, AttributeKind::Text),
        ];

        Self {
            attributes: descriptors
                .into_iter()
                .map(|(name, kind)| (name, AttributeDescriptor::new(name, kind)))
                .collect(),
            partition_valid: true,
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.get(name)
    }

    /// Registered attribute names, in order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes.keys().copied()
    }

    /// Non-empty text value of an attribute.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|a| a.value.as_text())
    }

    /// Dimension value of an attribute, if set.
    pub fn dimension(&self, name: &str) -> Option<u32> {
        self.get(name).and_then(|a| a.value.as_number())
    }

    /// Boolean value of an attribute (false when unknown).
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.value.as_flag())
    }

    /// Whether the partition allows guest creation.
    pub fn partition_valid(&self) -> bool {
        self.partition_valid
    }

    /// Clear the invalid-partition mark after a reset. The host value is
    /// checked again by the next [`parse_all`](Self::parse_all) or mutation.
    pub fn revalidate_partition(&mut self) {
        self.partition_valid = true;
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Handle a mutation observed on the host element.
    ///
    /// No-op for unknown attributes and for a mutation the descriptor was told
    /// to ignore (the flag is consumed). Invalid values are rejected and the
    /// descriptor keeps its previous value.
    pub fn handle_mutation(
        &mut self,
        name: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        ctx: MutationContext,
        host: &mut dyn HostElement,
    ) -> Result<AttributeEffect, EngineError> {
        let Some(attr) = self.attributes.get_mut(name) else {
            return Ok(AttributeEffect::None);
        };

        if attr.ignore_mutation {
            attr.ignore_mutation = false;
            tracing::debug!(attribute = name, "Suppressed self-caused mutation");
            return Ok(AttributeEffect::None);
        }

        match attr.kind {
            AttributeKind::Src => {
                let cleared = new_value.map_or(true, str::is_empty);
                if let (true, Some(old)) = (cleared, old_value.filter(|o| !o.is_empty())) {
                    // src cannot be removed once set; put the old value back.
                    let old = AttributeValue::Text(old.to_string());
                    self.set_value_ignore_mutation(name, old, host);
                    return Ok(AttributeEffect::None);
                }
                attr.value = attr.validate(new_value)?;
                Ok(AttributeEffect::Navigate)
            }
            AttributeKind::Partition => {
                if !ctx.before_first_navigation {
                    let old = old_value.map_or(AttributeValue::Unset, |o| {
                        AttributeValue::Text(o.to_string())
                    });
                    let value = new_value.unwrap_or_default().to_string();
                    self.set_value_ignore_mutation(name, old, host);
                    return Err(EngineError::InvalidAttribute {
                        name: name.to_string(),
                        value,
                        reason: "already navigated, so the partition cannot be changed"
                            .to_string(),
                    });
                }
                match attr.validate(new_value) {
                    Ok(value) => {
                        attr.value = value;
                        self.partition_valid = true;
                        Ok(AttributeEffect::None)
                    }
                    Err(e) => {
                        self.partition_valid = false;
                        Err(e)
                    }
                }
            }
            AttributeKind::Autosize | AttributeKind::Dimension => {
                attr.value = attr.validate(new_value)?;
                Ok(AttributeEffect::AutosizeChanged)
            }
            AttributeKind::UserAgent => {
                attr.value = attr.validate(new_value)?;
                Ok(AttributeEffect::UserAgentChanged(
                    attr.value.as_text().map(str::to_string),
                ))
            }
            AttributeKind::Preload | AttributeKind::Flag | AttributeKind::Text => {
                attr.value = attr.validate(new_value)?;
                Ok(AttributeEffect::None)
            }
        }
    }

    /// Write a value and the host attribute.
    ///
    /// The platform echoes the write as a mutation, which then runs the
    /// attribute's handler like any other change.
    pub fn set_value(&mut self, name: &str, value: AttributeValue, host: &mut dyn HostElement) {
        let Some(attr) = self.attributes.get_mut(name) else {
            tracing::warn!(attribute = name, "set_value on unknown attribute");
            return;
        };
        let raw = value.to_attribute_string();
        attr.value = value;
        host.set_attribute(name, raw);
    }

    /// Write a value and the host attribute, swallowing the echoed mutation.
    pub fn set_value_ignore_mutation(
        &mut self,
        name: &str,
        value: AttributeValue,
        host: &mut dyn HostElement,
    ) {
        let Some(attr) = self.attributes.get_mut(name) else {
            tracing::warn!(attribute = name, "set_value_ignore_mutation on unknown attribute");
            return;
        };
        attr.ignore_mutation = true;
        let raw = value.to_attribute_string();
        attr.value = value;
        host.set_attribute(name, raw);
    }

    /// Re-read every attribute from the host element.
    ///
    /// Invalid values keep the previous value and are returned as errors.
    pub fn parse_all(&mut self, host: &dyn HostElement) -> Vec<EngineError> {
        let mut errors = Vec::new();
        for attr in self.attributes.values_mut() {
            let raw = host.attribute(attr.name);
            match attr.validate(raw.as_deref()) {
                Ok(value) => {
                    if attr.kind == AttributeKind::Partition {
                        self.partition_valid = true;
                    }
                    attr.value = value;
                }
                Err(e) => {
                    if attr.kind == AttributeKind::Partition {
                        self.partition_valid = false;
                    }
                    errors.push(e);
                }
            }
        }
        errors
    }

    // =========================================================================
    // Params
    // =========================================================================

    /// Build the parameter set sent on guest creation and attachment.
    pub fn build_params(
        &self,
        view_instance_id: ViewInstanceId,
        user_agent_override: Option<&str>,
        host: &dyn HostElement,
    ) -> GuestParams {
        let element = element_size_hint(host);
        GuestParams {
            instance_id: view_instance_id,
            user_agent_override: user_agent_override.map(str::to_string),
            attributes: self
                .attributes
                .values()
                .map(|a| (a.name.to_string(), a.value.clone()))
                .collect(),
            element_width: element.width,
            element_height: element.height,
        }
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Rendered size per axis, falling back to the computed style when the
/// element reports zero (not laid out but explicitly sized).
fn element_size_hint(host: &dyn HostElement) -> Size {
    let rendered = host.rendered_size();
    let styled = host.computed_style_size();
    let pick = |r: u32, s: u32| if r != 0 { r } else { s };
    Size::new(
        pick(rendered.width, styled.width),
        pick(rendered.height, styled.height),
    )
}

#[cfg(test)]
mod tests {
    use super::names::*;
    use super::*;
    use crate::test_support::FakeHost;

    const FRESH: MutationContext = MutationContext {
        before_first_navigation: true,
    };
    const NAVIGATED: MutationContext = MutationContext {
        before_first_navigation: false,
    };

    #[test]
    fn test_unknown_attribute_is_noop() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        let effect = attrs
            .handle_mutation("style", None, Some("x"), FRESH, &mut host)
            .unwrap();
        assert_eq!(effect, AttributeEffect::None);
    }

    #[test]
    fn test_src_mutation_navigates() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        let effect = attrs
            .handle_mutation(SRC, None, Some("https://a.test/"), FRESH, &mut host)
            .unwrap();
        assert_eq!(effect, AttributeEffect::Navigate);
        assert_eq!(attrs.text(SRC), Some("https://a.test/"));
    }

    #[test]
    fn test_ignore_mutation_is_single_shot() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();

        attrs.set_value_ignore_mutation(SRC, AttributeValue::Text("https://b.test/".into()), &mut host);
        assert_eq!(host.attribute(SRC).as_deref(), Some("https://b.test/"));
        assert!(attrs.get(SRC).unwrap().ignores_next_mutation());

        // Echo of our own write: swallowed.
        let effect = attrs
            .handle_mutation(SRC, None, Some("https://b.test/"), FRESH, &mut host)
            .unwrap();
        assert_eq!(effect, AttributeEffect::None);
        assert!(!attrs.get(SRC).unwrap().ignores_next_mutation());

        // Next external mutation runs the handler.
        let effect = attrs
            .handle_mutation(SRC, Some("https://b.test/"), Some("https://c.test/"), FRESH, &mut host)
            .unwrap();
        assert_eq!(effect, AttributeEffect::Navigate);
        assert_eq!(attrs.text(SRC), Some("https://c.test/"));
    }

    #[test]
    fn test_clearing_src_restores_old_value() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        attrs
            .handle_mutation(SRC, None, Some("https://a.test/"), FRESH, &mut host)
            .unwrap();

        let effect = attrs
            .handle_mutation(SRC, Some("https://a.test/"), None, FRESH, &mut host)
            .unwrap();
        assert_eq!(effect, AttributeEffect::None);
        assert_eq!(attrs.text(SRC), Some("https://a.test/"));
        assert_eq!(host.attribute(SRC).as_deref(), Some("https://a.test/"));
        assert!(attrs.get(SRC).unwrap().ignores_next_mutation());
    }

    #[test]
    fn test_invalid_dimension_keeps_last_good_value() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        attrs
            .handle_mutation(MIN_WIDTH, None, Some("120px"), FRESH, &mut host)
            .unwrap();
        assert_eq!(attrs.dimension(MIN_WIDTH), Some(120));

        let err = attrs
            .handle_mutation(MIN_WIDTH, Some("120px"), Some("wide"), FRESH, &mut host)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAttribute { ref name, .. } if name == MIN_WIDTH));
        assert_eq!(attrs.dimension(MIN_WIDTH), Some(120));
    }

    #[test]
    fn test_partition_locked_after_navigation() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        attrs
            .handle_mutation(PARTITION, None, Some("persist:a"), FRESH, &mut host)
            .unwrap();

        let err = attrs
            .handle_mutation(PARTITION, Some("persist:a"), Some("persist:b"), NAVIGATED, &mut host)
            .unwrap_err();
        assert!(err.is_local());
        assert_eq!(attrs.text(PARTITION), Some("persist:a"));
        assert_eq!(host.attribute(PARTITION).as_deref(), Some("persist:a"));
        assert!(attrs.get(PARTITION).unwrap().ignores_next_mutation());
    }

    #[test]
    fn test_invalid_partition_blocks_until_revalidated() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();

        assert!(attrs
            .handle_mutation(PARTITION, None, Some("persist:"), FRESH, &mut host)
            .is_err());
        assert!(!attrs.partition_valid());
        assert_eq!(attrs.text(PARTITION), None);

        attrs.revalidate_partition();
        assert!(attrs.partition_valid());
    }

    #[test]
    fn test_parse_all_tracks_partition_validity() {
        let mut attrs = AttributeRegistry::new();

        let host = FakeHost::new().with_attribute(PARTITION, "persist:");
        assert_eq!(attrs.parse_all(&host).len(), 1);
        assert!(!attrs.partition_valid());

        let host = FakeHost::new().with_attribute(PARTITION, "persist:b");
        assert!(attrs.parse_all(&host).is_empty());
        assert!(attrs.partition_valid());
        assert_eq!(attrs.text(PARTITION), Some("persist:b"));
    }

    #[test]
    fn test_preload_validation() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        attrs
            .handle_mutation(PRELOAD, None, Some("file:///app/preload.js"), FRESH, &mut host)
            .unwrap();
        assert!(attrs
            .handle_mutation(PRELOAD, None, Some("https://evil.test/p.js"), FRESH, &mut host)
            .is_err());
        assert_eq!(attrs.text(PRELOAD), Some("file:///app/preload.js"));
    }

    #[test]
    fn test_bound_and_autosize_effects() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        assert_eq!(
            attrs.handle_mutation(AUTOSIZE, None, Some(""), FRESH, &mut host).unwrap(),
            AttributeEffect::AutosizeChanged
        );
        assert!(attrs.flag(AUTOSIZE));
        assert_eq!(
            attrs.handle_mutation(MAX_HEIGHT, None, Some("300"), FRESH, &mut host).unwrap(),
            AttributeEffect::AutosizeChanged
        );
        assert_eq!(
            attrs
                .handle_mutation(USER_AGENT, None, Some("Agent/2"), FRESH, &mut host)
                .unwrap(),
            AttributeEffect::UserAgentChanged(Some("Agent/2".to_string()))
        );
    }

    #[test]
    fn test_set_value_writes_host_without_suppression() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new();
        attrs.set_value(AUTOSIZE, AttributeValue::Flag(true), &mut host);
        assert_eq!(host.attribute(AUTOSIZE).as_deref(), Some(""));
        assert!(!attrs.get(AUTOSIZE).unwrap().ignores_next_mutation());
    }

    #[test]
    fn test_parse_all_reads_host() {
        let mut attrs = AttributeRegistry::new();
        let host = FakeHost::new()
            .with_attribute(SRC, "https://a.test/")
            .with_attribute(NODE_INTEGRATION, "")
            .with_attribute(MAX_WIDTH, "bogus");

        let errors = attrs.parse_all(&host);
        assert_eq!(errors.len(), 1);
        assert_eq!(attrs.text(SRC), Some("https://a.test/"));
        assert!(attrs.flag(NODE_INTEGRATION));
        assert_eq!(attrs.dimension(MAX_WIDTH), None);
    }

    #[test]
    fn test_build_params() {
        let mut attrs = AttributeRegistry::new();
        let mut host = FakeHost::new().with_rendered(Size::new(400, 300));
        attrs
            .handle_mutation(SRC, None, Some("https://a.test/"), FRESH, &mut host)
            .unwrap();

        let params = attrs.build_params(ViewInstanceId::new(5), Some("UA/1"), &host);
        assert_eq!(params.instance_id, ViewInstanceId::new(5));
        assert_eq!(params.user_agent_override.as_deref(), Some("UA/1"));
        assert_eq!(params.attributes.len(), attrs.names().count());
        assert_eq!(
            params.attribute(SRC),
            Some(&AttributeValue::Text("https://a.test/".into()))
        );
        assert_eq!(params.attribute(AUTOSIZE), Some(&AttributeValue::Flag(false)));
        assert_eq!((params.element_width, params.element_height), (400, 300));
    }

    #[test]
    fn test_build_params_falls_back_to_computed_style() {
        let attrs = AttributeRegistry::new();
        let host = FakeHost::new()
            .with_rendered(Size::new(0, 0))
            .with_computed_style(Size::new(640, 480));
        let params = attrs.build_params(ViewInstanceId::new(1), None, &host);
        assert_eq!((params.element_width, params.element_height), (640, 480));
    }
}
