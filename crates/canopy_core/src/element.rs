//! # Elements
//!
//! Immutable descriptors of what a component wants on screen. Components
//! return `Vec<Element>`; the reconciler diffs them against the fiber tree.
//!
//! ```rust,ignore
//! let row = Element::host("row", HostProps::new().with("id", 7), vec![
//!     Element::text("hello"),
//!     Element::component(&counter, CounterProps { start: 1 }).with_key("c"),
//! ]);
//! ```

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::RenderError;
use crate::hooks::Hooks;
use crate::suspend::{Render, ResumeToken};

/// Reconciliation key of an element among its siblings.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key(Arc<str>);

impl Key {
    /// Returns the key text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self(Arc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

impl From<u64> for Key {
    fn from(value: u64) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Self(Arc::from(value.to_string()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

/// A host attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Text value.
    Str(Arc<str>),
    /// Integer value.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Boolean value.
    Bool(bool),
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(s) => f.write_str(s),
            PropValue::Int(i) => write!(f, "{i}"),
            PropValue::Float(x) => write!(f, "{x}"),
            PropValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Arc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Arc::from(value))
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

/// Ordered attribute map of a host node. Compared by value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostProps {
    attrs: BTreeMap<String, PropValue>,
}

impl HostProps {
    /// Attribute name used for the content of text nodes.
    pub const TEXT: &'static str = "text";

    /// Creates an empty attribute map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute map of a text node.
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self::new().with(Self::TEXT, content)
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.to_owned(), value.into());
        self
    }

    /// Inserts or replaces an attribute.
    pub fn set(&mut self, name: &str, value: impl Into<PropValue>) {
        self.attrs.insert(name.to_owned(), value.into());
    }

    /// Reads an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attrs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    /// Returns true if there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

/// Kind of host node to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostType {
    /// Element node with a tag.
    Element(Arc<str>),
    /// Text node.
    Text,
}

/// Type-erased, reference-counted component props.
///
/// Props are compared by identity: two `Props` are the same only if they
/// share one allocation.
#[derive(Clone)]
pub struct Props(Arc<dyn Any + Send + Sync>);

impl Props {
    /// Wraps a value.
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Wraps an existing allocation without copying it.
    pub fn from_arc<T: Send + Sync + 'static>(value: Arc<T>) -> Self {
        Self(value)
    }

    /// Shared empty props. Every call returns the same allocation.
    #[must_use]
    pub fn none() -> Self {
        static NONE: OnceLock<Props> = OnceLock::new();
        NONE.get_or_init(|| Props::new(())).clone()
    }

    /// Reads the props as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::PropsMismatch`] if the props hold another type.
    pub fn downcast<T: 'static>(&self) -> Result<&T, RenderError> {
        self.0
            .downcast_ref::<T>()
            .ok_or_else(|| RenderError::PropsMismatch {
                component: String::new(),
                expected: type_name::<T>(),
            })
    }

    /// Identity comparison.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Props) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.0).cast::<()>(),
            Arc::as_ptr(&other.0).cast::<()>(),
        )
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Props({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// Capability flags of a component.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// Catches render errors thrown below it.
    pub const ERROR_BOUNDARY: Self = Self(1 << 0);
    /// Catches suspensions raised below it.
    pub const SUSPENSE_BOUNDARY: Self = Self(1 << 1);

    /// Returns true if every flag of `other` is set.
    #[inline]
    #[must_use]
    pub const fn has(self, other: Capabilities) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    /// Returns true if any boundary flag is set.
    #[inline]
    #[must_use]
    pub const fn is_boundary(self) -> bool {
        self.0 != 0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.has(Self::ERROR_BOUNDARY) {
            set.entry(&"error_boundary");
        }
        if self.has(Self::SUSPENSE_BOUNDARY) {
            set.entry(&"suspense_boundary");
        }
        set.finish()
    }
}

/// What a boundary caught.
#[derive(Debug, Clone)]
pub enum Fault {
    /// A descendant failed to render.
    Error(RenderError),
    /// A descendant is waiting for data.
    Suspended(ResumeToken),
}

/// Output of a component render.
pub type RenderOutput = Result<Render<Vec<Element>>, RenderError>;

/// Render function shared by every component.
pub type RenderFn = dyn Fn(&mut Hooks<'_>, &Props) -> RenderOutput + Send + Sync;

/// Produces a boundary's fallback children.
pub type FallbackFn = dyn Fn(&Fault) -> Vec<Element> + Send + Sync;

/// Definition of a component.
pub struct ComponentDef {
    name: Arc<str>,
    render: Box<RenderFn>,
    capabilities: Capabilities,
    fallback: Option<Box<FallbackFn>>,
}

/// Shared handle to a component definition. Two components are the same type
/// only if they share a definition.
#[derive(Clone)]
pub struct Component(Arc<ComponentDef>);

impl Component {
    /// Defines a plain component.
    pub fn new<F>(name: &str, render: F) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> RenderOutput + Send + Sync + 'static,
    {
        Self(Arc::new(ComponentDef {
            name: Arc::from(name),
            render: Box::new(render),
            capabilities: Capabilities::NONE,
            fallback: None,
        }))
    }

    /// Defines a boundary component.
    ///
    /// `render` produces the primary children; `fallback` replaces them once
    /// a fault matching `capabilities` is caught below the boundary.
    pub fn boundary<F, G>(name: &str, capabilities: Capabilities, render: F, fallback: G) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> RenderOutput + Send + Sync + 'static,
        G: Fn(&Fault) -> Vec<Element> + Send + Sync + 'static,
    {
        Self(Arc::new(ComponentDef {
            name: Arc::from(name),
            render: Box::new(render),
            capabilities,
            fallback: Some(Box::new(fallback)),
        }))
    }

    /// Component name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Capability flags.
    #[inline]
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.0.capabilities
    }

    /// Returns true if this component catches `fault`.
    #[must_use]
    pub fn catches(&self, fault: &Fault) -> bool {
        match fault {
            Fault::Error(_) => self.0.capabilities.has(Capabilities::ERROR_BOUNDARY),
            Fault::Suspended(_) => self.0.capabilities.has(Capabilities::SUSPENSE_BOUNDARY),
        }
    }

    /// Invokes the render function.
    ///
    /// # Errors
    ///
    /// Whatever the render function returns.
    pub fn render(&self, hooks: &mut Hooks<'_>, props: &Props) -> RenderOutput {
        (self.0.render)(hooks, props)
    }

    /// Produces the fallback children for `fault`.
    #[must_use]
    pub fn fallback(&self, fault: &Fault) -> Vec<Element> {
        self.0
            .fallback
            .as_ref()
            .map_or_else(Vec::new, |fallback| fallback(fault))
    }

    /// Identity comparison of definitions.
    #[inline]
    #[must_use]
    pub fn same(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.0.name)
            .field("capabilities", &self.0.capabilities)
            .finish()
    }
}

/// Payload of an [`Element`].
#[derive(Debug, Clone)]
pub enum ElementKind {
    /// A host node with attributes and children.
    Host {
        /// Tag name.
        tag: Arc<str>,
        /// Attributes.
        props: Arc<HostProps>,
        /// Child descriptors.
        children: Arc<[Element]>,
    },
    /// A text node.
    Text(Arc<str>),
    /// A component invocation.
    Component {
        /// Component definition.
        component: Component,
        /// Props passed to the render function.
        props: Props,
    },
}

/// Descriptor of one node in a rendered tree.
#[derive(Debug, Clone)]
pub struct Element {
    /// Optional key among siblings.
    pub key: Option<Key>,
    /// What the element describes.
    pub kind: ElementKind,
}

impl Element {
    /// Host node element.
    #[must_use]
    pub fn host(tag: &str, props: HostProps, children: Vec<Element>) -> Self {
        Self {
            key: None,
            kind: ElementKind::Host {
                tag: Arc::from(tag),
                props: Arc::new(props),
                children: children.into(),
            },
        }
    }

    /// Text node element.
    #[must_use]
    pub fn text(content: impl Into<Arc<str>>) -> Self {
        Self {
            key: None,
            kind: ElementKind::Text(content.into()),
        }
    }

    /// Component element with freshly wrapped props.
    pub fn component<P: Send + Sync + 'static>(component: &Component, props: P) -> Self {
        Self::component_with(component, Props::new(props))
    }

    /// Component element reusing existing props.
    #[must_use]
    pub fn component_with(component: &Component, props: Props) -> Self {
        Self {
            key: None,
            kind: ElementKind::Component {
                component: component.clone(),
                props,
            },
        }
    }

    /// Sets the key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }
}
