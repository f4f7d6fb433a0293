//! # Core Error Types
//!
//! Errors raised while rendering a component or talking to the host.

use thiserror::Error;

/// Failure of a functional state updater.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct UpdateError(pub String);

impl UpdateError {
    /// Creates an updater error from any message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors thrown during the render phase.
///
/// Every variant is caught by the nearest error boundary. The instance that
/// raised it is always torn down; hook-order violations are never repaired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A component returned an error from its render function.
    #[error("component `{component}` failed to render: {message}")]
    Thrown {
        /// Component name (filled in by the reconciler if left empty).
        component: String,
        /// Error message.
        message: String,
    },

    /// A functional updater failed while the update queue was drained.
    #[error("state updater in `{component}` failed: {source}")]
    Update {
        /// Component that owns the state hook.
        component: String,
        /// The updater's error.
        #[source]
        source: UpdateError,
    },

    /// Hook calls differ in number, kind, or state type between two renders.
    #[error("hook order violation in `{component}`: {detail}")]
    HookOrderViolation {
        /// Component that violated the hook order.
        component: String,
        /// What differed.
        detail: String,
    },

    /// Props could not be read as the requested type.
    #[error("props of `{component}` are not of type `{expected}`")]
    PropsMismatch {
        /// Component whose props were read.
        component: String,
        /// Requested type name.
        expected: &'static str,
    },
}

impl RenderError {
    /// Error for use inside a component's render function.
    #[must_use]
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            component: String::new(),
            message: message.into(),
        }
    }

    /// Attaches the component name if the error does not carry one yet.
    #[must_use]
    pub fn in_component(mut self, name: &str) -> Self {
        let slot = match &mut self {
            Self::Thrown { component, .. }
            | Self::Update { component, .. }
            | Self::HookOrderViolation { component, .. }
            | Self::PropsMismatch { component, .. } => component,
        };
        if slot.is_empty() {
            name.clone_into(slot);
        }
        self
    }

    /// Returns true for [`RenderError::HookOrderViolation`].
    #[inline]
    #[must_use]
    pub fn is_hook_order_violation(&self) -> bool {
        matches!(self, Self::HookOrderViolation { .. })
    }

    /// Name of the component that raised the error.
    #[must_use]
    pub fn component(&self) -> &str {
        match self {
            Self::Thrown { component, .. }
            | Self::Update { component, .. }
            | Self::HookOrderViolation { component, .. }
            | Self::PropsMismatch { component, .. } => component,
        }
    }
}

/// Failure reported by a host adapter during commit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host operation `{operation}` failed: {reason}")]
pub struct HostError {
    /// The adapter call that failed.
    pub operation: &'static str,
    /// Adapter-provided reason.
    pub reason: String,
}

impl HostError {
    /// Creates a host error.
    #[must_use]
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self {
            operation,
            reason: reason.into(),
        }
    }
}

/// Result type for render-phase operations.
pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_name_attached_once() {
        let err = RenderError::thrown("boom").in_component("Counter");
        assert_eq!(err.component(), "Counter");

        let err = err.in_component("Other");
        assert_eq!(err.component(), "Counter");
        assert_eq!(err.to_string(), "component `Counter` failed to render: boom");
    }

    #[test]
    fn test_hook_order_flag() {
        let err = RenderError::HookOrderViolation {
            component: "A".into(),
            detail: "fewer hooks".into(),
        };
        assert!(err.is_hook_order_violation());
        assert!(!RenderError::thrown("x").is_hook_order_violation());
    }
}
