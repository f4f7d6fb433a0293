//! Deterministic failure injection for host adapter calls.

/// Kind of adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// `create_instance`.
    Create,
    /// `append_child`.
    Append,
    /// `insert_before`.
    InsertBefore,
    /// `remove_child`.
    Remove,
    /// `commit_prop_update`.
    UpdateProps,
}

impl OpKind {
    /// Adapter method name, as reported in [`canopy_core::HostError`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpKind::Create => "create_instance",
            OpKind::Append => "append_child",
            OpKind::InsertBefore => "insert_before",
            OpKind::Remove => "remove_child",
            OpKind::UpdateProps => "commit_prop_update",
        }
    }
}

/// A single armed failure: the call of `kind` after `remaining` more calls.
#[derive(Debug, Clone, Copy)]
struct Armed {
    kind: OpKind,
    remaining: usize,
}

/// Set of armed failures. Each fires once.
#[derive(Debug, Default)]
pub(crate) struct FaultPlan {
    armed: Vec<Armed>,
}

impl FaultPlan {
    pub(crate) fn arm(&mut self, kind: OpKind, nth: usize) {
        self.armed.push(Armed {
            kind,
            remaining: nth,
        });
    }

    /// Counts a call of `kind`; returns true if it must fail.
    pub(crate) fn trip(&mut self, kind: OpKind) -> bool {
        let mut fired = false;
        self.armed.retain_mut(|armed| {
            if armed.kind != kind {
                return true;
            }
            if armed.remaining == 0 {
                fired = true;
                return false;
            }
            armed.remaining -= 1;
            true
        });
        fired
    }
}
