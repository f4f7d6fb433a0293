//! Fault propagation to the nearest matching boundary.

use canopy_core::fiber::{BoundaryState, FiberFlags, WorkPhase};
use canopy_core::{Fault, FiberId};

use super::{CaughtFault, CaughtKind, PassFault, Reconciler, WorkInProgress};

impl Reconciler {
    /// Hands a render fault to the closest enclosing boundary that catches
    /// it and restarts work there.
    ///
    /// # Errors
    ///
    /// Returns the fault when no boundary above `thrower` catches it.
    pub(crate) fn throw(&mut self, wip: &mut WorkInProgress, thrower: FiberId, fault: Fault) -> Result<(), PassFault> {
        match fault {
            Fault::Error(_) => self.arena[thrower].advance(WorkPhase::Errored),
            Fault::Suspended(_) => self.arena[thrower].advance(WorkPhase::Pending),
        }

        let mut cursor = self.arena[thrower].parent;
        while let Some(id) = cursor {
            let fiber = &self.arena[id];
            let catches = fiber.boundary.is_primary()
                && fiber.component().is_some_and(|component| component.catches(&fault));
            if catches {
                self.capture(wip, id, fault);
                return Ok(());
            }
            cursor = fiber.parent;
        }

        Err(match fault {
            Fault::Error(error) => PassFault::Uncaught(error),
            Fault::Suspended(token) => PassFault::Suspended(token),
        })
    }

    fn capture(&mut self, wip: &mut WorkInProgress, boundary: FiberId, fault: Fault) {
        let current_child = self.alternate_of(boundary).and_then(|current| self.arena[current].child);
        let fiber = &mut self.arena[boundary];
        let boundary_name = fiber.element_type.name().to_owned();
        let kind = match fault {
            Fault::Error(error) => {
                tracing::warn!(boundary = %boundary_name, %error, "error boundary caught a render error");
                fiber.boundary = BoundaryState::Failed(error.clone());
                CaughtKind::Error(error)
            }
            Fault::Suspended(token) => {
                tracing::debug!(boundary = %boundary_name, "suspense boundary showing its fallback");
                wip.suspended_boundaries.push((fiber.instance, token.clone()));
                fiber.boundary = BoundaryState::Suspended(token);
                CaughtKind::Suspended
            }
        };

        // Work done below the boundary is dropped; the fallback is reconciled
        // against the committed children.
        fiber.child = current_child;
        fiber.deletions.clear();
        fiber.flags.remove(FiberFlags::CHILD_DELETION);
        fiber.advance(WorkPhase::Pending);

        wip.caught.push(CaughtFault {
            boundary: fiber.instance,
            boundary_name,
            kind,
        });
        wip.next = Some(boundary);
    }
}
