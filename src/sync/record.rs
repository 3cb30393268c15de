//! One host primitive and the renderer state it owns.

use super::{DirtyBits, InterruptScope, SyncStep};
use crate::{
    context::RenderContext,
    error::TranslateError,
    prims::{PrimBody, PrimKind, StepContext},
    scene::SceneDelegate,
    universe::NodeHandle,
};

/// What one pass over a record did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Steps that completed, in the order they ran.
    pub ran: Vec<SyncStep>,
    pub failed: Vec<SyncStep>,
    /// Whether the record asked for, and got, a forced second pass.
    pub resynced: bool,
    /// Bits still dirty after the pass.
    pub remaining: DirtyBits,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.remaining.is_empty()
    }
}

pub struct PrimitiveRecord {
    id: String,
    dirty: DirtyBits,
    initial: DirtyBits,
    body: PrimBody,
}

impl PrimitiveRecord {
    /// Creates the primitive's renderer nodes. The record starts dirty for
    /// everything its kind reacts to.
    pub fn new(cx: &RenderContext, id: &str, kind: &PrimKind) -> Result<Self, TranslateError> {
        let body = PrimBody::new(kind, cx, id)?;
        let initial = body.as_sync().initial_dirty_bits();
        Ok(Self {
            id: id.to_string(),
            dirty: initial,
            initial,
            body,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dirty(&self) -> DirtyBits {
        self.dirty
    }

    pub fn body(&self) -> &PrimBody {
        &self.body
    }

    pub fn nodes(&self) -> Vec<NodeHandle> {
        self.body.as_sync().nodes()
    }

    /// Runs every step the pending bits trigger, or all of them when
    /// `force` is set. A failing step is reported and keeps its bits; later
    /// steps still run.
    pub fn sync(
        &mut self,
        cx: &RenderContext,
        host: &dyn SceneDelegate,
        scope: &InterruptScope<'_>,
        force: bool,
    ) -> PassReport {
        self.dirty |= cx.tracker().take(&self.id);
        let mut report = PassReport::default();
        let mask = if force { DirtyBits::all() } else { self.dirty };
        if !mask.is_empty() {
            self.run_steps(cx, host, scope, mask, &mut report);
            if self.body.as_sync_mut().take_resync_request() {
                log::debug!("{}: instancing changed mid-pass, syncing again", self.id);
                report.resynced = true;
                self.run_steps(cx, host, scope, DirtyBits::all(), &mut report);
            }
        }
        report.remaining = self.dirty;
        report
    }

    fn run_steps(
        &mut self,
        cx: &RenderContext,
        host: &dyn SceneDelegate,
        scope: &InterruptScope<'_>,
        mask: DirtyBits,
        report: &mut PassReport,
    ) {
        let step_cx = StepContext {
            cx,
            host,
            id: &self.id,
            dirty: mask,
        };
        for step in SyncStep::ORDER {
            if !step.triggers().intersects(mask) {
                continue;
            }
            scope.interrupt();
            match self.body.run_step(step, &step_cx) {
                Ok(()) => {
                    self.dirty.remove(step.bits());
                    report.ran.push(step);
                }
                Err(err) => {
                    cx.diagnostics().report_error(&self.id, &err);
                    self.dirty |= step.bits() & self.initial;
                    report.failed.push(step);
                }
            }
        }
    }

    /// Destroys owned nodes and drops the primitive from every tracking
    /// table.
    pub fn release(&mut self, cx: &RenderContext) {
        self.body.as_sync_mut().release(cx);
        cx.release_prim(&self.id);
    }
}
