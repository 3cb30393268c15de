//! The record table and pass scheduling.

use indexmap::IndexMap;
use rayon::prelude::*;

use super::{InterruptScope, PassReport, PrimitiveRecord};
use crate::{
    context::RenderContext,
    error::TranslateError,
    prims::PrimKind,
    scene::SceneDelegate,
};

/// Owns every primitive record of a render context.
pub struct SyncEngine {
    context: RenderContext,
    records: IndexMap<String, PrimitiveRecord>,
}

impl SyncEngine {
    pub fn new(context: RenderContext) -> Self {
        Self {
            context,
            records: IndexMap::new(),
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Adds a record for `id`, replacing (and releasing) any previous one.
    /// The render is interrupted while nodes are created.
    pub fn insert(&mut self, id: &str, kind: PrimKind) -> Result<(), TranslateError> {
        let cx = &self.context;
        let scope = InterruptScope::new(cx.coordinator());
        scope.interrupt();
        if let Some(mut previous) = self.records.shift_remove(id) {
            previous.release(cx);
        }
        let record = PrimitiveRecord::new(cx, id, &kind);
        cx.coordinator().resume();
        let record = record?;
        log::debug!("inserted {} record {id}", record.body().kind_name());
        self.records.insert(id.to_string(), record);
        Ok(())
    }

    /// Inserts a record for a host prim type name. Unknown types are
    /// reported and skipped.
    pub fn insert_typed(&mut self, id: &str, type_name: &str) -> Result<bool, TranslateError> {
        match PrimKind::from_host_type(type_name, self.context.universe().catalog()) {
            Some(kind) => self.insert(id, kind).map(|()| true),
            None => {
                log::debug!("{id}: no translation for prim type `{type_name}`");
                Ok(false)
            }
        }
    }

    /// Releases the record of `id`. Returns whether there was one.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(mut record) = self.records.shift_remove(id) else {
            return false;
        };
        let cx = &self.context;
        let scope = InterruptScope::new(cx.coordinator());
        scope.interrupt();
        record.release(cx);
        cx.coordinator().resume();
        true
    }

    pub fn record(&self, id: &str) -> Option<&PrimitiveRecord> {
        self.records.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Syncs a single record.
    pub fn sync(&mut self, id: &str, host: &dyn SceneDelegate, force: bool) -> Option<PassReport> {
        let cx = &self.context;
        let record = self.records.get_mut(id)?;
        let scope = InterruptScope::new(cx.coordinator());
        let report = record.sync(cx, host, &scope, force);
        if scope.fired() {
            cx.coordinator().resume();
        }
        Some(report)
    }

    /// Syncs every record: materials first so their terminals are published,
    /// then every other record in parallel. A clean scene does not
    /// interrupt the render.
    pub fn sync_all(&mut self, host: &dyn SceneDelegate) -> IndexMap<String, PassReport> {
        let cx = &self.context;
        let scope = InterruptScope::new(cx.coordinator());
        let (materials, shapes): (Vec<&mut PrimitiveRecord>, Vec<&mut PrimitiveRecord>) =
            self.records.values_mut().partition(|r| r.body().is_material());

        let mut reports: IndexMap<String, PassReport> = materials
            .into_iter()
            .map(|record| (record.id().to_string(), record.sync(cx, host, &scope, false)))
            .collect();
        let shape_reports: Vec<(String, PassReport)> = shapes
            .into_par_iter()
            .map(|record| (record.id().to_string(), record.sync(cx, host, &scope, false)))
            .collect();
        reports.extend(shape_reports);

        if scope.fired() {
            let failed = reports.values().filter(|r| !r.failed.is_empty()).count();
            log::debug!("synced {} records, {failed} with failed steps", reports.len());
            cx.coordinator().resume();
        }
        reports
    }
}
