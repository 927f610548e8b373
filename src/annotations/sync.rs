//! Optimistic annotation persistence
//!
//! A finished shape is shown immediately as a local draft and submitted to the
//! store. On success the draft takes the server id in place; on failure it is
//! dropped and the user redraws. Deletes hide the annotation at once and put it
//! back if the store refuses.

use crate::api::types::{AnnotationRecord, CreateAnnotation};
use crate::api::{AnnotationStore, ApiError};
use crate::domain::Annotation;

/// A create request waiting for the store
#[derive(Clone, Debug, PartialEq)]
pub struct PendingCreate {
    pub local_key: u64,
    pub image_id: i64,
    pub body: CreateAnnotation,
}

#[derive(Clone, Debug)]
struct PendingDelete {
    index: usize,
    annotation: Annotation,
}

/// Annotation list owned by the currently displayed image
#[derive(Clone, Debug)]
pub struct AnnotationSync {
    image_id: Option<i64>,
    annotations: Vec<Annotation>,
    pending_deletes: Vec<PendingDelete>,
    /// Local keys of drafts withdrawn while their create was in flight
    withdrawn: Vec<u64>,
    /// Server ids of withdrawn drafts the store accepted anyway
    orphans: Vec<i64>,
    next_key: u64,
}

impl Default for AnnotationSync {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationSync {
    pub fn new() -> Self {
        Self {
            image_id: None,
            annotations: Vec::new(),
            pending_deletes: Vec::new(),
            withdrawn: Vec::new(),
            orphans: Vec::new(),
            next_key: 1,
        }
    }

    pub fn image_id(&self) -> Option<i64> {
        self.image_id
    }

    /// Annotations to render, drafts included, in draw order
    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: i64) -> Option<&Annotation> {
        self.annotations.iter().find(|a| a.id == Some(id))
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_deletes.is_empty()
            || !self.withdrawn.is_empty()
            || self.annotations.iter().any(Annotation::is_new)
    }

    fn allocate_key(&mut self) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        key
    }

    /// Show a different image; the previous image's list is discarded, not merged
    pub fn switch_image(&mut self, image_id: i64) {
        if self.image_id != Some(image_id) {
            log::debug!(
                "Switching annotations from {:?} to image {}",
                self.image_id,
                image_id
            );
        }
        self.image_id = Some(image_id);
        self.annotations.clear();
        self.pending_deletes.clear();
    }

    /// Replace the list with records fetched for `image_id`.
    ///
    /// Returns false (and changes nothing) when the records belong to an image
    /// that is no longer displayed.
    pub fn load(&mut self, image_id: i64, records: &[AnnotationRecord]) -> bool {
        if self.image_id != Some(image_id) {
            log::debug!("Ignoring stale annotation list for image {}", image_id);
            return false;
        }
        let drafts: Vec<Annotation> = self
            .annotations
            .drain(..)
            .filter(Annotation::is_new)
            .collect();
        let mut loaded = Vec::with_capacity(records.len() + drafts.len());
        for record in records {
            let key = self.allocate_key();
            if let Some(annotation) = record.to_annotation(key) {
                loaded.push(annotation);
            }
        }
        // In-flight drafts stay on top until the store answers
        loaded.extend(drafts);
        self.annotations = loaded;
        self.pending_deletes.clear();
        true
    }

    /// Add a finished shape as a local draft and build its create request.
    ///
    /// Returns `None` when no image is displayed.
    pub fn begin_create(&mut self, mut draft: Annotation) -> Option<PendingCreate> {
        let image_id = self.image_id?;
        draft.id = None;
        draft.image_id = image_id;
        draft.local_key = self.allocate_key();
        let pending = PendingCreate {
            local_key: draft.local_key,
            image_id,
            body: CreateAnnotation::from_annotation(&draft),
        };
        self.annotations.push(draft);
        Some(pending)
    }

    /// Drop a draft whose create request is still in flight.
    ///
    /// If the store accepts it anyway, its id is queued in
    /// [`take_orphans`](Self::take_orphans) for deletion.
    pub fn withdraw_draft(&mut self, local_key: u64) -> bool {
        let Some(index) = self
            .annotations
            .iter()
            .position(|a| a.local_key == local_key && a.is_new())
        else {
            return false;
        };
        self.annotations.remove(index);
        self.withdrawn.push(local_key);
        true
    }

    /// Ids of withdrawn drafts that were created on the server
    pub fn take_orphans(&mut self) -> Vec<i64> {
        std::mem::take(&mut self.orphans)
    }

    /// Apply the store's answer to a create request.
    ///
    /// Returns the server id on success.
    pub fn complete_create(
        &mut self,
        local_key: u64,
        result: Result<AnnotationRecord, ApiError>,
    ) -> Option<i64> {
        if let Some(slot) = self.withdrawn.iter().position(|k| *k == local_key) {
            self.withdrawn.swap_remove(slot);
            match result {
                Ok(record) => {
                    log::debug!("Withdrawn annotation {} created as id {}", local_key, record.id);
                    self.orphans.push(record.id);
                }
                Err(err) => log::debug!("Withdrawn annotation {} not created: {}", local_key, err),
            }
            return None;
        }
        let position = self.annotations.iter().position(|a| a.local_key == local_key);
        match (result, position) {
            (Ok(record), Some(index)) => {
                self.annotations[index].id = Some(record.id);
                log::debug!("Annotation {} persisted as id {}", local_key, record.id);
                Some(record.id)
            }
            (Ok(record), None) => {
                log::debug!(
                    "Annotation {} persisted after its image was closed (id {})",
                    local_key,
                    record.id
                );
                None
            }
            (Err(err), Some(index)) => {
                let dropped = self.annotations.remove(index);
                log::error!(
                    "Failed to save {} annotation, discarding draft: {}",
                    dropped.kind().wire_name(),
                    err
                );
                None
            }
            (Err(err), None) => {
                log::error!("Failed to save annotation {}: {}", local_key, err);
                None
            }
        }
    }

    /// Hide a persisted annotation while its delete is in flight
    pub fn begin_delete(&mut self, id: i64) -> bool {
        let Some(index) = self.annotations.iter().position(|a| a.id == Some(id)) else {
            return false;
        };
        let annotation = self.annotations.remove(index);
        self.pending_deletes.push(PendingDelete { index, annotation });
        true
    }

    /// Apply the store's answer to a delete request
    pub fn complete_delete(&mut self, id: i64, result: Result<(), ApiError>) -> bool {
        let Some(slot) = self
            .pending_deletes
            .iter()
            .position(|p| p.annotation.id == Some(id))
        else {
            return result.is_ok();
        };
        let pending = self.pending_deletes.remove(slot);
        match result {
            Ok(()) => {
                log::debug!("Annotation {} deleted", id);
                true
            }
            Err(err) => {
                log::error!("Failed to delete annotation {}: {}", id, err);
                let index = pending.index.min(self.annotations.len());
                self.annotations.insert(index, pending.annotation);
                false
            }
        }
    }

    // ========================================================================
    // Store round trips
    // ========================================================================

    /// Fetch and load the list for the displayed image
    pub async fn refresh<S: AnnotationStore + ?Sized>(&mut self, store: &S) -> Result<(), ApiError> {
        let Some(image_id) = self.image_id else {
            return Ok(());
        };
        let records = store.list(image_id).await?;
        self.load(image_id, &records);
        Ok(())
    }

    /// Submit a pending create and apply the answer
    pub async fn persist<S: AnnotationStore + ?Sized>(
        &mut self,
        store: &S,
        pending: PendingCreate,
    ) -> Option<i64> {
        let result = store.create(&pending.body).await;
        let id = self.complete_create(pending.local_key, result);
        for orphan in self.take_orphans() {
            if let Err(err) = store.delete(orphan).await {
                log::error!("Failed to delete withdrawn annotation {}: {}", orphan, err);
            }
        }
        id
    }

    /// Delete by id with optimistic hiding
    pub async fn delete<S: AnnotationStore + ?Sized>(&mut self, store: &S, id: i64) -> bool {
        if !self.begin_delete(id) {
            return false;
        }
        let result = store.delete(id).await;
        self.complete_delete(id, result)
    }
}
