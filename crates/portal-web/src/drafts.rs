//! In-memory new-case drafts with idle expiry and a size cap.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use portal_intake::IntakeForm;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug)]
struct Draft {
    form: IntakeForm,
    touched: Instant,
}

/// Drafts idle longer than `ttl` are dropped; when `capacity` is reached the
/// least recently touched draft makes room for the new one.
#[derive(Debug)]
pub struct DraftStore {
    drafts: HashMap<Uuid, Draft>,
    capacity: usize,
    ttl: Duration,
}

impl DraftStore {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            drafts: HashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.drafts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drafts.is_empty()
    }

    pub fn insert(&mut self, form: IntakeForm, now: Instant) -> Uuid {
        self.prune_expired(now);
        while self.drafts.len() >= self.capacity {
            let Some(oldest) = self
                .drafts
                .iter()
                .min_by_key(|(_, draft)| draft.touched)
                .map(|(id, _)| *id)
            else {
                break;
            };
            self.drafts.remove(&oldest);
            debug!(draft = %oldest, "evicted least recently used draft");
        }
        let id = Uuid::new_v4();
        self.drafts.insert(id, Draft { form, touched: now });
        id
    }

    /// Looks up a live draft and marks it as used.
    pub fn get_mut(&mut self, id: &Uuid, now: Instant) -> Option<&mut IntakeForm> {
        if self.is_expired(id, now) {
            self.drafts.remove(id);
            debug!(draft = %id, "draft expired");
            return None;
        }
        let draft = self.drafts.get_mut(id)?;
        draft.touched = now;
        Some(&mut draft.form)
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<IntakeForm> {
        self.drafts.remove(id).map(|draft| draft.form)
    }

    fn is_expired(&self, id: &Uuid, now: Instant) -> bool {
        self.drafts
            .get(id)
            .is_some_and(|draft| now.saturating_duration_since(draft.touched) > self.ttl)
    }

    fn prune_expired(&mut self, now: Instant) -> usize {
        let before = self.drafts.len();
        let ttl = self.ttl;
        self.drafts
            .retain(|_, draft| now.saturating_duration_since(draft.touched) <= ttl);
        let pruned = before - self.drafts.len();
        if pruned > 0 {
            debug!(pruned, "dropped expired drafts");
        }
        pruned
    }
}
