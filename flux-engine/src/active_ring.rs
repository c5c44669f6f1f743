use crate::tenant::TenantId;

/// An explicit ring buffer with a cursor: a `Vec` of tenant handles plus a
/// `cursor` integer advanced modulo `len` (§9 — this replaces the source's
/// intrusive doubly-linked list with head-reset; a plain array+cursor keeps
/// iteration order stable, avoids aliasing a "list head" node, and is simpler
/// to prove correct).
///
/// A tenant appears here iff its software queue is non-empty or (LC only) it
/// still has negative credit to work off. [`ActiveRing::cursor`] persists
/// across ticks so that round-robin resumes exactly where the previous tick
/// left off instead of always favoring the first entry (§4.5).
#[derive(Debug, Default)]
pub struct ActiveRing {
    members: Vec<TenantId>,
    cursor: usize,
}

impl ActiveRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, id: TenantId) -> bool {
        self.members.contains(&id)
    }

    /// Adds `id` to the ring if it is not already present. No-op otherwise —
    /// re-activating a tenant that is already queued must not duplicate it.
    pub fn activate(&mut self, id: TenantId) {
        if !self.members.contains(&id) {
            self.members.push(id);
        }
    }

    /// Removes every id in `doomed` from the ring in one pass, preserving the
    /// relative order of survivors and re-deriving a sane cursor position
    /// (clamped into range, or 0 if the ring emptied out).
    pub fn deactivate_many(&mut self, doomed: &[TenantId]) {
        if doomed.is_empty() {
            return;
        }
        let anchor = self.members.get(self.cursor).copied();
        self.members.retain(|id| !doomed.contains(id));
        self.cursor = match anchor {
            Some(anchor_id) if !doomed.contains(&anchor_id) => self
                .members
                .iter()
                .position(|&id| id == anchor_id)
                .unwrap_or(0),
            _ => {
                if self.members.is_empty() {
                    0
                } else {
                    self.cursor % self.members.len()
                }
            }
        };
    }

    /// Returns the ring's contents in round-robin order starting at the
    /// current cursor, without mutating it. Callers resume by calling
    /// [`ActiveRing::set_cursor_to`] with the tenant they stopped at.
    pub fn iter_from_cursor(&self) -> impl Iterator<Item = TenantId> + '_ {
        let n = self.members.len();
        let start = if n == 0 { 0 } else { self.cursor % n };
        (0..n).map(move |i| self.members[(start + i) % n])
    }

    /// Snapshots the cursor at `id` (used when a sub-round must stop mid-lap,
    /// e.g. FlashIO capacity exhausted, so the next tick resumes there).
    pub fn set_cursor_to(&mut self, id: TenantId) {
        if let Some(pos) = self.members.iter().position(|&x| x == id) {
            self.cursor = pos;
        }
    }

    /// Advances the cursor by one ring position. Used by sub-round 2 to move
    /// past the last tenant served this tick (§4.5 — "advance … by one
    /// position that lands on a BE tenant").
    pub fn advance_cursor(&mut self) {
        if !self.members.is_empty() {
            self.cursor = (self.cursor + 1) % self.members.len();
        }
    }

    pub fn members(&self) -> &[TenantId] {
        &self.members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activate_is_idempotent() {
        let mut ring = ActiveRing::new();
        ring.activate(TenantId(1));
        ring.activate(TenantId(1));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn iter_from_cursor_resumes_after_deactivation() {
        let mut ring = ActiveRing::new();
        for i in 0..3 {
            ring.activate(TenantId(i));
        }
        ring.set_cursor_to(TenantId(1));
        // Tenant 0 drained out mid-tick.
        ring.deactivate_many(&[TenantId(0)]);
        let order: Vec<_> = ring.iter_from_cursor().collect();
        assert_eq!(order, vec![TenantId(1), TenantId(2)]);
    }

    #[test]
    fn deactivating_everything_resets_cursor() {
        let mut ring = ActiveRing::new();
        ring.activate(TenantId(1));
        ring.set_cursor_to(TenantId(1));
        ring.deactivate_many(&[TenantId(1)]);
        assert!(ring.is_empty());
        assert_eq!(ring.iter_from_cursor().count(), 0);
    }

    #[test]
    fn round_robin_progress_visits_every_tenant_once_per_lap() {
        let mut ring = ActiveRing::new();
        for i in 0..5 {
            ring.activate(TenantId(i));
        }
        ring.set_cursor_to(TenantId(3));
        let order: Vec<_> = ring.iter_from_cursor().collect();
        assert_eq!(
            order,
            vec![
                TenantId(3),
                TenantId(4),
                TenantId(0),
                TenantId(1),
                TenantId(2)
            ]
        );
    }
}
