//! Correlation of dispatched calls with their results.

/// One distinct call id awaiting its result, and every batch position that
/// carries that id.
#[derive(Debug, Clone)]
pub struct PendingCall<T> {
    pub id: String,
    pub call: T,
    slots: Vec<usize>,
}

impl<T> PendingCall<T> {
    /// Positions in the original batch answered by this call's result.
    pub fn slots(&self) -> &[usize] {
        &self.slots
    }
}

/// A batch of calls deduplicated by id.
///
/// Each id is dispatched once; [`resolve`](Self::resolve) writes its outcome
/// back to every original position, in original order.
#[derive(Debug, Clone)]
pub struct PendingBatch<T> {
    pending: Vec<PendingCall<T>>,
    size: usize,
}

impl<T: Clone> PendingBatch<T> {
    pub fn new(calls: &[T], id_of: impl Fn(&T) -> &str) -> Self {
        let mut pending: Vec<PendingCall<T>> = Vec::new();
        for (slot, call) in calls.iter().enumerate() {
            let id = id_of(call);
            match pending.iter_mut().find(|p| p.id == id) {
                Some(existing) => existing.slots.push(slot),
                None => pending.push(PendingCall {
                    id: id.to_string(),
                    call: call.clone(),
                    slots: vec![slot],
                }),
            }
        }
        Self {
            pending,
            size: calls.len(),
        }
    }
}

impl<T> PendingBatch<T> {
    /// Distinct calls in first-seen order.
    pub fn iter(&self) -> std::slice::Iter<'_, PendingCall<T>> {
        self.pending.iter()
    }

    /// Number of distinct ids.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of calls in the original batch, duplicates included.
    pub fn batch_size(&self) -> usize {
        self.size
    }

    /// Spread one outcome per distinct call (in [`iter`](Self::iter) order)
    /// back over the original batch positions.
    pub fn resolve<R: Clone>(&self, outcomes: Vec<R>) -> Vec<R> {
        let mut slots: Vec<Option<R>> = vec![None; self.size];
        for (pending, outcome) in self.pending.iter().zip(outcomes) {
            for &slot in &pending.slots {
                slots[slot] = Some(outcome.clone());
            }
        }
        slots.into_iter().flatten().collect()
    }
}
