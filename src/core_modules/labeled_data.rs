// THEORY:
// Both clustering stages run the same inner loop: every item (a pixel or a
// superpixel) is offered to candidate centroids and remembers the best one it has
// seen. That scratch state, the best distance and the winning label, is the only
// thing that changes during an assignment pass.
//
// Key architectural principles:
// 1.  **Arena + index**: payloads live in one immutable `Vec<T>` and the mutable
//     `Assignment` records live in a second `Vec` of the same length. Index `i` in
//     one is index `i` in the other. Payloads are never touched after
//     construction, so they can be shared read-only across rayon workers while
//     each worker writes only the assignment slots it owns.
// 2.  **Positional layout**: the table does not know what an index means. The
//     superpixel engine stores pixels column-major (`height * x + y`) and relies
//     on that to find a pixel from its position without hashing.
// 3.  **Explicit reset**: a fresh pass must start from "unlabeled, infinitely far"
//     or stale labels from the previous iteration leak into the new one.

use rayon::prelude::*;

/// Mutable best-match state for one item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Assignment {
    /// Best distance seen so far; `f64::INFINITY` when unlabeled.
    pub distance: f64,
    /// Index of the winning centroid; `None` when unlabeled.
    pub label: Option<usize>,
}

impl Assignment {
    pub const UNLABELED: Assignment = Assignment {
        distance: f64::INFINITY,
        label: None,
    };

    #[inline]
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }

    #[inline]
    pub fn reset(&mut self) {
        *self = Self::UNLABELED;
    }

    /// Takes the label if `distance` beats the current best. Returns whether it did.
    #[inline]
    pub fn offer(&mut self, label: usize, distance: f64) -> bool {
        if distance < self.distance {
            self.distance = distance;
            self.label = Some(label);
            true
        } else {
            false
        }
    }
}

impl Default for Assignment {
    fn default() -> Self {
        Self::UNLABELED
    }
}

/// A read-only view pairing a payload with its current assignment.
#[derive(Debug, Clone, Copy)]
pub struct LabeledData<'a, T> {
    pub payload: &'a T,
    pub distance: f64,
    pub label: Option<usize>,
}

impl<T> LabeledData<'_, T> {
    pub fn is_labeled(&self) -> bool {
        self.label.is_some()
    }
}

/// Payloads plus a parallel array of assignments.
#[derive(Debug, Clone)]
pub struct AssignmentTable<T> {
    payloads: Vec<T>,
    assignments: Vec<Assignment>,
}

impl<T> AssignmentTable<T> {
    pub fn new(payloads: Vec<T>) -> Self {
        let assignments = vec![Assignment::UNLABELED; payloads.len()];
        Self {
            payloads,
            assignments,
        }
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn payloads(&self) -> &[T] {
        &self.payloads
    }

    pub fn payload(&self, index: usize) -> Option<&T> {
        self.payloads.get(index)
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn assignment(&self, index: usize) -> Option<&Assignment> {
        self.assignments.get(index)
    }

    pub fn get(&self, index: usize) -> Option<LabeledData<'_, T>> {
        let payload = self.payloads.get(index)?;
        let assignment = self.assignments.get(index)?;
        Some(LabeledData {
            payload,
            distance: assignment.distance,
            label: assignment.label,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = LabeledData<'_, T>> + '_ {
        self.payloads
            .iter()
            .zip(&self.assignments)
            .map(|(payload, assignment)| LabeledData {
                payload,
                distance: assignment.distance,
                label: assignment.label,
            })
    }

    /// Offers `label` at `distance` to the item at `index`. Out-of-range indices are ignored.
    #[inline]
    pub fn offer(&mut self, index: usize, label: usize, distance: f64) -> bool {
        self.assignments
            .get_mut(index)
            .is_some_and(|assignment| assignment.offer(label, distance))
    }

    /// Overwrites the assignment at `index` unconditionally.
    pub fn set(&mut self, index: usize, label: usize, distance: f64) {
        if let Some(assignment) = self.assignments.get_mut(index) {
            assignment.label = Some(label);
            assignment.distance = distance;
        }
    }

    pub fn unlabeled_count(&self) -> usize {
        self.assignments.iter().filter(|a| !a.is_labeled()).count()
    }

    pub fn into_payloads(self) -> Vec<T> {
        self.payloads
    }
}

impl<T: Sync> AssignmentTable<T> {
    /// Clears every assignment. Each slot is independent, so this runs in parallel.
    pub fn reset_all(&mut self) {
        self.assignments.par_iter_mut().for_each(Assignment::reset);
    }

    /// Runs `update` once per item in parallel. Each call may only touch its own slot.
    pub fn par_update<F>(&mut self, update: F)
    where
        F: Fn(&T, &mut Assignment) + Sync + Send,
    {
        self.assignments
            .par_iter_mut()
            .zip(self.payloads.par_iter())
            .for_each(|(assignment, payload)| update(payload, assignment));
    }

    /// Parallel iterator over `(payload, assignment)` pairs.
    pub fn par_iter(&self) -> impl IndexedParallelIterator<Item = (&T, &Assignment)> + '_ {
        self.payloads.par_iter().zip(self.assignments.par_iter())
    }
}
