//! Product rotation: least-recently-posted first.

use crate::types::Timestamp;

/// Anything that records when it was last published.
pub trait Rotatable {
    fn last_posted_at(&self) -> Option<Timestamp>;
}

impl<T: Rotatable + ?Sized> Rotatable for &T {
    fn last_posted_at(&self) -> Option<Timestamp> {
        (**self).last_posted_at()
    }
}

/// Pick the candidate posted longest ago.
///
/// Never-posted candidates (`None`) win over any timestamp. Ties keep the
/// input order: the first of the equally-old candidates is returned.
pub fn least_recently_posted<T: Rotatable>(candidates: &[T]) -> Option<&T> {
    // `Option<T>` orders `None` before every `Some`, and `min_by_key`
    // returns the first minimum.
    candidates.iter().min_by_key(|c| c.last_posted_at())
}
