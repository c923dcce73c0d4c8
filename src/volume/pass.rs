use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::error::F3dError;

/// Kind of pass that can hold a voxel grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassKind {
    /// Writes tsdf and weight. Exclusive.
    Fusion,
    /// Reads tsdf and weight. May overlap with other extractions.
    Extraction,
    /// Zeroes the grid. Exclusive.
    Reset,
}

impl PassKind {
    fn is_exclusive(self) -> bool {
        !matches!(self, PassKind::Extraction)
    }
}

const EXCLUSIVE: usize = usize::MAX;

/// Tracks which pass currently holds a grid: `0` is idle, `EXCLUSIVE` is a
/// fusion or reset, any other value is the number of running extractions.
#[derive(Debug, Default)]
pub(crate) struct PassState(Arc<AtomicUsize>);

impl PassState {
    pub(crate) fn begin(&self, kind: PassKind) -> Result<PassGuard, F3dError> {
        if kind.is_exclusive() {
            self.0
                .compare_exchange(0, EXCLUSIVE, Ordering::AcqRel, Ordering::Acquire)
                .map_err(|current| Self::violation(kind, current))?;
        } else {
            let mut current = self.0.load(Ordering::Acquire);
            loop {
                if current == EXCLUSIVE {
                    return Err(Self::violation(kind, current));
                }
                match self.0.compare_exchange_weak(
                    current,
                    current + 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => break,
                    Err(actual) => current = actual,
                }
            }
        }

        Ok(PassGuard {
            state: self.0.clone(),
            kind,
        })
    }

    fn violation(kind: PassKind, current: usize) -> F3dError {
        if current == EXCLUSIVE {
            F3dError::concurrency_violation(format!(
                "cannot start {:?} pass: a fusion or reset pass is in flight",
                kind
            ))
        } else {
            F3dError::concurrency_violation(format!(
                "cannot start {:?} pass: {} extraction pass(es) in flight",
                kind, current
            ))
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.0.load(Ordering::Acquire) == 0
    }
}

/// Holds a voxel grid for the duration of a pass. Releases it on drop.
#[must_use = "the pass ends when the guard is dropped"]
#[derive(Debug)]
pub struct PassGuard {
    state: Arc<AtomicUsize>,
    kind: PassKind,
}

impl PassGuard {
    pub fn kind(&self) -> PassKind {
        self.kind
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        if self.kind.is_exclusive() {
            self.state.store(0, Ordering::Release);
        } else {
            self.state.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
