//! Circular dependency detection infrastructure.

use crate::error::{DiError, DiResult};
use crate::key::ServiceId;

pub(crate) const MAX_DEPTH: usize = 256;

/// Identifiers currently being constructed by one top-level resolution.
///
/// Each resolution call owns its path and hands an extended copy to the
/// factories it invokes, so concurrent resolutions never see each other's
/// in-progress state.
#[derive(Debug, Default, Clone)]
pub(crate) struct ResolutionPath {
    stack: Vec<ServiceId>,
}

impl ResolutionPath {
    pub(crate) fn root() -> Self {
        Self::default()
    }

    /// Returns the path extended with `id`.
    ///
    /// Fails with [`DiError::Circular`] when `id` is already in progress. The
    /// reported cycle starts at the first occurrence of `id` and ends with it,
    /// e.g. `X -> Y -> X`.
    pub(crate) fn enter(&self, id: &ServiceId) -> DiResult<ResolutionPath> {
        if let Some(start) = self.stack.iter().position(|s| s == id) {
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(id.clone());
            return Err(DiError::Circular(cycle));
        }

        if self.stack.len() >= MAX_DEPTH {
            return Err(DiError::DepthExceeded(self.stack.len()));
        }

        let mut stack = Vec::with_capacity(self.stack.len() + 1);
        stack.extend_from_slice(&self.stack);
        stack.push(id.clone());
        Ok(ResolutionPath { stack })
    }

    pub(crate) fn as_slice(&self) -> &[ServiceId] {
        &self.stack
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_cycle_from_first_occurrence() {
        let path = ResolutionPath::root()
            .enter(&"A".into())
            .and_then(|p| p.enter(&"X".into()))
            .and_then(|p| p.enter(&"Y".into()))
            .unwrap();

        let err = path.enter(&"X".into()).unwrap_err();
        let names: Vec<_> = err.cycle_path().unwrap().iter().map(|id| id.to_string()).collect();
        assert_eq!(names, ["X", "Y", "X"]);
    }

    #[test]
    fn depth_guard() {
        let mut path = ResolutionPath::root();
        for i in 0..MAX_DEPTH {
            path = path.enter(&ServiceId::named(format!("svc-{}", i))).unwrap();
        }
        assert_eq!(path.as_slice().len(), MAX_DEPTH);
        assert!(matches!(
            path.enter(&"one-more".into()),
            Err(DiError::DepthExceeded(MAX_DEPTH))
        ));
    }
}
