//! Declarative pass graph.
//!
//! Passes declare how they touch each buffer. Consecutive passes whose
//! accesses do not conflict share a stage; a barrier separates stages. Two
//! accesses conflict unless both read, or both accumulate into the same
//! buffer (integer accumulation is order independent).

use std::ops::Range;

/// Buffers shared between passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Buffer {
    Position,
    Predicted,
    Velocity,
    /// Disjoint per-particle corrections (`dx`).
    Correction,
    /// Fixed-point shared corrections (`dxE7`).
    FixedCorrection,
    State,
    InvMass,
    Radius,
    /// Per-particle hashed cell and same-hash range.
    Cells,
    /// Sorted spatial entries.
    Spatial,
    DistanceConstraints,
    VolumeConstraints,
    Proxy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Accumulate,
}

impl Access {
    fn conflicts_with(self, other: Access) -> bool {
        !matches!(
            (self, other),
            (Access::Read, Access::Read) | (Access::Accumulate, Access::Accumulate)
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Pass {
    StarUpdate,
    Attach,
    Hash,
    Sort,
    Collect,
    Predict,
    ObjectCollide,
    ParticleCollide,
    Distance,
    Volume,
    Correct,
}

/// A pass and the buffers it touches.
#[derive(Clone, Debug, PartialEq)]
pub struct PassDecl {
    pub pass: Pass,
    pub accesses: Vec<(Buffer, Access)>,
}

impl PassDecl {
    pub fn new(pass: Pass) -> Self {
        Self {
            pass,
            accesses: Vec::new(),
        }
    }

    pub fn read(mut self, buffers: &[Buffer]) -> Self {
        self.accesses.extend(buffers.iter().map(|&b| (b, Access::Read)));
        self
    }

    pub fn write(mut self, buffers: &[Buffer]) -> Self {
        self.accesses.extend(buffers.iter().map(|&b| (b, Access::Write)));
        self
    }

    pub fn accumulate(mut self, buffers: &[Buffer]) -> Self {
        self.accesses.extend(buffers.iter().map(|&b| (b, Access::Accumulate)));
        self
    }

    /// Whether running `self` and `other` without a barrier is a hazard.
    pub fn conflicts_with(&self, other: &PassDecl) -> bool {
        self.accesses.iter().any(|&(buffer, access)| {
            other
                .accesses
                .iter()
                .any(|&(b, a)| b == buffer && access.conflicts_with(a))
        })
    }
}

/// Ordered passes grouped into barrier-separated stages.
#[derive(Clone, Debug)]
pub struct ComputeGraph {
    passes: Vec<PassDecl>,
    stages: Vec<Range<usize>>,
}

impl ComputeGraph {
    /// Build the graph, opening a new stage whenever a pass conflicts with
    /// any pass already in the current one.
    pub fn new(passes: Vec<PassDecl>) -> Self {
        let mut stages = Vec::new();
        let mut start = 0;
        for (index, pass) in passes.iter().enumerate() {
            if passes[start..index].iter().any(|p| p.conflicts_with(pass)) {
                stages.push(start..index);
                start = index;
            }
        }
        if start < passes.len() {
            stages.push(start..passes.len());
        }
        Self { passes, stages }
    }

    /// Per-step broad phase: star update, attachment copy, hash, sort, collect.
    pub fn step() -> Self {
        use Buffer::*;
        Self::new(vec![
            PassDecl::new(Pass::StarUpdate)
                .read(&[Position, State])
                .write(&[Velocity]),
            PassDecl::new(Pass::Attach).write(&[Position, Predicted]),
            PassDecl::new(Pass::Hash)
                .read(&[Position, Velocity, State])
                .write(&[Predicted, Cells, Spatial]),
            PassDecl::new(Pass::Sort).write(&[Spatial]),
            PassDecl::new(Pass::Collect)
                .read(&[Spatial])
                .write(&[Cells]),
        ])
    }

    /// One XPBD substep.
    pub fn substep() -> Self {
        use Buffer::*;
        Self::new(vec![
            PassDecl::new(Pass::Predict)
                .read(&[Position, Velocity, State])
                .write(&[Predicted]),
            PassDecl::new(Pass::ObjectCollide)
                .read(&[Predicted, Radius, InvMass, State, Proxy])
                .write(&[Correction]),
            PassDecl::new(Pass::ParticleCollide)
                .read(&[Predicted, Radius, InvMass, State, Cells, Spatial])
                .accumulate(&[Correction]),
            PassDecl::new(Pass::Distance)
                .read(&[Predicted, InvMass, State, DistanceConstraints])
                .accumulate(&[FixedCorrection]),
            PassDecl::new(Pass::Volume)
                .read(&[Predicted, InvMass, State, VolumeConstraints])
                .accumulate(&[FixedCorrection]),
            PassDecl::new(Pass::Correct)
                .read(&[Correction, FixedCorrection])
                .write(&[
                    Predicted,
                    Position,
                    Velocity,
                    State,
                    InvMass,
                    Correction,
                    FixedCorrection,
                ]),
        ])
    }

    pub fn passes(&self) -> &[PassDecl] {
        &self.passes
    }

    pub fn stages(&self) -> impl Iterator<Item = &[PassDecl]> + '_ {
        self.stages.iter().map(|range| &self.passes[range.clone()])
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Pass kinds per stage.
    pub fn stage_passes(&self) -> Vec<Vec<Pass>> {
        self.stages()
            .map(|stage| stage.iter().map(|decl| decl.pass).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substep_barriers() {
        let graph = ComputeGraph::substep();
        assert_eq!(
            graph.stage_passes(),
            vec![
                vec![Pass::Predict],
                vec![Pass::ObjectCollide],
                vec![Pass::ParticleCollide, Pass::Distance, Pass::Volume],
                vec![Pass::Correct],
            ]
        );
    }

    #[test]
    fn test_step_barriers_serialize_broad_phase() {
        let graph = ComputeGraph::step();
        assert_eq!(graph.stage_count(), 5);
    }

    #[test]
    fn test_accumulators_share_a_stage() {
        let a = PassDecl::new(Pass::Distance).accumulate(&[Buffer::FixedCorrection]);
        let b = PassDecl::new(Pass::Volume).accumulate(&[Buffer::FixedCorrection]);
        let graph = ComputeGraph::new(vec![a, b]);
        assert_eq!(graph.stage_count(), 1);
    }

    #[test]
    fn test_read_after_accumulate_needs_barrier() {
        let a = PassDecl::new(Pass::Distance).accumulate(&[Buffer::FixedCorrection]);
        let b = PassDecl::new(Pass::Correct).read(&[Buffer::FixedCorrection]);
        assert!(a.conflicts_with(&b));
        assert_eq!(ComputeGraph::new(vec![a, b]).stage_count(), 2);
    }

    #[test]
    fn test_write_after_read_needs_barrier() {
        let a = PassDecl::new(Pass::Predict).read(&[Buffer::Position]);
        let b = PassDecl::new(Pass::Attach).write(&[Buffer::Position]);
        assert!(a.conflicts_with(&b));
    }
}
