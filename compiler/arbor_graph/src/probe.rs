//! The probe stack.
//!
//! Every node entered by internalization or specialization pushes a frame.
//! Re-entering a frozen node is caught directly by the cache; the stack
//! supplies the trace for that report. Past the configured depth the stack
//! is also scanned for a repeating tail, which catches recursion that keeps
//! building fresh nodes of the same shape.

use arbor_ir::Origin;

use crate::error::TraceEntry;
use crate::NodeId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ProbeMode {
    Intern,
    Specialize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProbeFrame {
    pub node: NodeId,
    pub kind: &'static str,
    pub origin: Option<Origin>,
    pub mode: ProbeMode,
    /// Structural fingerprint of the node when it was entered.
    pub fingerprint: u64,
}

impl ProbeFrame {
    fn same_shape(&self, other: &ProbeFrame) -> bool {
        self.mode == other.mode
            && self.kind == other.kind
            && self.origin == other.origin
            && self.fingerprint == other.fingerprint
    }

    fn trace_entry(&self) -> TraceEntry {
        TraceEntry {
            node: self.node,
            kind: self.kind,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ProbeStack {
    frames: Vec<ProbeFrame>,
}

impl ProbeStack {
    pub fn push(&mut self, frame: ProbeFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ProbeFrame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost internalization frame of `node`.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.frames
            .iter()
            .rposition(|f| f.node == node && f.mode == ProbeMode::Intern)
    }

    pub fn segment(&self, from: usize) -> &[ProbeFrame] {
        self.frames.get(from..).unwrap_or_default()
    }

    /// Trace of the frames from `from` to the top, closed by re-entering
    /// the first one.
    pub fn cycle_trace(&self, from: usize) -> Vec<TraceEntry> {
        let segment = self.segment(from);
        let mut trace: Vec<TraceEntry> = segment.iter().map(ProbeFrame::trace_entry).collect();
        if let Some(first) = segment.first() {
            trace.push(first.trace_entry());
        }
        trace
    }

    /// Length of a segment that repeats at least `min_repeats` times at the
    /// top of the stack, shortest first.
    ///
    /// Tries every segment length, so the scan is quadratic in the depth.
    /// It only runs once the stack is deeper than the configured limit.
    pub fn repeating_tail(&self, min_repeats: usize) -> Option<usize> {
        let min_repeats = min_repeats.max(2);
        let depth = self.frames.len();
        (1..=depth / min_repeats).find(|&len| {
            let top = &self.frames[depth - len..];
            (1..min_repeats).all(|copy| {
                let start = depth - (copy + 1) * len;
                self.frames[start..start + len]
                    .iter()
                    .zip(top)
                    .all(|(a, b)| a.same_shape(b))
            })
        })
    }

    /// Trace of the top `len` frames.
    pub fn tail_trace(&self, len: usize) -> Vec<TraceEntry> {
        let from = self.frames.len().saturating_sub(len);
        self.cycle_trace(from)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frame(node: u32, fingerprint: u64) -> ProbeFrame {
        ProbeFrame {
            node: NodeId::new(node),
            kind: "apply",
            origin: Some(Origin::new(1)),
            mode: ProbeMode::Specialize,
            fingerprint,
        }
    }

    #[test]
    fn finds_shortest_repeating_tail() {
        let mut stack = ProbeStack::default();
        stack.push(frame(0, 99));
        for i in 0..6 {
            stack.push(frame(i + 1, u64::from(i % 2)));
        }
        assert_eq!(stack.repeating_tail(2), Some(2));
        assert_eq!(stack.repeating_tail(3), Some(2));
        assert_eq!(stack.repeating_tail(4), None);
    }

    #[test]
    fn distinct_frames_do_not_repeat() {
        let mut stack = ProbeStack::default();
        for i in 0..10 {
            stack.push(frame(i, u64::from(i)));
        }
        assert_eq!(stack.repeating_tail(2), None);
    }

    #[test]
    fn cycle_trace_closes_loop() {
        let mut stack = ProbeStack::default();
        for i in 0..3 {
            stack.push(ProbeFrame {
                mode: ProbeMode::Intern,
                ..frame(i, u64::from(i))
            });
        }
        assert_eq!(stack.position(NodeId::new(1)), Some(1));
        let nodes: Vec<NodeId> = stack.cycle_trace(1).iter().map(|e| e.node).collect();
        assert_eq!(nodes, vec![NodeId::new(1), NodeId::new(2), NodeId::new(1)]);
    }
}
