use crate::inst::{Anchor, Instruction, InstructionKind};
use crate::offset::{ControlFlowOffset, OffsetTable};
use crate::place::{StablePlace, TempId, TempVar};
use df_core::ast::{NodeId, Ty};
use df_core::diagnostics::Diagnostic;
use df_core::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;

/// Instruction arena of a build in progress, with node offset bookkeeping.
///
/// A node may be visited more than once (unrolled loop bodies). Lookups of a
/// node's start return its latest start while the node is open and a fresh
/// placeholder otherwise; end lookups of an open node are always deferred.
#[derive(Debug, Default)]
pub struct FlowBuffer {
    instructions: Vec<Instruction>,
    offsets: OffsetTable,
    first_starts: HashMap<NodeId, usize>,
    latest_starts: HashMap<NodeId, usize>,
    ends: HashMap<NodeId, usize>,
    pending_starts: HashMap<NodeId, ControlFlowOffset>,
    pending_ends: HashMap<NodeId, ControlFlowOffset>,
    open: HashMap<NodeId, usize>,
    temps: Vec<TempVar>,
}

impl FlowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn push(&mut self, kind: InstructionKind, anchor: Option<Anchor>) -> usize {
        let index = self.instructions.len();
        self.instructions.push(Instruction {
            index,
            kind,
            anchor,
        });
        index
    }

    pub fn defer(&mut self) -> ControlFlowOffset {
        self.offsets.defer()
    }

    /// Bind a placeholder to the next instruction position.
    pub fn bind_here(&mut self, offset: ControlFlowOffset) {
        let here = self.instructions.len();
        self.offsets.bind(offset, here);
    }

    pub fn here(&self) -> ControlFlowOffset {
        ControlFlowOffset::Resolved(self.instructions.len())
    }

    pub fn is_open(&self, node: NodeId) -> bool {
        self.open.get(&node).is_some_and(|count| *count > 0)
    }

    pub fn start_element(&mut self, node: NodeId) {
        let here = self.instructions.len();
        if let Some(pending) = self.pending_starts.remove(&node) {
            self.offsets.bind(pending, here);
        }
        self.first_starts.entry(node).or_insert(here);
        self.latest_starts.insert(node, here);
        *self.open.entry(node).or_insert(0) += 1;
    }

    pub fn finish_element(&mut self, node: NodeId) {
        let here = self.instructions.len();
        if let Some(pending) = self.pending_ends.remove(&node) {
            self.offsets.bind(pending, here);
        }
        self.ends.insert(node, here);
        if let Some(count) = self.open.get_mut(&node) {
            *count = count.saturating_sub(1);
        }
    }

    pub fn start_offset(&mut self, node: NodeId) -> ControlFlowOffset {
        if self.is_open(node) {
            if let Some(start) = self.latest_starts.get(&node) {
                return ControlFlowOffset::Resolved(*start);
            }
        }
        if let Some(pending) = self.pending_starts.get(&node) {
            return *pending;
        }
        let pending = self.offsets.defer();
        self.pending_starts.insert(node, pending);
        pending
    }

    pub fn end_offset(&mut self, node: NodeId) -> ControlFlowOffset {
        if !self.is_open(node) {
            if let Some(end) = self.ends.get(&node) {
                return ControlFlowOffset::Resolved(*end);
            }
        }
        if let Some(pending) = self.pending_ends.get(&node) {
            return *pending;
        }
        let pending = self.offsets.defer();
        self.pending_ends.insert(node, pending);
        pending
    }

    pub fn latest_start(&self, node: NodeId) -> Option<usize> {
        self.latest_starts.get(&node).copied()
    }

    pub fn create_temp(&mut self, ty: Ty) -> TempId {
        let id = TempId(self.temps.len() as u32);
        self.temps.push(TempVar {
            id,
            ty,
            location: self.instructions.len(),
        });
        id
    }

    /// Temps created since instruction `start`.
    pub fn temps_since(&self, start: usize) -> Vec<TempId> {
        self.temps
            .iter()
            .filter(|temp| temp.location >= start)
            .map(|temp| temp.id)
            .collect()
    }

    pub fn temp_count(&self) -> usize {
        self.temps.len()
    }

    /// Resolve every placeholder, check branch ranges and freeze the flow.
    pub fn finalize(self, diagnostics: Vec<Diagnostic>) -> Result<Flow> {
        let FlowBuffer {
            mut instructions,
            offsets,
            first_starts,
            ends,
            temps,
            ..
        } = self;
        for instruction in &mut instructions {
            instruction.kind.finalize(&offsets)?;
        }
        if let Some(unbound) = offsets.unresolved().next() {
            return Err(Error::UnresolvedOffset {
                placeholder: unbound.0,
            });
        }
        let count = instructions.len();
        for instruction in &instructions {
            for offset in instruction.kind.offsets() {
                match offset.index() {
                    Some(index) if index < count => {}
                    _ => df_core::bail!(
                        "instruction {} branches outside the flow: {}",
                        instruction.index,
                        offset
                    ),
                }
            }
        }
        let ranges = first_starts
            .into_iter()
            .filter_map(|(node, start)| ends.get(&node).map(|end| (node, (start, *end))))
            .collect();
        Ok(Flow {
            instructions,
            ranges,
            temps,
            diagnostics,
        })
    }
}

/// A finished, fully resolved instruction sequence plus its node index.
#[derive(Debug, Clone, Serialize)]
pub struct Flow {
    instructions: Vec<Instruction>,
    ranges: HashMap<NodeId, (usize, usize)>,
    temps: Vec<TempVar>,
    diagnostics: Vec<Diagnostic>,
}

impl Flow {
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// # Panics
    ///
    /// When `index` is not below [`Flow::instruction_count`]; use [`Flow::get`]
    /// for indices that may be out of range.
    pub fn instruction(&self, index: usize) -> &Instruction {
        &self.instructions[index]
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// First instruction emitted for `node`.
    pub fn start_offset(&self, node: NodeId) -> Option<usize> {
        self.ranges.get(&node).map(|range| range.0)
    }

    /// Position right after the last instruction emitted for `node`.
    pub fn end_offset(&self, node: NodeId) -> Option<usize> {
        self.ranges.get(&node).map(|range| range.1)
    }

    /// Temps introduced while `node` was being translated.
    pub fn synthetics(&self, node: NodeId) -> Vec<StablePlace> {
        let Some((start, end)) = self.ranges.get(&node).copied() else {
            return Vec::new();
        };
        self.temps
            .iter()
            .filter(|temp| temp.location >= start && temp.location < end)
            .map(|temp| StablePlace::Temp(temp.id))
            .collect()
    }

    pub fn temps(&self) -> &[TempVar] {
        &self.temps
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
