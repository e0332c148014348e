use crate::inst::{Anchor, InstructionKind};
use df_core::ast::NodeId;
use df_core::Result;

/// Observer of a build in progress.
///
/// Both hooks run synchronously; an error aborts the build and is returned to
/// the caller unchanged.
pub trait FlowListener {
    /// Called before an anchored instruction that leaves a value on the stack is appended.
    fn before_push(&mut self, anchor: &Anchor, instruction: &InstructionKind) -> Result<()> {
        let _ = (anchor, instruction);
        Ok(())
    }

    /// Called before a value leaves `scope`: the fragment root or an inlined lambda.
    fn before_return(&mut self, scope: NodeId) -> Result<()> {
        let _ = scope;
        Ok(())
    }
}

/// Listener that keeps every notification, in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    pub pushes: Vec<(Anchor, &'static str)>,
    pub returns: Vec<NodeId>,
}

impl FlowListener for RecordingListener {
    fn before_push(&mut self, anchor: &Anchor, instruction: &InstructionKind) -> Result<()> {
        self.pushes.push((*anchor, instruction.name()));
        Ok(())
    }

    fn before_return(&mut self, scope: NodeId) -> Result<()> {
        self.returns.push(scope);
        Ok(())
    }
}
