//! Instruction set of the linear control-flow graph.

use crate::offset::{ControlFlowOffset, OffsetTable};
use crate::place::{PlaceValue, SpecialField, StablePlace};
use crate::trap::ControlTransfer;
use df_core::ast::{MethodId, NodeId, PrimitiveTy, Ty};
use df_core::types::{DfType, RelationType};
use df_core::Result;
use serde::{Deserialize, Serialize};

/// Source construct an instruction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Anchor {
    Expr(NodeId),
    /// Intermediate result of a polyadic expression, after operand `last_operand`.
    PolyadicPart { node: NodeId, last_operand: usize },
    /// "This switch label was taken" test.
    SwitchLabel(NodeId),
}

impl Anchor {
    pub fn node(&self) -> NodeId {
        match self {
            Anchor::Expr(node) | Anchor::SwitchLabel(node) => *node,
            Anchor::PolyadicPart { node, .. } => *node,
        }
    }
}

/// Why a null check fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NullabilityProblem {
    CallReceiver,
    FieldAccess,
    ArrayAccess,
    Unboxing,
    ThrowOperand,
    IteratedValue,
    MonitorLock,
    SwitchSelector,
    NonNullParameter,
    NullableFunctionReturn,
    /// Explicitly suppressed for this node.
    NoProblem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumericOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PushValue {
    Place(PlaceValue),
    Value(DfType),
    /// A pending transfer kept on the stack while an inlined block runs.
    Transfer(ControlTransfer),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstructionKind {
    /// Push a value; `for_write` marks an assignment destination.
    Push {
        value: PushValue,
        for_write: bool,
    },
    Pop,
    Dup,
    Swap,
    /// Pop `count` values (index 0 is the top) and push the listed ones, last listed on top.
    Splice {
        count: usize,
        replacement: Vec<usize>,
    },
    /// Pop a value and jump when it matches `compare`.
    ConditionalGoto {
        target: ControlFlowOffset,
        compare: DfType,
    },
    Goto {
        target: ControlFlowOffset,
    },
    /// Pop value and destination, store, push the value back.
    Assign {
        target: Option<PlaceValue>,
    },
    /// Store the top value into `target` leaving it on the stack.
    SimpleAssign {
        target: PlaceValue,
    },
    Flush {
        place: PlaceValue,
    },
    FlushFields,
    /// Places become reachable from a closure.
    Escape {
        places: Vec<StablePlace>,
    },
    /// Closure bodies the interpreter analyzes separately.
    Closure {
        bodies: Vec<NodeId>,
    },
    /// Pop arguments and receiver (when `receiver`), push the result.
    Call {
        method: Option<MethodId>,
        arg_count: usize,
        receiver: bool,
        result: DfType,
        /// Place the result is known to equal, for resolved getters.
        precalculated: Option<PlaceValue>,
    },
    MethodReference {
        method: Option<MethodId>,
    },
    /// Check `top <relation> compare`; on failure take `transfer`. The value stays on the stack.
    Ensure {
        relation: RelationType,
        compare: DfType,
        transfer: Option<ControlTransfer>,
        message: String,
    },
    CheckNotNull {
        problem: NullabilityProblem,
        transfer: Option<ControlTransfer>,
    },
    Throw {
        transfer: ControlTransfer,
    },
    /// The preceding operation may raise the exception of `transfer`.
    MayThrow {
        transfer: ControlTransfer,
    },
    ControlTransfer {
        transfer: ControlTransfer,
        /// Number of traps enclosing the jump site.
        trap_depth: usize,
    },
    /// Pop a type and a value, push whether the value is an instance of the type.
    InstanceOf,
    /// Pop a value of primitive type `from`, push whether it converts to `to` without loss.
    ExactConversionTest {
        from: PrimitiveTy,
        to: PrimitiveTy,
    },
    TypeCast {
        ty: Ty,
        transfer: Option<ControlTransfer>,
    },
    PrimitiveConversion {
        to: PrimitiveTy,
    },
    Unwrap {
        field: SpecialField,
    },
    Wrap {
        ty: Ty,
        field: SpecialField,
    },
    NumericBinary {
        op: NumericOp,
    },
    StringConcat,
    BooleanBinary {
        relation: RelationType,
    },
    /// Non short-circuit `&` or `|` on booleans.
    BooleanAndOr {
        or: bool,
    },
    Not,
    ArrayAccess {
        transfer: Option<ControlTransfer>,
        element: Option<PlaceValue>,
    },
    ArrayStore {
        transfer: Option<ControlTransfer>,
        element: Option<PlaceValue>,
    },
    /// Collect the top `count` values into an array (variable arity arguments).
    FoldArray {
        count: usize,
        ty: Ty,
    },
    /// Pop `arg_count` values and push something unknown.
    EvalUnknown {
        arg_count: usize,
        ty: Ty,
    },
    /// Marks the top value as the result of the anchor.
    ResultOf,
    /// A node finished; `flush` lists temps that go out of scope.
    FinishElement {
        node: Option<NodeId>,
        flush: Vec<PlaceValue>,
    },
    EndOfInitializer,
    /// Leave the fragment normally.
    Return {
        transfer: ControlTransfer,
    },
}

/// Values popped and pushed by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEffect {
    pub pops: usize,
    pub pushes: usize,
}

impl StackEffect {
    const fn new(pops: usize, pushes: usize) -> Self {
        Self { pops, pushes }
    }

    pub fn delta(&self) -> isize {
        self.pushes as isize - self.pops as isize
    }
}

impl InstructionKind {
    pub fn stack_effect(&self) -> StackEffect {
        use InstructionKind::*;
        match self {
            Push { .. } => StackEffect::new(0, 1),
            Pop => StackEffect::new(1, 0),
            Dup => StackEffect::new(1, 2),
            Swap => StackEffect::new(2, 2),
            Splice { count, replacement } => StackEffect::new(*count, replacement.len()),
            ConditionalGoto { .. } => StackEffect::new(1, 0),
            Goto { .. } => StackEffect::new(0, 0),
            Assign { .. } => StackEffect::new(2, 1),
            SimpleAssign { .. } => StackEffect::new(1, 1),
            Flush { .. } | FlushFields | Escape { .. } | Closure { .. } => StackEffect::new(0, 0),
            Call {
                arg_count,
                receiver,
                ..
            } => StackEffect::new(arg_count + usize::from(*receiver), 1),
            MethodReference { .. } => StackEffect::new(1, 1),
            Ensure { .. } | CheckNotNull { .. } => StackEffect::new(1, 1),
            Throw { .. } | MayThrow { .. } | InstructionKind::ControlTransfer { .. } | Return { .. } => {
                StackEffect::new(0, 0)
            }
            InstanceOf => StackEffect::new(2, 1),
            ExactConversionTest { .. } => StackEffect::new(1, 1),
            TypeCast { .. } | PrimitiveConversion { .. } | Unwrap { .. } | Wrap { .. } => {
                StackEffect::new(1, 1)
            }
            NumericBinary { .. } | StringConcat | BooleanBinary { .. } | BooleanAndOr { .. } => {
                StackEffect::new(2, 1)
            }
            Not => StackEffect::new(1, 1),
            ArrayAccess { .. } => StackEffect::new(2, 1),
            ArrayStore { .. } => StackEffect::new(3, 1),
            FoldArray { count, .. } => StackEffect::new(*count, 1),
            EvalUnknown { arg_count, .. } => StackEffect::new(*arg_count, 1),
            ResultOf => StackEffect::new(1, 1),
            FinishElement { .. } | EndOfInitializer => StackEffect::new(0, 0),
        }
    }

    pub fn name(&self) -> &'static str {
        use InstructionKind::*;
        match self {
            Push { for_write: true, .. } => "push_for_write",
            Push { .. } => "push",
            Pop => "pop",
            Dup => "dup",
            Swap => "swap",
            Splice { .. } => "splice",
            ConditionalGoto { .. } => "cond_goto",
            Goto { .. } => "goto",
            Assign { .. } => "assign",
            SimpleAssign { .. } => "simple_assign",
            Flush { .. } => "flush",
            FlushFields => "flush_fields",
            Escape { .. } => "escape",
            Closure { .. } => "closure",
            Call { .. } => "call",
            MethodReference { .. } => "method_ref",
            Ensure { .. } => "ensure",
            CheckNotNull { .. } => "check_not_null",
            Throw { .. } => "throw",
            MayThrow { .. } => "may_throw",
            InstructionKind::ControlTransfer { .. } => "transfer",
            InstanceOf => "instanceof",
            ExactConversionTest { .. } => "exact_conversion",
            TypeCast { .. } => "cast",
            PrimitiveConversion { .. } => "convert",
            Unwrap { .. } => "unwrap",
            Wrap { .. } => "wrap",
            NumericBinary { .. } => "numeric",
            StringConcat => "concat",
            BooleanBinary { .. } => "compare",
            BooleanAndOr { .. } => "and_or",
            Not => "not",
            ArrayAccess { .. } => "array_load",
            ArrayStore { .. } => "array_store",
            FoldArray { .. } => "fold_array",
            EvalUnknown { .. } => "eval_unknown",
            ResultOf => "result_of",
            FinishElement { .. } => "finish",
            EndOfInitializer => "end_of_initializer",
            Return { .. } => "return",
        }
    }

    /// The transfer this instruction may take, if any.
    pub fn transfer(&self) -> Option<&ControlTransfer> {
        use InstructionKind::*;
        match self {
            Push {
                value: PushValue::Transfer(transfer),
                ..
            }
            | Throw { transfer }
            | MayThrow { transfer }
            | InstructionKind::ControlTransfer { transfer, .. }
            | Return { transfer } => Some(transfer),
            Ensure { transfer, .. }
            | CheckNotNull { transfer, .. }
            | TypeCast { transfer, .. }
            | ArrayAccess { transfer, .. }
            | ArrayStore { transfer, .. } => transfer.as_ref(),
            _ => None,
        }
    }

    fn transfer_mut(&mut self) -> Option<&mut ControlTransfer> {
        use InstructionKind::*;
        match self {
            Push {
                value: PushValue::Transfer(transfer),
                ..
            }
            | Throw { transfer }
            | MayThrow { transfer }
            | InstructionKind::ControlTransfer { transfer, .. }
            | Return { transfer } => Some(transfer),
            Ensure { transfer, .. }
            | CheckNotNull { transfer, .. }
            | TypeCast { transfer, .. }
            | ArrayAccess { transfer, .. }
            | ArrayStore { transfer, .. } => transfer.as_mut(),
            _ => None,
        }
    }

    /// Every branch target mentioned by this instruction, including trap handlers.
    pub fn offsets(&self) -> Vec<ControlFlowOffset> {
        let mut offsets = match self {
            InstructionKind::ConditionalGoto { target, .. } | InstructionKind::Goto { target } => {
                vec![*target]
            }
            _ => Vec::new(),
        };
        if let Some(transfer) = self.transfer() {
            offsets.extend(transfer.offsets());
        }
        offsets
    }

    pub(crate) fn finalize(&mut self, table: &OffsetTable) -> Result<()> {
        match self {
            InstructionKind::ConditionalGoto { target, .. } | InstructionKind::Goto { target } => {
                target.finalize(table)?
            }
            _ => {}
        }
        if let Some(transfer) = self.transfer_mut() {
            transfer.finalize(table)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub index: usize,
    pub kind: InstructionKind,
    pub anchor: Option<Anchor>,
}

impl Instruction {
    pub fn stack_effect(&self) -> StackEffect {
        self.kind.stack_effect()
    }

    /// A jump to this instruction's own position or earlier.
    pub fn is_back_edge(&self) -> bool {
        match &self.kind {
            InstructionKind::Goto { target } | InstructionKind::ConditionalGoto { target, .. } => {
                target.index().is_some_and(|t| t <= self.index)
            }
            _ => false,
        }
    }

    pub fn pushed_place(&self) -> Option<&StablePlace> {
        match &self.kind {
            InstructionKind::Push {
                value: PushValue::Place(value),
                ..
            } => Some(&value.place),
            _ => None,
        }
    }
}
