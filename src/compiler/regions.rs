//! Region sentinels and the two-state region machine.
//!
//! An unsafe region is delimited by two calls to side-effecting inline assembly whose
//! templates are recognised by exact match. Every late stage walks blocks with the same
//! machine: `begin` moves to [`RegionState::Inside`], `end` moves back to
//! [`RegionState::Outside`], and the sentinels themselves are never reported as region
//! contents.
//!
//! ```text
//! Outside --begin--> Inside
//! Inside  --end----> Outside
//! ```
//!
//! A `begin` while already inside and an `end` while outside are ignored.

use crate::ir::{BasicBlock, Callee, Function, InlineAsm, Instruction, Op};

/// Inline assembly template of the region-begin sentinel.
pub const MARKER_BEGIN: &str = "nop # marker_begin";
/// Inline assembly template of the region-end sentinel.
pub const MARKER_END: &str = "nop # marker_end";

/// Which sentinel an instruction is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerKind {
    /// Opens a region.
    Begin,
    /// Closes a region.
    End,
}

impl MarkerKind {
    /// Classifies an instruction as a sentinel, if it is one.
    #[must_use]
    pub fn of(inst: &Instruction) -> Option<Self> {
        Self::of_op(inst.op())
    }

    /// Classifies an operation as a sentinel, if it is one.
    #[must_use]
    pub fn of_op(op: &Op) -> Option<Self> {
        let Op::Call {
            callee: Callee::Asm(asm),
            ..
        } = op
        else {
            return None;
        };
        match asm.template.as_str() {
            MARKER_BEGIN => Some(MarkerKind::Begin),
            MARKER_END => Some(MarkerKind::End),
            _ => None,
        }
    }

    /// Returns the assembly template.
    #[must_use]
    pub const fn template(self) -> &'static str {
        match self {
            MarkerKind::Begin => MARKER_BEGIN,
            MarkerKind::End => MARKER_END,
        }
    }

    /// Returns the side-effecting inline assembly for this sentinel.
    #[must_use]
    pub fn inline_asm(self) -> InlineAsm {
        InlineAsm::new(self.template(), true)
    }
}

/// Whether the walk is currently inside a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionState {
    /// Not inside a region.
    #[default]
    Outside,
    /// Between a `begin` and its `end`.
    Inside,
}

impl RegionState {
    /// Applies a sentinel.
    #[must_use]
    pub fn step(self, marker: MarkerKind) -> Self {
        match (self, marker) {
            (RegionState::Outside, MarkerKind::Begin) => RegionState::Inside,
            (RegionState::Inside, MarkerKind::End) => RegionState::Outside,
            (state, _) => state,
        }
    }

    /// Returns true inside a region.
    #[must_use]
    pub fn is_inside(self) -> bool {
        self == RegionState::Inside
    }
}

/// Iterator over a block body that tracks region state and hides the sentinels.
///
/// Yields `(body index, instruction, inside)` for every non-sentinel instruction. The
/// terminator is not visited; sentinels never sit after it.
pub struct RegionScan<'a> {
    body: std::iter::Enumerate<std::slice::Iter<'a, Instruction>>,
    state: RegionState,
}

impl<'a> RegionScan<'a> {
    /// Starts scanning a body in the given state.
    #[must_use]
    pub fn new(body: &'a [Instruction], state: RegionState) -> Self {
        Self {
            body: body.iter().enumerate(),
            state,
        }
    }

    /// Returns the state after everything yielded so far.
    #[must_use]
    pub fn state(&self) -> RegionState {
        self.state
    }
}

impl<'a> Iterator for RegionScan<'a> {
    type Item = (usize, &'a Instruction, bool);

    fn next(&mut self) -> Option<Self::Item> {
        for (index, inst) in self.body.by_ref() {
            if let Some(marker) = MarkerKind::of(inst) {
                self.state = self.state.step(marker);
                continue;
            }
            return Some((index, inst, self.state.is_inside()));
        }
        None
    }
}

/// Scans a block body starting outside any region.
#[must_use]
pub fn scan_block(block: &BasicBlock) -> RegionScan<'_> {
    RegionScan::new(block.instructions(), RegionState::Outside)
}

/// A paired or dangling `begin` found in a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSpan {
    /// Body index of the `begin` sentinel.
    pub begin: usize,
    /// Body index of the matching `end`, if the region is closed in this block.
    pub end: Option<usize>,
}

/// Pairs sentinels in a body. The first `begin` pairs with the next `end`; a `begin` seen
/// while a region is already open is ignored.
#[must_use]
pub fn region_spans(body: &[Instruction]) -> Vec<RegionSpan> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;

    for (index, inst) in body.iter().enumerate() {
        match MarkerKind::of(inst) {
            Some(MarkerKind::Begin) if open.is_none() => open = Some(index),
            Some(MarkerKind::End) => {
                if let Some(begin) = open.take() {
                    spans.push(RegionSpan {
                        begin,
                        end: Some(index),
                    });
                }
            }
            _ => {}
        }
    }

    if let Some(begin) = open {
        spans.push(RegionSpan { begin, end: None });
    }
    spans
}

/// Returns true if the block body contains any sentinel.
#[must_use]
pub fn has_markers(block: &BasicBlock) -> bool {
    block
        .instructions()
        .iter()
        .any(|inst| MarkerKind::of(inst).is_some())
}

/// Returns true if any unsafe-tagged instruction of the function sits inside a region.
///
/// Region state carries across block boundaries in layout order.
#[must_use]
pub fn function_has_unsafe_in_region(func: &Function) -> bool {
    let mut state = RegionState::Outside;
    for block in func.blocks() {
        let mut scan = RegionScan::new(block.instructions(), state);
        if scan
            .by_ref()
            .any(|(_, inst, inside)| inside && inst.is_unsafe())
        {
            return true;
        }
        state = scan.state();
    }
    false
}

/// Checks that sentinels in a block alternate `begin`, `end` and that none is left open.
#[must_use]
pub fn check_balance(block: &BasicBlock) -> bool {
    let mut state = RegionState::Outside;
    for inst in block.instructions() {
        match (state, MarkerKind::of(inst)) {
            (RegionState::Outside, Some(MarkerKind::Begin)) => state = RegionState::Inside,
            (RegionState::Inside, Some(MarkerKind::End)) => state = RegionState::Outside,
            (_, Some(_)) => return false,
            _ => {}
        }
    }
    state == RegionState::Outside
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BlockId, FunctionType, IrBuilder, Type, Value};

    fn block_with(markers: &[Option<MarkerKind>]) -> Function {
        let mut func = Function::new("f", FunctionType::new(Type::Void, vec![Type::Ptr]));
        let entry = func.add_block("entry", Op::Ret { value: None });
        let mut builder = IrBuilder::at_end(&mut func, entry).unwrap();
        for marker in markers {
            match marker {
                Some(kind) => {
                    builder.call_asm(kind.inline_asm());
                }
                None => {
                    builder.load(Type::I32, Value::Arg(0));
                }
            }
        }
        func
    }

    #[test]
    fn test_marker_recognition() {
        let func = block_with(&[Some(MarkerKind::Begin), None, Some(MarkerKind::End)]);
        let body = func.blocks()[0].instructions();
        assert_eq!(MarkerKind::of(&body[0]), Some(MarkerKind::Begin));
        assert_eq!(MarkerKind::of(&body[1]), None);
        assert_eq!(MarkerKind::of(&body[2]), Some(MarkerKind::End));

        // Templates are matched exactly
        let mut other = Function::new("g", FunctionType::void());
        let entry = other.add_block("entry", Op::Ret { value: None });
        IrBuilder::at_end(&mut other, entry)
            .unwrap()
            .call_asm(InlineAsm::new("nop # marker_begin ", true));
        assert_eq!(MarkerKind::of(&other.blocks()[0].instructions()[0]), None);
    }

    #[test]
    fn test_state_machine() {
        let state = RegionState::Outside;
        assert_eq!(state.step(MarkerKind::End), RegionState::Outside);
        let inside = state.step(MarkerKind::Begin);
        assert!(inside.is_inside());
        assert_eq!(inside.step(MarkerKind::Begin), RegionState::Inside);
        assert_eq!(inside.step(MarkerKind::End), RegionState::Outside);
    }

    #[test]
    fn test_scan_hides_markers() {
        let func = block_with(&[
            None,
            Some(MarkerKind::Begin),
            None,
            None,
            Some(MarkerKind::End),
            None,
        ]);
        let seen: Vec<(usize, bool)> = scan_block(&func.blocks()[0])
            .map(|(index, _, inside)| (index, inside))
            .collect();
        assert_eq!(seen, vec![(0, false), (2, true), (3, true), (5, false)]);
    }

    #[test]
    fn test_region_spans() {
        let func = block_with(&[
            Some(MarkerKind::Begin),
            Some(MarkerKind::Begin),
            None,
            Some(MarkerKind::End),
            Some(MarkerKind::End),
            Some(MarkerKind::Begin),
        ]);
        let spans = region_spans(func.blocks()[0].instructions());
        assert_eq!(
            spans,
            vec![
                RegionSpan {
                    begin: 0,
                    end: Some(3)
                },
                RegionSpan {
                    begin: 5,
                    end: None
                },
            ]
        );
    }

    #[test]
    fn test_balance() {
        let balanced = block_with(&[Some(MarkerKind::Begin), None, Some(MarkerKind::End)]);
        assert!(check_balance(&balanced.blocks()[0]));

        let open = block_with(&[Some(MarkerKind::Begin), None]);
        assert!(!check_balance(&open.blocks()[0]));

        let stray = block_with(&[None, Some(MarkerKind::End)]);
        assert!(!check_balance(&stray.blocks()[0]));

        let empty = block_with(&[None]);
        assert!(check_balance(&empty.blocks()[0]));
        assert!(!has_markers(&empty.blocks()[0]));
    }

    #[test]
    fn test_unsafe_in_region_spans_blocks() {
        let mut func = Function::new("f", FunctionType::new(Type::Void, vec![Type::Ptr]));
        let first = func.add_block(
            "entry",
            Op::Br {
                target: BlockId::new(1),
            },
        );
        let second = func.add_block("exit", Op::Ret { value: None });

        IrBuilder::at_end(&mut func, first)
            .unwrap()
            .call_asm(MarkerKind::Begin.inline_asm());
        assert!(!function_has_unsafe_in_region(&func));

        let mut builder = IrBuilder::at_end(&mut func, second).unwrap();
        builder.set_unsafe(true);
        builder.load(Type::I32, Value::Arg(0));
        assert!(function_has_unsafe_in_region(&func));
    }

    #[test]
    fn test_unsafe_outside_region_is_ignored() {
        let mut func = Function::new("f", FunctionType::new(Type::Void, vec![Type::Ptr]));
        let entry = func.add_block("entry", Op::Ret { value: None });
        let mut builder = IrBuilder::at_end(&mut func, entry).unwrap();
        builder.set_unsafe(true);
        builder.load(Type::I32, Value::Arg(0));
        assert!(!function_has_unsafe_in_region(&func));
    }
}
