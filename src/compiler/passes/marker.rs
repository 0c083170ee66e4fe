//! Region marking pass.
//!
//! Brackets the unsafe-tagged instructions of every block with a pair of sentinels so the
//! region boundaries survive optimization. The sentinels are calls to side-effecting inline
//! assembly, which no optimizer may delete, merge or move across.
//!
//! Before placing sentinels the pass captures source provenance: each unsafe-tagged
//! instruction with a usable debug location gets an [`UnsafeLineInfo`] annotation, which
//! later stages read even after the location itself was dropped.
//!
//! # Placement
//!
//! Per block, with `first` and `last` the first and last tagged instruction over the body
//! and the terminator:
//!
//! ```text
//! before:  a  [u1]  b  [u2]  c  ret
//! after:   a  begin  [u1]  b  [u2]  end  c  ret
//! ```
//!
//! Safe instructions between the first and last tagged one end up inside the region. When
//! `last` is the terminator, `end` goes right before it.
//!
//! Only PHIs may precede a PHI, so a tagged PHI never opens the region. `begin` then goes
//! after the block's leading PHIs, and if every tagged instruction is a PHI the region is
//! empty and sits at that same point:
//!
//! ```text
//! before:  [p1]  [u1]  ret
//! after:   [p1]  begin  [u1]  end  ret
//! ```

use crate::{
    compiler::{
        regions::{self, MarkerKind},
        EventKind, EventLog, InstrumentContext, InstrumentPass,
    },
    ir::{BlockId, Function, InstId, IrBuilder, UnsafeLineInfo},
    Result,
};

/// The first and last tagged instruction of a block.
struct TaggedSpan {
    block: BlockId,
    first: InstId,
    last: InstId,
    first_is_terminator: bool,
    last_is_terminator: bool,
    first_is_phi: bool,
    last_is_phi: bool,
}

/// Inserts region sentinels around unsafe-tagged instructions.
pub struct RegionMarkerPass;

impl Default for RegionMarkerPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionMarkerPass {
    /// Creates a new region marker pass.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Attaches provenance to tagged instructions that carry a usable location and have
    /// none yet. Returns the number of annotations added.
    fn capture_line_info(func: &mut Function, changes: &EventLog) -> usize {
        let name = func.name().to_string();
        let mut captured = 0;

        for block in func.blocks_mut() {
            let block_index = block.id().index();
            for inst in block.iter_all_mut() {
                if !inst.is_unsafe() || inst.line_info().is_some() {
                    continue;
                }
                let Some(info) = inst.debug_loc().and_then(UnsafeLineInfo::from_debug_loc) else {
                    continue;
                };
                changes
                    .record(EventKind::LineInfoCaptured)
                    .at(name.as_str(), block_index)
                    .message(format!("{} captured {info}", inst.id()));
                inst.set_line_info(info);
                captured += 1;
            }
        }

        captured
    }

    fn find_spans(func: &Function) -> Vec<TaggedSpan> {
        func.blocks()
            .iter()
            .filter(|block| !regions::has_markers(block))
            .filter_map(|block| {
                let terminator = block.terminator().id();
                let mut tagged = block.iter_all().filter(|inst| inst.is_unsafe());
                let first = tagged.next()?;
                let last = tagged.last().unwrap_or(first);
                Some(TaggedSpan {
                    block: block.id(),
                    first: first.id(),
                    last: last.id(),
                    first_is_terminator: first.id() == terminator,
                    last_is_terminator: last.id() == terminator,
                    first_is_phi: first.op().is_phi(),
                    last_is_phi: last.op().is_phi(),
                })
            })
            .collect()
    }

    fn mark(func: &mut Function, span: &TaggedSpan) -> Result<()> {
        let mut end_builder = if span.last_is_phi {
            IrBuilder::at_first_non_phi(func, span.block)?
        } else if span.last_is_terminator {
            IrBuilder::before_in(func, span.block, span.last)?
        } else {
            IrBuilder::after_in(func, span.block, span.last)?
        };
        let end = end_builder.call_asm(MarkerKind::End.inline_asm());

        // `end` is not a PHI, so this lands in front of it at the latest
        if span.first_is_phi {
            IrBuilder::at_first_non_phi(func, span.block)?
                .call_asm(MarkerKind::Begin.inline_asm());
            return Ok(());
        }

        // A tagged terminator alone yields an empty region in front of it
        let begin_anchor = if span.first_is_terminator {
            end
        } else {
            span.first
        };
        IrBuilder::before_in(func, span.block, begin_anchor)?
            .call_asm(MarkerKind::Begin.inline_asm());
        Ok(())
    }
}

impl InstrumentPass for RegionMarkerPass {
    fn name(&self) -> &'static str {
        "region-marker"
    }

    fn description(&self) -> &'static str {
        "Brackets unsafe instructions with optimization-proof sentinels"
    }

    fn run_on_function(&self, func: &mut Function, ctx: &InstrumentContext) -> Result<bool> {
        if !ctx.is_primary_unit() {
            return Ok(false);
        }

        let changes = EventLog::new();
        Self::capture_line_info(func, &changes);

        let spans = Self::find_spans(func);
        for span in &spans {
            Self::mark(func, span)?;
            changes
                .record(EventKind::RegionMarked)
                .at(func.name(), span.block.index())
                .message(format!("region {}..{}", span.first, span.last));
        }
        if !spans.is_empty() {
            log::debug!("{}: marked {} region(s)", func.name(), spans.len());
        }

        let changed = !changes.is_empty();
        if changed {
            ctx.events.merge(&changes);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::regions::{check_balance, MARKER_BEGIN, MARKER_END},
        ir::{Op, Type, Value, Verifier},
        test::{
            dependency_context, loc, phi_function, primary_context, safe_function,
            scenario_function,
        },
    };

    fn templates(func: &Function) -> Vec<String> {
        func.blocks()[0]
            .iter_all()
            .map(|inst| match MarkerKind::of(inst) {
                Some(kind) => kind.template().to_string(),
                None => inst.op().mnemonic().to_string(),
            })
            .collect()
    }

    #[test]
    fn test_marks_mixed_block() {
        let mut func = scenario_function("mixed");
        let ctx = primary_context();

        assert!(RegionMarkerPass::new().run_on_function(&mut func, &ctx).unwrap());
        assert_eq!(
            templates(&func),
            vec!["add", MARKER_BEGIN, "load", "add", "store", MARKER_END, "ret"]
        );
        assert!(check_balance(&func.blocks()[0]));
        assert_eq!(ctx.events.count_kind(EventKind::RegionMarked), 1);
        assert_eq!(ctx.events.count_kind(EventKind::LineInfoCaptured), 2);
    }

    #[test]
    fn test_region_contains_every_tagged_instruction() {
        let mut func = scenario_function("mixed");
        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();

        let body = func.blocks()[0].instructions();
        let begin = body
            .iter()
            .position(|i| MarkerKind::of(i) == Some(MarkerKind::Begin))
            .unwrap();
        let end = body
            .iter()
            .position(|i| MarkerKind::of(i) == Some(MarkerKind::End))
            .unwrap();
        for (index, inst) in body.iter().enumerate() {
            if inst.is_unsafe() {
                assert!(begin < index && index < end);
            }
        }

        // The untagged add at lib.rs:12 sits between two tagged instructions
        let interposed = body
            .iter()
            .position(|i| !i.is_unsafe() && i.debug_loc().is_some_and(|l| l.line == 12))
            .unwrap();
        assert!(begin < interposed && interposed < end);
    }

    #[test]
    fn test_tagged_phi_stays_leading() {
        let mut func = phi_function("f");
        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();

        let block = &func.blocks()[1];
        let kinds: Vec<String> = block
            .iter_all()
            .map(|inst| match MarkerKind::of(inst) {
                Some(kind) => kind.template().to_string(),
                None => inst.op().mnemonic().to_string(),
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["phi", MARKER_BEGIN, "load", "store", MARKER_END, "ret"]
        );
        assert!(check_balance(block));
        assert!(Verifier::verify_function(&func).is_empty());
    }

    #[test]
    fn test_only_phi_tagged_yields_empty_region_after_phis() {
        let mut func = Function::new(
            "f",
            crate::ir::FunctionType::new(Type::Void, vec![Type::Ptr]),
        );
        let entry = func.add_block(
            "entry",
            Op::Br {
                target: BlockId::new(1),
            },
        );
        let body = func.add_block("body", Op::Ret { value: None });
        let mut b = IrBuilder::at_end(&mut func, body).unwrap();
        b.set_unsafe(true);
        let p = b.phi(Type::Ptr, vec![(Value::Arg(0), entry)]);
        b.set_unsafe(false);
        b.load(Type::I32, p);

        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();

        let body = func.blocks()[1].instructions();
        assert!(body[0].op().is_phi());
        assert_eq!(MarkerKind::of(&body[1]), Some(MarkerKind::Begin));
        assert_eq!(MarkerKind::of(&body[2]), Some(MarkerKind::End));
        assert_eq!(body[3].op().mnemonic(), "load");
        assert!(Verifier::verify_function(&func).is_empty());
    }

    #[test]
    fn test_line_info_captured() {
        let mut func = scenario_function("mixed");
        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();

        let lines: Vec<u32> = func
            .instructions()
            .filter_map(|i| i.line_info().map(|info| info.line))
            .collect();
        assert_eq!(lines, vec![11, 13]);
    }

    #[test]
    fn test_degenerate_location_not_captured() {
        let mut func = Function::new(
            "f",
            crate::ir::FunctionType::new(Type::Void, vec![Type::Ptr]),
        );
        let entry = func.add_block("entry", Op::Ret { value: None });
        let mut b = IrBuilder::at_end(&mut func, entry).unwrap();
        b.set_unsafe(true);
        b.set_debug_loc(Some(loc("src/lib.rs", 0)));
        b.load(Type::I8, Value::Arg(0));

        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();
        assert!(func.instructions().all(|i| i.line_info().is_none()));
        // The region is still marked
        assert!(regions::has_markers(&func.blocks()[0]));
    }

    #[test]
    fn test_tagged_terminator_only() {
        let mut func = Function::new("f", crate::ir::FunctionType::void());
        let entry = func.add_block("entry", Op::Ret { value: None });
        let block = func.block_mut(entry).unwrap();
        let terminator = block.terminator().clone().with_unsafe_tag();
        *block.terminator_mut() = terminator;

        RegionMarkerPass::new()
            .run_on_function(&mut func, &primary_context())
            .unwrap();
        assert_eq!(templates(&func), vec![MARKER_BEGIN, MARKER_END, "ret"]);
    }

    #[test]
    fn test_safe_function_untouched() {
        let mut func = safe_function("safe");
        let before = func.clone();
        let ctx = primary_context();

        assert!(!RegionMarkerPass::new().run_on_function(&mut func, &ctx).unwrap());
        assert_eq!(func, before);
        assert!(ctx.events.is_empty());
    }

    #[test]
    fn test_second_run_is_noop() {
        let mut func = scenario_function("mixed");
        let pass = RegionMarkerPass::new();
        pass.run_on_function(&mut func, &primary_context()).unwrap();
        let marked = func.clone();

        assert!(!pass.run_on_function(&mut func, &primary_context()).unwrap());
        assert_eq!(func, marked);
    }

    #[test]
    fn test_dependency_unit_skipped() {
        let mut func = scenario_function("mixed");
        let before = func.clone();
        assert!(!RegionMarkerPass::new()
            .run_on_function(&mut func, &dependency_context())
            .unwrap());
        assert_eq!(func, before);
    }
}
