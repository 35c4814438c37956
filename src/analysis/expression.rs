//! This module contains the expression builder, which replaces the implicit
//! stack operands of each instruction with explicit expression trees.
//!
//! # Inlining
//!
//! An operand is replaced by the expression of the instruction that produced
//! it when doing so cannot change what the program means to a reader. That
//! holds when all of the following are true:
//!
//! - The operand slot can only have been produced by one instruction.
//! - That producer's value is used at exactly one site. Sites that only move
//!   the value (`DUPN` and `SWAPN`) do not count as uses.
//! - The producer is in the same block as the consumer, and comes before it.
//!
//! The producer then gives up its expression to the consumer, so each
//! expression tree has exactly one owner. Any operand that cannot be inlined
//! becomes an [`Expression::Reference`] to the values that may occupy the
//! slot.

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use itertools::Itertools;
use log::debug;

use crate::{
    analysis::{
        fold::fold,
        label::JumpLabel,
        reaches::ReachesSet,
        reaching::ReachingDefinition,
        stack::{StackSlot, StackValue},
    },
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    opcode::Opcode,
    program::{InstructionId, Program},
};

/// An expression tree standing in for the stack operations of an instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expression {
    /// A word pushed from the bytecode.
    Constant(U256),

    /// A statically-known jump destination.
    Label(JumpLabel),

    /// A value that was not inlined, named by the values that may occupy its
    /// stack slot.
    Reference(BTreeSet<StackValue>),

    /// The result of executing `opcode` at `offset` on `arguments`, which are
    /// ordered from the top of the stack down.
    Instruction {
        opcode:    Opcode,
        offset:    usize,
        arguments: Vec<Expression>,
    },
}

impl Expression {
    /// Constructs a reference to the values that may occupy `slot`.
    #[must_use]
    pub fn reference(slot: &StackSlot) -> Self {
        Self::Reference(slot.producers().clone())
    }

    /// Gets the arguments of the expression, which are empty for anything but
    /// an instruction.
    #[must_use]
    pub fn arguments(&self) -> &[Expression] {
        match self {
            Self::Instruction { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// Gets the number of nodes in the expression tree.
    #[must_use]
    pub fn size(&self) -> usize {
        1 + self.arguments().iter().map(Expression::size).sum::<usize>()
    }

    /// Evaluates the expression if its value is known statically.
    ///
    /// This folds through the pure arithmetic, comparison, bitwise and shift
    /// operations. Labels evaluate to the offset that they name, and
    /// references never have a known value.
    #[must_use]
    pub fn eval(&self) -> Option<U256> {
        match self {
            Self::Constant(value) => Some(*value),
            Self::Label(label) => Some(U256::from(label.offset() as u64)),
            Self::Reference(_) => None,
            Self::Instruction {
                opcode: Opcode::PC,
                offset,
                ..
            } => Some(U256::from(*offset as u64)),
            Self::Instruction {
                opcode, arguments, ..
            } => {
                let values = arguments
                    .iter()
                    .map(Expression::eval)
                    .collect::<Option<Vec<_>>>()?;
                fold(*opcode, &values)
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "0x{value:x}"),
            Self::Label(label) => write!(f, "{label}"),
            Self::Reference(values) if values.len() == 1 => {
                write!(f, "{}", values.iter().join(""))
            }
            Self::Reference(values) => write!(f, "[{}]", values.iter().join("|")),
            Self::Instruction {
                opcode, arguments, ..
            } => write!(f, "{opcode}({})", arguments.iter().join(", ")),
        }
    }
}

/// How a single operand of an instruction is to be rendered.
#[derive(Clone, Debug)]
enum Operand {
    /// Take the expression of the producer.
    Inline(InstructionId),

    /// Refer to the values in the slot.
    Reference(StackSlot),

    /// Use the label, consuming the producer's expression if it is
    /// `Some`.
    Label(JumpLabel, Option<InstructionId>),
}

/// Builds an [`Expression`] for every instruction in `program`, in program
/// order.
///
/// `PUSH` instructions become constants. Instructions that only move stack
/// values (`DUPN` and `SWAPN`), or that neither pop nor push anything, get no
/// expression. Any expressions left by a previous run are discarded first.
///
/// # Errors
///
/// Returns [`Err`] if the reaching definitions or reaches annotations are
/// missing, or if a reaching definition names a producer that does not exist
/// or whose expression has already been taken. All of these indicate a defect
/// in the analysis.
pub fn build_expressions(program: &mut Program) -> Result<()> {
    for index in 0..program.instructions().len() {
        if let Some(instruction) = program.instruction_mut(InstructionId::new(index)) {
            instruction.annotations_mut().take::<Expression>();
        }
    }

    let mut inlined = 0;
    for index in 0..program.instructions().len() {
        let id = InstructionId::new(index);
        let Some(instruction) = program.instruction(id) else {
            continue;
        };
        let opcode = instruction.opcode();
        let offset = instruction.offset();

        if let Some(value) = instruction.immediate_value() {
            set_expression(program, id, Expression::Constant(value));
            continue;
        }
        if opcode.is_stack_manipulation() || (opcode.arg_count() == 0 && opcode.push_count() == 0)
        {
            continue;
        }

        let operands = plan_operands(program, id)?;
        let mut arguments = Vec::with_capacity(operands.len());
        for operand in operands {
            let argument = match operand {
                Operand::Inline(producer) => {
                    inlined += 1;
                    take_expression(program, producer).locate(offset)?
                }
                Operand::Reference(slot) => Expression::reference(&slot),
                Operand::Label(label, producer) => {
                    if let Some(producer) = producer {
                        inlined += 1;
                        take_expression(program, producer).locate(offset)?;
                    }
                    Expression::Label(label)
                }
            };
            arguments.push(argument);
        }

        let expression = Expression::Instruction {
            opcode,
            offset,
            arguments,
        };
        set_expression(program, id, expression);
    }

    debug!("Built expressions, inlining {inlined} operands");

    Ok(())
}

/// Decides how each operand of the instruction `id` is rendered.
fn plan_operands(program: &Program, id: InstructionId) -> Result<Vec<Operand>> {
    let Some(consumer) = program.instruction(id) else {
        return Ok(Vec::new());
    };
    let offset = consumer.offset();
    let reaching = consumer
        .annotations()
        .get::<ReachingDefinition>()
        .ok_or(Error::MissingAnnotation {
            pass:        "expressions",
            requirement: "reaching definition",
        })
        .locate(offset)?;

    let mut operands = Vec::with_capacity(consumer.opcode().arg_count());
    for depth in 0..consumer.opcode().arg_count() {
        let slot = reaching.slot(depth).cloned().unwrap_or_else(StackSlot::external);

        for producer in slot.producing_instructions() {
            if program.instruction(producer).is_none() {
                return Err(Error::MissingProducer {
                    producer: producer.index(),
                }
                .locate(offset));
            }
        }

        let inline = match slot.single_producer() {
            Some(producer) if can_inline(program, producer, id).locate(offset)? => Some(producer),
            _ => None,
        };

        let label = (depth == 0 && consumer.opcode().is_jump())
            .then(|| slot.constant().exact())
            .flatten()
            .and_then(|target| program.jump_destination(target))
            .and_then(|block| program.block(block))
            .and_then(|block| block.annotations().get::<JumpLabel>())
            .cloned();

        let operand = match (label, inline) {
            (Some(label), producer) => Operand::Label(label, producer),
            (None, Some(producer)) => Operand::Inline(producer),
            (None, None) => Operand::Reference(slot),
        };
        operands.push(operand);
    }

    Ok(operands)
}

/// Checks if the value of `producer` can be inlined into `consumer`.
fn can_inline(
    program: &Program,
    producer: InstructionId,
    consumer: InstructionId,
) -> std::result::Result<bool, Error> {
    let (Some(producer), Some(consumer)) =
        (program.instruction(producer), program.instruction(consumer))
    else {
        return Ok(false);
    };

    if producer.block() != consumer.block() || producer.offset() >= consumer.offset() {
        return Ok(false);
    }

    let reaches = producer
        .annotations()
        .get::<ReachesSet>()
        .ok_or(Error::MissingAnnotation {
            pass:        "expressions",
            requirement: "reaches set",
        })?;

    Ok(reaches.consuming_sites(program).count() == 1)
}

/// Takes the expression of `producer`, which must not have been taken before.
fn take_expression(
    program: &mut Program,
    producer: InstructionId,
) -> std::result::Result<Expression, Error> {
    program
        .instruction_mut(producer)
        .and_then(|i| i.annotations_mut().take::<Expression>())
        .ok_or(Error::MissingProducer {
            producer: producer.index(),
        })
}

fn set_expression(program: &mut Program, id: InstructionId, expression: Expression) {
    if let Some(instruction) = program.instruction_mut(id) {
        instruction.annotations_mut().set(expression);
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeSet;

    use ethnum::U256;

    use crate::{
        analysis::{
            expression::{build_expressions, Expression},
            label::create_labels,
            reaches::perform_reaches_analysis,
            reaching::perform_reaching_analysis,
            stack::StackValue,
            Config,
        },
        bytecode,
        error::analysis::Error,
        opcode::{Opcode, PushN},
        program::{InstructionId, Program},
        watchdog::LazyWatchdog,
    };

    mod util {
        use crate::{
            analysis::{
                expression::build_expressions,
                label::create_labels,
                reaches::perform_reaches_analysis,
                reaching::perform_reaching_analysis,
                Config,
            },
            program::Program,
            watchdog::LazyWatchdog,
        };

        /// Runs every pass over `bytes`.
        pub fn build(bytes: &[u8]) -> anyhow::Result<Program> {
            let mut program = Program::new(bytes);
            perform_reaching_analysis(&mut program, &Config::default(), &LazyWatchdog.in_rc())?;
            perform_reaches_analysis(&mut program)?;
            create_labels(&mut program)?;
            build_expressions(&mut program)?;
            Ok(program)
        }

        /// Renders the expression at each offset that has one.
        pub fn rendered(program: &Program) -> Vec<(usize, String)> {
            program
                .instructions()
                .iter()
                .filter_map(|i| {
                    i.annotations()
                        .get::<super::Expression>()
                        .map(|e| (i.offset(), e.to_string()))
                })
                .collect()
        }
    }

    fn at(offset: usize, text: &str) -> (usize, String) {
        (offset, text.to_string())
    }

    fn constant(value: u64) -> Expression {
        Expression::Constant(U256::from(value))
    }

    #[test]
    fn inlines_single_use_producers() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?,
            PushN::new(1, vec![0x02])?,
            Opcode::Add,
            Opcode::Stop,
        ];
        let program = util::build(&bytes)?;

        assert_eq!(util::rendered(&program), vec![at(0x04, "ADD(0x2, 0x1)")]);
        let add = program.instructions()[2]
            .annotations()
            .get::<Expression>()
            .expect("Expression was missing");
        assert_eq!(add.arguments(), &[constant(2), constant(1)]);
        assert_eq!(add.eval(), Some(U256::from(3u64)));

        Ok(())
    }

    #[test]
    fn nests_inlined_expressions() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x00])?,
            Opcode::CallDataLoad,
            PushN::new(1, vec![0x01])?,
            Opcode::SStore,
            Opcode::Stop,
        ];
        let program = util::build(&bytes)?;

        assert_eq!(
            util::rendered(&program),
            vec![at(0x05, "SSTORE(0x1, CALLDATALOAD(0x0))")]
        );

        Ok(())
    }

    #[test]
    fn duplicated_values_are_referenced() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            Opcode::Dup(1),             // 0x02
            Opcode::Add,                // 0x03
            Opcode::Stop,               // 0x04
        ];
        let program = util::build(&bytes)?;

        assert_eq!(
            util::rendered(&program),
            vec![at(0x00, "0x1"), at(0x03, "ADD(@0x0, @0x0)")]
        );

        Ok(())
    }

    #[test]
    fn values_moved_by_dup_are_still_single_use() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::Caller,             // 0x00
            PushN::new(1, vec![0x01])?, // 0x01
            Opcode::Dup(2),             // 0x03
            Opcode::SStore,             // 0x04
            Opcode::Pop,                // 0x05
            Opcode::Stop,               // 0x06
        ];
        let program = util::build(&bytes)?;

        // CALLER is read by the DUP, SSTORE and POP. The DUP does not count,
        // but it is still read twice.
        assert_eq!(
            util::rendered(&program),
            vec![
                at(0x00, "CALLER()"),
                at(0x04, "SSTORE(@0x0, 0x1)"),
                at(0x05, "POP(@0x0)"),
            ]
        );

        Ok(())
    }

    #[test]
    fn swapped_values_are_inlined() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?, // 0x00
            PushN::new(1, vec![0x02])?, // 0x02
            Opcode::Swap(1),            // 0x04
            Opcode::Sub,                // 0x05
            Opcode::Stop,               // 0x06
        ];
        let program = util::build(&bytes)?;

        assert_eq!(util::rendered(&program), vec![at(0x05, "SUB(0x1, 0x2)")]);
        let sub = program.instructions()[3]
            .annotations()
            .get::<Expression>()
            .expect("Expression was missing");
        assert_eq!(sub.eval(), Some(U256::MAX));

        Ok(())
    }

    #[test]
    fn jump_targets_become_labels() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x04])?, // 0x00
            Opcode::Jump,               // 0x02
            Opcode::Invalid(0xfe),      // 0x03
            Opcode::JumpDest,           // 0x04
            Opcode::Stop,               // 0x05
        ];
        let program = util::build(&bytes)?;

        assert_eq!(util::rendered(&program), vec![at(0x02, "JUMP(label_0x4)")]);
        let jump = program.instructions()[1]
            .annotations()
            .get::<Expression>()
            .expect("Expression was missing");
        assert_eq!(jump.eval(), None);
        assert_eq!(jump.arguments()[0].eval(), Some(U256::from(4u64)));

        Ok(())
    }

    #[test]
    fn values_from_other_blocks_are_referenced() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x0a])?, // 0x01
            Opcode::JumpI,              // 0x03
            PushN::new(1, vec![0x05])?, // 0x04
            PushN::new(1, vec![0x0d])?, // 0x06
            Opcode::Jump,               // 0x08
            Opcode::Invalid(0xfe),      // 0x09
            Opcode::JumpDest,           // 0x0a
            PushN::new(1, vec![0x07])?, // 0x0b
            Opcode::JumpDest,           // 0x0d
            Opcode::Pop,                // 0x0e
            Opcode::Stop,               // 0x0f
        ];
        let program = util::build(&bytes)?;
        let rendered = util::rendered(&program);

        assert!(rendered.contains(&at(0x03, "JUMPI(label_0xa, CALLVALUE())")));
        assert!(rendered.contains(&at(0x08, "JUMP(label_0xd)")));
        assert!(rendered.contains(&at(0x04, "0x5")));
        assert!(rendered.contains(&at(0x0b, "0x7")));
        assert!(rendered.contains(&at(0x0e, "POP([@0x4|@0xb])")));

        Ok(())
    }

    #[test]
    fn values_reaching_a_shallower_join_are_not_inlined() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::CallValue,          // 0x00
            PushN::new(1, vec![0x07])?, // 0x01
            Opcode::JumpI,              // 0x03
            Opcode::Caller,             // 0x04
            Opcode::Dup(1),             // 0x05
            Opcode::Pop,                // 0x06
            Opcode::JumpDest,           // 0x07
            Opcode::Pop,                // 0x08
            Opcode::Stop,               // 0x09
        ];
        let program = util::build(&bytes)?;

        // The jump skips CALLER, so the POP at 0x08 may read it or a value
        // from below the stack.
        assert_eq!(
            util::rendered(&program),
            vec![
                at(0x03, "JUMPI(label_0x7, CALLVALUE())"),
                at(0x04, "CALLER()"),
                at(0x06, "POP(@0x4)"),
                at(0x08, "POP([?|@0x4])"),
            ]
        );

        Ok(())
    }

    #[test]
    fn external_values_are_referenced() -> anyhow::Result<()> {
        let bytes = bytecode![Opcode::Pop, Opcode::Stop];
        let program = util::build(&bytes)?;

        assert_eq!(util::rendered(&program), vec![at(0x00, "POP(?)")]);

        Ok(())
    }

    #[test]
    fn stack_manipulation_and_markers_have_no_expression() -> anyhow::Result<()> {
        let bytes = bytecode![
            Opcode::JumpDest,
            Opcode::Caller,
            Opcode::Dup(1),
            Opcode::Swap(1),
            Opcode::Stop,
        ];
        let program = util::build(&bytes)?;

        for index in [0, 2, 3, 4] {
            assert!(!program.instructions()[index]
                .annotations()
                .contains::<Expression>());
        }

        Ok(())
    }

    #[test]
    fn rebuilding_gives_identical_expressions() -> anyhow::Result<()> {
        let bytes = bytecode![
            PushN::new(1, vec![0x01])?,
            PushN::new(1, vec![0x02])?,
            Opcode::Add,
            PushN::new(1, vec![0x00])?,
            Opcode::MStore,
            Opcode::Stop,
        ];
        let mut program = util::build(&bytes)?;
        let before = util::rendered(&program);
        build_expressions(&mut program)?;

        assert_eq!(util::rendered(&program), before);
        assert_eq!(before, vec![at(0x07, "MSTORE(0x0, ADD(0x2, 0x1))")]);

        Ok(())
    }

    #[test]
    fn requires_reaches_sets() -> anyhow::Result<()> {
        let bytes = bytecode![PushN::new(1, vec![0x01])?, Opcode::Pop];
        let mut program = Program::new(&bytes);
        perform_reaching_analysis(&mut program, &Config::default(), &LazyWatchdog.in_rc())?;
        create_labels(&mut program)?;
        let error = build_expressions(&mut program).unwrap_err();

        assert_eq!(error.location, 0x02);
        assert_eq!(
            error.payload,
            Error::MissingAnnotation {
                pass:        "expressions",
                requirement: "reaches set",
            }
        );

        Ok(())
    }

    #[test]
    fn evaluation_folds_through_nested_operations() {
        let expression = Expression::Instruction {
            opcode:    Opcode::Mul,
            offset:    0x10,
            arguments: vec![
                Expression::Instruction {
                    opcode:    Opcode::Add,
                    offset:    0x08,
                    arguments: vec![constant(2), constant(3)],
                },
                constant(4),
            ],
        };
        assert_eq!(expression.eval(), Some(U256::from(20u64)));
        assert_eq!(expression.size(), 5);
        assert_eq!(expression.to_string(), "MUL(ADD(0x2, 0x3), 0x4)");

        let opaque = Expression::Instruction {
            opcode:    Opcode::Add,
            offset:    0x08,
            arguments: vec![
                constant(1),
                Expression::Reference(BTreeSet::from([StackValue::produced(
                    InstructionId::new(0),
                    0x00,
                )])),
            ],
        };
        assert_eq!(opaque.eval(), None);
        assert_eq!(opaque.to_string(), "ADD(0x1, @0x0)");
    }

    #[test]
    fn labels_are_not_required_for_inlining() -> anyhow::Result<()> {
        let bytes = bytecode![Opcode::Caller, Opcode::Pop];
        let mut program = Program::new(&bytes);
        perform_reaching_analysis(&mut program, &Config::default(), &LazyWatchdog.in_rc())?;
        perform_reaches_analysis(&mut program)?;
        build_expressions(&mut program)?;

        assert_eq!(util::rendered(&program), vec![at(0x01, "POP(CALLER())")]);

        Ok(())
    }
}
