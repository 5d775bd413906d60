//! Builtin function table.
//!
//! Each builtin carries the facts the builder needs without evaluating it:
//! write-through (does a write to the application land on its first
//! argument), "always true" (is the result never falsy), arity and result
//! type. Builtins are pure and fold over constant arguments; closure
//! applications never fold.

use arbor_ir::{Cardinality, ConstValue, ValueKinds, ValueType};

use crate::NodeId;

/// The function of an application node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Function {
    Builtin(Builtin),
    /// A closure value produced by the given node.
    Closure(NodeId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Builtin {
    Identity,
    Not,
    And,
    Or,
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Uminus,
    Abs,
    Min,
    Max,
    Sum,
    Size,
    Empty,
    NotEmpty,
    First,
    Last,
    Reverse,
}

/// Static facts about a builtin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FunctionInfo {
    pub name: &'static str,
    /// A write to the application is a write to its first argument.
    pub write_through: bool,
    /// The result is never falsy, whatever the arguments.
    pub always_true: bool,
    pub min_args: usize,
    /// `None` for variadic.
    pub max_args: Option<usize>,
    pub result: ValueType,
}

const NUMBER: ValueType = ValueType::single(ValueKinds::NUMBER);
const BOOLEAN: ValueType = ValueType::single(ValueKinds::BOOLEAN);
const NUMBER_OR_EMPTY: ValueType = ValueType::of(
    ValueKinds::NUMBER.union(ValueKinds::UNDEFINED),
    Cardinality {
        min: 0,
        max: Some(1),
    },
);

const fn info(
    name: &'static str,
    min_args: usize,
    max_args: Option<usize>,
    result: ValueType,
) -> FunctionInfo {
    FunctionInfo {
        name,
        write_through: false,
        always_true: false,
        min_args,
        max_args,
        result,
    }
}

impl Builtin {
    pub const ALL: [Builtin; 20] = [
        Builtin::Identity,
        Builtin::Not,
        Builtin::And,
        Builtin::Or,
        Builtin::Plus,
        Builtin::Minus,
        Builtin::Mul,
        Builtin::Div,
        Builtin::Mod,
        Builtin::Uminus,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Size,
        Builtin::Empty,
        Builtin::NotEmpty,
        Builtin::First,
        Builtin::Last,
        Builtin::Reverse,
    ];

    pub fn info(self) -> FunctionInfo {
        match self {
            Builtin::Identity => FunctionInfo {
                write_through: true,
                ..info("identity", 1, Some(1), ValueType::any())
            },
            Builtin::Not => info("not", 1, Some(1), BOOLEAN),
            Builtin::And => info("and", 0, None, BOOLEAN),
            Builtin::Or => info("or", 0, None, BOOLEAN),
            Builtin::Plus => info("plus", 2, Some(2), NUMBER_OR_EMPTY),
            Builtin::Minus => info("minus", 2, Some(2), NUMBER_OR_EMPTY),
            Builtin::Mul => info("mul", 2, Some(2), NUMBER_OR_EMPTY),
            Builtin::Div => info("div", 2, Some(2), NUMBER_OR_EMPTY),
            Builtin::Mod => info("mod", 2, Some(2), NUMBER_OR_EMPTY),
            Builtin::Uminus => info("uminus", 1, Some(1), NUMBER_OR_EMPTY),
            Builtin::Abs => info("abs", 1, Some(1), NUMBER_OR_EMPTY),
            Builtin::Min => info("min", 0, None, NUMBER_OR_EMPTY),
            Builtin::Max => info("max", 0, None, NUMBER_OR_EMPTY),
            Builtin::Sum => FunctionInfo {
                always_true: true,
                ..info("sum", 0, None, NUMBER)
            },
            Builtin::Size => FunctionInfo {
                always_true: true,
                ..info("size", 1, Some(1), NUMBER)
            },
            Builtin::Empty => info("empty", 1, Some(1), BOOLEAN),
            Builtin::NotEmpty => info("notEmpty", 1, Some(1), BOOLEAN),
            Builtin::First => FunctionInfo {
                write_through: true,
                ..info("first", 1, Some(1), ValueType::any())
            },
            Builtin::Last => FunctionInfo {
                write_through: true,
                ..info("last", 1, Some(1), ValueType::any())
            },
            Builtin::Reverse => info("reverse", 1, Some(1), ValueType::any()),
        }
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.into_iter().find(|b| b.name() == name)
    }

    pub fn accepts(self, count: usize) -> bool {
        let info = self.info();
        count >= info.min_args && info.max_args.map_or(true, |max| count <= max)
    }

    /// Evaluate over constant arguments. `None` when the builtin cannot be
    /// folded for these arguments; the node is then kept.
    pub fn evaluate(self, args: &[ConstValue]) -> Option<ConstValue> {
        match self {
            Builtin::Identity => args.first().cloned(),
            Builtin::Not => Some(ConstValue::Bool(!args.first()?.is_truthy())),
            Builtin::And => Some(ConstValue::Bool(args.iter().all(ConstValue::is_truthy))),
            Builtin::Or => Some(ConstValue::Bool(args.iter().any(ConstValue::is_truthy))),
            Builtin::Plus => binary(args, |a, b| a + b),
            Builtin::Minus => binary(args, |a, b| a - b),
            Builtin::Mul => binary(args, |a, b| a * b),
            Builtin::Div => binary(args, |a, b| a / b),
            Builtin::Mod => binary(args, |a, b| a % b),
            Builtin::Uminus => unary(args, |a| -a),
            Builtin::Abs => unary(args, f64::abs),
            Builtin::Min => numbers(args).map(|ns| {
                ns.into_iter()
                    .reduce(f64::min)
                    .map_or(ConstValue::Empty, ConstValue::number)
            }),
            Builtin::Max => numbers(args).map(|ns| {
                ns.into_iter()
                    .reduce(f64::max)
                    .map_or(ConstValue::Empty, ConstValue::number)
            }),
            Builtin::Sum => numbers(args).map(|ns| ConstValue::number(ns.into_iter().sum())),
            Builtin::Size => {
                let n = args.first()?.elements().len();
                #[expect(
                    clippy::cast_precision_loss,
                    reason = "constant sets are far below 2^52 elements"
                )]
                let n = n as f64;
                Some(ConstValue::number(n))
            }
            Builtin::Empty => Some(ConstValue::Bool(args.first()?.is_empty_value())),
            Builtin::NotEmpty => Some(ConstValue::Bool(!args.first()?.is_empty_value())),
            Builtin::First => Some(
                args.first()?
                    .elements()
                    .first()
                    .cloned()
                    .unwrap_or(ConstValue::Empty),
            ),
            Builtin::Last => Some(
                args.first()?
                    .elements()
                    .last()
                    .cloned()
                    .unwrap_or(ConstValue::Empty),
            ),
            Builtin::Reverse => Some(ConstValue::set(
                args.first()?.elements().iter().rev().cloned(),
            )),
        }
    }
}

/// All numeric elements of all arguments; `None` if any element is not a
/// number.
fn numbers(args: &[ConstValue]) -> Option<Vec<f64>> {
    args.iter()
        .flat_map(ConstValue::elements)
        .map(ConstValue::as_number)
        .collect()
}

fn unary(args: &[ConstValue], op: impl Fn(f64) -> f64) -> Option<ConstValue> {
    match args {
        [ConstValue::Empty] => Some(ConstValue::Empty),
        [a] => Some(ConstValue::number(op(a.as_number()?))),
        _ => None,
    }
}

fn binary(args: &[ConstValue], op: impl Fn(f64, f64) -> f64) -> Option<ConstValue> {
    match args {
        [ConstValue::Empty, _] | [_, ConstValue::Empty] => Some(ConstValue::Empty),
        [a, b] => Some(ConstValue::number(op(a.as_number()?, b.as_number()?))),
        _ => None,
    }
}
