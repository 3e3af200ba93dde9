//! Comparison predicates applied by the filter and join operators.

use std::cmp::Ordering;

use strata::tuple::{Field, Tuple};

use crate::errors::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateOp {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
}

impl PredicateOp {
    /// Compares two field values. Fields of different types are never
    /// ordered, so every comparison except inequality is false across
    /// types.
    pub fn apply(&self, left: &Field, right: &Field) -> bool {
        match self {
            PredicateOp::Equals => left == right,
            PredicateOp::NotEquals => left != right,
            PredicateOp::GreaterThan => {
                matches!(left.partial_cmp(right), Some(Ordering::Greater))
            }
            PredicateOp::GreaterThanOrEq => {
                matches!(
                    left.partial_cmp(right),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            }
            PredicateOp::LessThan => matches!(left.partial_cmp(right), Some(Ordering::Less)),
            PredicateOp::LessThanOrEq => {
                matches!(
                    left.partial_cmp(right),
                    Some(Ordering::Less | Ordering::Equal)
                )
            }
        }
    }
}

/// Compares one tuple field against a constant.
#[derive(Debug, Clone)]
pub struct Predicate {
    field: usize,
    op: PredicateOp,
    operand: Field,
}

impl Predicate {
    pub fn new(field: usize, op: PredicateOp, operand: Field) -> Self {
        Self { field, op, operand }
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn op(&self) -> PredicateOp {
        self.op
    }

    pub fn operand(&self) -> &Field {
        &self.operand
    }

    pub fn filter(&self, tuple: &Tuple) -> Result<bool, ExecError> {
        let value = tuple.field(self.field).ok_or_else(|| {
            ExecError::InvalidArgument(format!("tuple has no value at field {}", self.field))
        })?;
        Ok(self.op.apply(value, &self.operand))
    }
}

/// Compares a field of one tuple against a field of another.
#[derive(Debug, Clone)]
pub struct JoinPredicate {
    left_field: usize,
    op: PredicateOp,
    right_field: usize,
}

impl JoinPredicate {
    pub fn new(left_field: usize, op: PredicateOp, right_field: usize) -> Self {
        Self {
            left_field,
            op,
            right_field,
        }
    }

    pub fn filter(&self, left: &Tuple, right: &Tuple) -> Result<bool, ExecError> {
        let lv = left.field(self.left_field).ok_or_else(|| {
            ExecError::InvalidArgument(format!(
                "left tuple has no value at field {}",
                self.left_field
            ))
        })?;
        let rv = right.field(self.right_field).ok_or_else(|| {
            ExecError::InvalidArgument(format!(
                "right tuple has no value at field {}",
                self.right_field
            ))
        })?;
        Ok(self.op.apply(lv, rv))
    }
}
