//! Hash aggregation with optional grouping.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use strata::tuple::{Field, FieldType, Schema, SchemaField, Tuple};

use crate::errors::ExecError;
use crate::operator::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    SumCount,
    ScAvg,
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
            AggregateOp::SumCount => "sum_count",
            AggregateOp::ScAvg => "sc_avg",
        };
        write!(f, "{}", name)
    }
}

/// Per-group running state: the merged value so far and how many tuples
/// contributed.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    value: Option<i32>,
    count: i32,
}

impl Accumulator {
    fn merge(&mut self, op: AggregateOp, value: Option<i32>) {
        self.count += 1;
        let Some(v) = value else { return };
        self.value = Some(match (op, self.value) {
            (AggregateOp::Min, Some(cur)) => cur.min(v),
            (AggregateOp::Max, Some(cur)) => cur.max(v),
            (
                AggregateOp::Sum
                | AggregateOp::Avg
                | AggregateOp::SumCount
                | AggregateOp::ScAvg,
                Some(cur),
            ) => cur + v,
            (AggregateOp::Count, Some(cur)) => cur,
            (_, None) => v,
        });
    }

    fn finalize(&self, op: AggregateOp) -> Option<i32> {
        match op {
            AggregateOp::Count => Some(self.count),
            AggregateOp::Avg => self.value.map(|sum| sum / self.count),
            _ => self.value,
        }
    }
}

/// Consumes its child entirely on open, accumulating one state per
/// group key, then streams the finalized rows.
///
/// Without grouping the output schema is `(agg: int)`; with grouping it
/// is `(group, agg: int)`. The aggregate column is named
/// `op(childColumn)`. Text columns admit only `count`.
pub struct Aggregate {
    child: Box<dyn Operator>,
    a_field: usize,
    g_field: Option<usize>,
    op: AggregateOp,
    schema: Arc<Schema>,
    results: Option<Vec<Tuple>>,
    cursor: usize,
    opened: bool,
}

impl Aggregate {
    pub fn new(
        child: Box<dyn Operator>,
        a_field: usize,
        g_field: Option<usize>,
        op: AggregateOp,
    ) -> Result<Self, ExecError> {
        let child_schema = child.schema();
        let a_type = child_schema.field_type(a_field)?;
        if a_type == FieldType::Text && op != AggregateOp::Count {
            return Err(ExecError::InvalidArgument(format!(
                "{} is not defined over text columns",
                op
            )));
        }

        let agg_name = match child_schema.field_name(a_field)? {
            Some(name) => format!("{}({})", op, name),
            None => op.to_string(),
        };

        let mut fields = Vec::new();
        if let Some(g) = g_field {
            let g_type = child_schema.field_type(g)?;
            fields.push(SchemaField {
                field_type: g_type,
                name: child_schema.field_name(g)?.map(str::to_owned),
            });
        }
        fields.push(SchemaField::new(FieldType::Int, Some(&agg_name)));
        let schema = Arc::new(Schema::new(fields)?);

        Ok(Self {
            child,
            a_field,
            g_field,
            op,
            schema,
            results: None,
            cursor: 0,
            opened: false,
        })
    }

    pub fn op(&self) -> AggregateOp {
        self.op
    }

    fn materialize(&mut self) -> Result<(), ExecError> {
        let mut groups: HashMap<Option<Field>, Accumulator> = HashMap::new();
        // Without grouping there is always exactly one output row, even
        // over an empty input.
        if self.g_field.is_none() {
            groups.insert(None, Accumulator::default());
        }

        while let Some(tuple) = self.child.next()? {
            let key = match self.g_field {
                Some(g) => Some(
                    tuple
                        .field(g)
                        .ok_or_else(|| {
                            ExecError::InvalidArgument(format!(
                                "tuple has no value at group field {}",
                                g
                            ))
                        })?
                        .clone(),
                ),
                None => None,
            };
            let value = match tuple.field(self.a_field) {
                Some(Field::Int(v)) => Some(*v),
                Some(Field::Text(_)) => None,
                None => {
                    return Err(ExecError::InvalidArgument(format!(
                        "tuple has no value at aggregate field {}",
                        self.a_field
                    )))
                }
            };
            groups.entry(key).or_default().merge(self.op, value);
        }

        let mut rows = Vec::with_capacity(groups.len());
        for (key, acc) in groups {
            let mut tuple = Tuple::new(Arc::clone(&self.schema));
            let agg_slot = match key {
                Some(group) => {
                    tuple.set_field(0, group)?;
                    1
                }
                None => 0,
            };
            // An empty ungrouped input leaves non-count aggregates
            // unset.
            if let Some(v) = acc.finalize(self.op) {
                tuple.set_field(agg_slot, Field::Int(v))?;
            }
            rows.push(tuple);
        }

        self.results = Some(rows);
        self.cursor = 0;
        Ok(())
    }
}

impl Operator for Aggregate {
    fn open(&mut self) -> Result<(), ExecError> {
        self.child.open()?;
        if self.results.is_none() {
            self.materialize()?;
        }
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>, ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("aggregate is not open".into()));
        }
        let results = self
            .results
            .as_ref()
            .ok_or_else(|| ExecError::InvalidState("aggregate is not open".into()))?;
        let row = results.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        Ok(row)
    }

    fn rewind(&mut self) -> Result<(), ExecError> {
        if !self.opened {
            return Err(ExecError::InvalidState("aggregate was never opened".into()));
        }
        self.cursor = 0;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.results = None;
        self.cursor = 0;
        self.opened = false;
    }

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn children(&self) -> Vec<&dyn Operator> {
        vec![self.child.as_ref()]
    }

    fn set_children(&mut self, mut children: Vec<Box<dyn Operator>>) -> Result<(), ExecError> {
        if children.len() != 1 {
            return Err(ExecError::InvalidArgument(
                "aggregate takes exactly one child".into(),
            ));
        }
        self.close();
        self.child = children.pop().unwrap();
        Ok(())
    }
}
