mod common;

use std::sync::Arc;

use common::setup_table;
use granite::{Aggregate, AggregateOp, Filter, Operator, Predicate, PredicateOp, SeqScan};
use strata::tuple::Field;

fn collect_pairs(op: &mut dyn Operator) -> Vec<(i32, i32)> {
    let mut rows = Vec::new();
    while let Some(t) = op.next().unwrap() {
        let g = match t.field(0) {
            Some(Field::Int(v)) => *v,
            other => panic!("expected an int group, got {:?}", other),
        };
        let v = match t.field(1) {
            Some(Field::Int(v)) => *v,
            other => panic!("expected an int aggregate, got {:?}", other),
        };
        rows.push((g, v));
    }
    rows.sort_unstable();
    rows
}

#[test]
fn grouped_average_over_a_stored_table() {
    let t = setup_table("avg_table", 8, &[(1, 10), (1, 20), (2, 5)]);

    let tx = t.db.begin();
    let scan = SeqScan::new(Arc::clone(t.db.pool()), tx.id(), t.table_id, "t").unwrap();
    let mut agg = Aggregate::new(Box::new(scan), 1, Some(0), AggregateOp::Avg).unwrap();
    agg.open().unwrap();

    assert_eq!(collect_pairs(&mut agg), vec![(1, 15), (2, 5)]);
    agg.close();
    tx.commit().unwrap();
}

#[test]
fn ungrouped_count_over_an_empty_table_is_zero() {
    let t = setup_table("count_empty", 8, &[]);

    let tx = t.db.begin();
    let scan = SeqScan::new(Arc::clone(t.db.pool()), tx.id(), t.table_id, "t").unwrap();
    let mut agg = Aggregate::new(Box::new(scan), 1, None, AggregateOp::Count).unwrap();
    agg.open().unwrap();

    let row = agg.next().unwrap().unwrap();
    assert_eq!(row.field(0), Some(&Field::Int(0)));
    assert!(agg.next().unwrap().is_none());
    agg.close();
    tx.commit().unwrap();
}

#[test]
fn aggregate_composes_with_a_filter() {
    let t = setup_table(
        "agg_filter",
        8,
        &[(1, 10), (1, 20), (2, 5), (2, 100), (3, 1)],
    );

    let tx = t.db.begin();
    let scan = SeqScan::new(Arc::clone(t.db.pool()), tx.id(), t.table_id, "t").unwrap();
    let filter = Filter::new(
        Predicate::new(1, PredicateOp::LessThan, Field::Int(50)),
        Box::new(scan),
    );
    let mut agg = Aggregate::new(Box::new(filter), 1, Some(0), AggregateOp::Sum).unwrap();
    agg.open().unwrap();

    assert_eq!(collect_pairs(&mut agg), vec![(1, 30), (2, 5), (3, 1)]);
    agg.close();
    tx.commit().unwrap();
}

#[test]
fn ungrouped_max_over_a_stored_table() {
    let t = setup_table("max_table", 8, &[(1, 10), (2, 99), (3, 40)]);

    let tx = t.db.begin();
    let scan = SeqScan::new(Arc::clone(t.db.pool()), tx.id(), t.table_id, "t").unwrap();
    let mut agg = Aggregate::new(Box::new(scan), 1, None, AggregateOp::Max).unwrap();
    agg.open().unwrap();

    let row = agg.next().unwrap().unwrap();
    assert_eq!(row.field(0), Some(&Field::Int(99)));
    assert!(agg.next().unwrap().is_none());
    agg.close();
    tx.commit().unwrap();
}
