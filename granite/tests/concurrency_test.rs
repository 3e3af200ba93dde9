mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::{int_tuple, scan_all, setup_table};
use serial_test::serial;
use strata::error::DbError;
use strata::{PageId, Permissions, TransactionId};

#[test]
#[serial]
fn no_steal_refuses_to_evict_when_every_resident_page_is_dirty() {
    let t = setup_table("evict", 2, &[]);
    let file = t.db.catalog().file(t.table_id).unwrap();
    for _ in 0..3 {
        file.append_page().unwrap();
    }
    let pool = Arc::clone(t.db.pool());

    // A capacity-two pool reading three pages keeps the two most
    // recently touched.
    let reader = t.db.begin();
    for page_no in 0..3 {
        pool.get_page(
            reader.id(),
            PageId::new(t.table_id, page_no),
            Permissions::ReadOnly,
        )
        .unwrap();
    }
    assert_eq!(pool.cached_pages(), 2);
    reader.commit().unwrap();

    // Dirty both residents under a transaction that never commits.
    let writer = t.db.begin();
    for page_no in 1..3 {
        let page = pool
            .get_page(
                writer.id(),
                PageId::new(t.table_id, page_no),
                Permissions::ReadWrite,
            )
            .unwrap();
        page.write().mark_dirty(Some(writer.id()));
    }

    // Pages 1 and 2 were the residents; a fourth fetch has no clean
    // victim left.
    let other = t.db.begin();
    let err = pool
        .get_page(other.id(), PageId::new(t.table_id, 0), Permissions::ReadOnly)
        .unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));

    other.commit().unwrap();
    writer.abort().unwrap();
}

#[test]
#[serial]
fn abort_restores_the_committed_image_for_other_transactions() {
    let t = setup_table("abort_vis", 8, &[(1, 2)]);
    let pool = Arc::clone(t.db.pool());

    let writer = t.db.begin();
    pool.insert_tuple(writer.id(), t.table_id, int_tuple(&t.db, t.table_id, 9, 9))
        .unwrap();
    writer.abort().unwrap();

    assert_eq!(scan_all(&t.db, t.table_id), vec![(1, 2)]);
}

#[test]
#[serial]
fn a_shared_holder_upgrades_while_a_new_reader_waits() {
    let t = setup_table("upgrade", 8, &[(1, 1)]);
    let pool = Arc::clone(t.db.pool());
    let pid = PageId::new(t.table_id, 0);

    let a = t.db.begin();
    pool.get_page(a.id(), pid, Permissions::ReadOnly).unwrap();
    // Sole reader: the upgrade must not deadlock against itself.
    pool.get_page(a.id(), pid, Permissions::ReadWrite).unwrap();

    let b_tid = TransactionId::new();
    let pool_b = Arc::clone(&pool);
    let (started, wait_started) = mpsc::channel();
    let handle = thread::spawn(move || {
        started.send(()).unwrap();
        let res = pool_b.get_page(b_tid, pid, Permissions::ReadOnly).map(|_| ());
        if res.is_ok() {
            pool_b.transaction_complete(b_tid, true).unwrap();
        }
        res
    });

    wait_started.recv().unwrap();
    thread::sleep(Duration::from_millis(10));
    a.commit().unwrap();

    handle.join().unwrap().unwrap();
}

#[test]
#[serial]
fn crossed_upgrades_deadlock_and_a_timeout_resolves_it() {
    let t = setup_table("deadlock", 8, &[]);
    let file = t.db.catalog().file(t.table_id).unwrap();
    file.append_page().unwrap();
    file.append_page().unwrap();
    let pool = Arc::clone(t.db.pool());

    let p1 = PageId::new(t.table_id, 0);
    let p2 = PageId::new(t.table_id, 1);
    let a = TransactionId::new();
    let b = TransactionId::new();

    pool.get_page(a, p1, Permissions::ReadOnly).unwrap();
    pool.get_page(b, p2, Permissions::ReadOnly).unwrap();

    let run = |tid: TransactionId, target: PageId, pool: Arc<strata::BufferPool>| {
        thread::spawn(move || {
            let res = pool.get_page(tid, target, Permissions::ReadWrite).map(|_| ());
            pool.transaction_complete(tid, res.is_ok()).unwrap();
            res
        })
    };

    let ha = run(a, p2, Arc::clone(&pool));
    let hb = run(b, p1, Arc::clone(&pool));
    let ra = ha.join().unwrap();
    let rb = hb.join().unwrap();

    // Each waits on the page the other reads; a bounded wait has to
    // give up.
    assert!(ra.is_err() || rb.is_err());
    for res in [&ra, &rb] {
        if let Err(e) = res {
            assert!(matches!(e, DbError::TransactionAborted));
        }
    }

    // Both transactions are gone now, so the pages are free again.
    let fresh = TransactionId::new();
    pool.get_page(fresh, p1, Permissions::ReadWrite).unwrap();
    pool.get_page(fresh, p2, Permissions::ReadWrite).unwrap();
    pool.transaction_complete(fresh, true).unwrap();
}

#[test]
#[serial]
fn concurrent_writers_retry_after_aborts_and_all_rows_land() {
    let t = setup_table("retry", 8, &[]);
    let pool = Arc::clone(t.db.pool());
    let per_writer = 20;

    let mut handles = Vec::new();
    for writer in 0..2 {
        let pool = Arc::clone(&pool);
        let table_id = t.table_id;
        handles.push(thread::spawn(move || {
            let schema = pool.catalog().schema(table_id).unwrap();
            loop {
                let tid = TransactionId::new();
                let mut failed = false;
                for i in 0..per_writer {
                    let mut tuple = strata::Tuple::new(Arc::clone(&schema));
                    tuple
                        .set_field(0, strata::Field::Int(writer))
                        .unwrap();
                    tuple.set_field(1, strata::Field::Int(i)).unwrap();
                    match pool.insert_tuple(tid, table_id, tuple) {
                        Ok(()) => {}
                        Err(DbError::TransactionAborted) => {
                            failed = true;
                            break;
                        }
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
                if failed {
                    pool.transaction_complete(tid, false).unwrap();
                    thread::sleep(Duration::from_millis(5));
                    continue;
                }
                pool.transaction_complete(tid, true).unwrap();
                break;
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let rows = scan_all(&t.db, t.table_id);
    assert_eq!(rows.len(), 2 * per_writer as usize);
    for writer in 0..2 {
        let count = rows.iter().filter(|(a, _)| *a == writer).count();
        assert_eq!(count, per_writer as usize);
    }
}

#[test]
#[serial]
fn two_transactions_never_hold_exclusive_together() {
    let t = setup_table("excl", 8, &[(1, 1)]);
    let pool = Arc::clone(t.db.pool());
    let pid = PageId::new(t.table_id, 0);

    let a = TransactionId::new();
    pool.get_page(a, pid, Permissions::ReadWrite).unwrap();

    let b = TransactionId::new();
    let err = pool
        .get_page(b, pid, Permissions::ReadWrite)
        .unwrap_err();
    assert!(matches!(err, DbError::TransactionAborted));
    pool.transaction_complete(b, false).unwrap();
    pool.transaction_complete(a, true).unwrap();
}
