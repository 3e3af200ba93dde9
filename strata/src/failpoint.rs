//! Named failpoints for fault-injection tests.
//!
//! A failpoint is armed either for the current thread via [`enable`] or
//! process-wide through the `STRATA_FAILPOINTS` environment variable (a
//! comma-separated list of names). Production code paths call
//! [`maybe_fail`] at the spots worth breaking.

use std::cell::RefCell;
use std::collections::HashSet;
use std::io;

thread_local! {
    static FAILPOINTS: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

pub fn enable(name: &str) {
    FAILPOINTS.with(|set| {
        set.borrow_mut().insert(name.to_string());
    });
}

pub fn disable(name: &str) {
    FAILPOINTS.with(|set| {
        set.borrow_mut().remove(name);
    });
}

pub fn clear() {
    FAILPOINTS.with(|set| {
        set.borrow_mut().clear();
    });
}

pub fn is_enabled(name: &str) -> bool {
    let local_enabled = FAILPOINTS.with(|set| set.borrow().contains(name));
    if local_enabled {
        return true;
    }

    std::env::var("STRATA_FAILPOINTS")
        .ok()
        .map(|raw| raw.split(',').any(|v| v.trim() == name))
        .unwrap_or(false)
}

pub fn maybe_fail(name: &str) -> io::Result<()> {
    if is_enabled(name) {
        Err(io::Error::other(format!("failpoint triggered: {name}")))
    } else {
        Ok(())
    }
}

/// Arms a failpoint for the current scope; the point is disarmed when
/// the scope drops, unwinding included.
pub struct FailScope {
    name: &'static str,
}

impl FailScope {
    pub fn arm(name: &'static str) -> Self {
        enable(name);
        Self { name }
    }
}

impl Drop for FailScope {
    fn drop(&mut self) {
        disable(self.name);
    }
}
