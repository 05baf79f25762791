//! Watcher ownership: single-writer election over the shared store.
//!
//! At most one ownership row exists. `acquire` runs inside an immediate
//! (write-reserving) transaction so two probers cannot both see the same
//! row state and both promote. Instance identifiers defeat PID recycling:
//! a live process with the recorded pid but a different instance id is not
//! the recorded owner.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::schema::OwnerRow;
use super::Store;
use crate::error::Result;

/// Outcome of an ownership probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Owner,
    Reader,
}

/// Parameters for [`OwnershipRepo::acquire`]. `now` and `is_alive` are
/// injectable so tests can simulate dead owners and recycled pids.
pub struct AcquireParams<'a> {
    pub now: DateTime<Utc>,
    pub is_alive: &'a dyn Fn(i64) -> bool,
    pub stale_after_seconds: i64,
    pub instance_id: Option<&'a str>,
}

impl<'a> AcquireParams<'a> {
    pub fn new(stale_after_seconds: i64, instance_id: Option<&'a str>) -> Self {
        Self {
            now: Utc::now(),
            is_alive: &pid_is_alive,
            stale_after_seconds,
            instance_id,
        }
    }
}

/// Default liveness probe: signal 0. `ESRCH` means dead; other errors
/// (notably `EPERM`) mean the pid exists and is treated as alive.
#[cfg(unix)]
pub fn pid_is_alive(pid: i64) -> bool {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc == 0 {
        return true;
    }
    let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
    errno != libc::ESRCH
}

#[cfg(not(unix))]
pub fn pid_is_alive(_pid: i64) -> bool {
    true
}

/// Access to the singleton `watcher_owner` row.
pub struct OwnershipRepo<'a> {
    store: &'a Store,
}

impl<'a> OwnershipRepo<'a> {
    pub(super) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    /// Probe for ownership. Returns `Owner` when this process now holds the
    /// row, `Reader` when a live, fresh owner already does.
    pub fn acquire(&self, pid: i64, params: &AcquireParams<'_>) -> Result<AcquireOutcome> {
        self.store.immediate_transaction(|store| {
            let repo = store.ownership();

            let Some(row) = repo.get()? else {
                repo.replace_row(pid, params.now, params.instance_id)?;
                return Ok(AcquireOutcome::Owner);
            };

            // Unparsable heartbeat counts as age 0: stale only when the
            // threshold itself is 0.
            let age_seconds = DateTime::parse_from_rfc3339(&row.heartbeat_at)
                .map(|hb| (params.now - hb.with_timezone(&Utc)).num_seconds())
                .unwrap_or(0);

            let pid_alive = (params.is_alive)(row.pid);

            // PID recycling: the recorded pid is alive but belongs to a
            // different process instance. The caller takes over. A matching
            // pid with a mismatched instance id is this process's own
            // refresh and falls through to the stale check instead.
            if pid_alive && row.pid != pid {
                if let (Some(theirs), Some(ours)) = (row.instance_id.as_deref(), params.instance_id)
                {
                    if theirs != ours {
                        repo.replace_row(pid, params.now, params.instance_id)?;
                        return Ok(AcquireOutcome::Owner);
                    }
                }
            }

            if pid_alive && age_seconds < params.stale_after_seconds {
                return Ok(AcquireOutcome::Reader);
            }

            // Dead or stale: take over.
            repo.replace_row(pid, params.now, params.instance_id)?;
            Ok(AcquireOutcome::Owner)
        })
    }

    /// Refresh the heartbeat iff `pid` still owns the row.
    pub fn update_heartbeat(&self, pid: i64, now: DateTime<Utc>) -> Result<bool> {
        let affected = self.store.conn().execute(
            "UPDATE watcher_owner SET heartbeat_at = ?1 WHERE pid = ?2",
            params![now.to_rfc3339(), pid],
        )?;
        Ok(affected > 0)
    }

    /// Delete the row iff `pid` owns it.
    pub fn release(&self, pid: i64) -> Result<bool> {
        let affected = self
            .store
            .conn()
            .execute("DELETE FROM watcher_owner WHERE pid = ?1", params![pid])?;
        Ok(affected > 0)
    }

    /// Read the current row, if any.
    pub fn get(&self) -> Result<Option<OwnerRow>> {
        let row = self
            .store
            .conn()
            .query_row(
                "SELECT pid, heartbeat_at, instance_id FROM watcher_owner",
                [],
                |row| {
                    Ok(OwnerRow {
                        pid: row.get(0)?,
                        heartbeat_at: row.get(1)?,
                        instance_id: row.get(2)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(row)
    }

    /// Replace whatever row exists with (pid, now, instance_id), keeping the
    /// table at one row.
    fn replace_row(&self, pid: i64, now: DateTime<Utc>, instance_id: Option<&str>) -> Result<()> {
        let conn = self.store.conn();
        conn.execute("DELETE FROM watcher_owner", [])?;
        conn.execute(
            "INSERT INTO watcher_owner (pid, heartbeat_at, instance_id) VALUES (?1, ?2, ?3)",
            params![pid, now.to_rfc3339(), instance_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn params_at<'a>(
        now: DateTime<Utc>,
        alive: &'a dyn Fn(i64) -> bool,
        stale: i64,
        instance: Option<&'a str>,
    ) -> AcquireParams<'a> {
        AcquireParams {
            now,
            is_alive: alive,
            stale_after_seconds: stale,
            instance_id: instance,
        }
    }

    #[test]
    fn first_caller_becomes_owner() {
        let store = Store::open_in_memory().unwrap();
        let alive = |_: i64| true;
        let outcome = store
            .ownership()
            .acquire(100, &params_at(Utc::now(), &alive, 60, Some("a")))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);

        let row = store.ownership().get().unwrap().unwrap();
        assert_eq!(row.pid, 100);
        assert_eq!(row.instance_id.as_deref(), Some("a"));
    }

    #[test]
    fn mismatched_instance_ids_across_pids_take_over() {
        let store = Store::open_in_memory().unwrap();
        let alive = |_: i64| true;
        let now = Utc::now();
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, Some("a")))
            .unwrap();

        // A live recorded pid whose instance id differs from the caller's
        // is indistinguishable from a recycled pid, so the caller wins.
        let outcome = store
            .ownership()
            .acquire(200, &params_at(now + Duration::seconds(10), &alive, 60, Some("b")))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);
        assert_eq!(store.ownership().get().unwrap().unwrap().pid, 200);
    }

    #[test]
    fn reader_when_owner_alive_without_instance_ids() {
        let store = Store::open_in_memory().unwrap();
        let alive = |_: i64| true;
        let now = Utc::now();
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, None))
            .unwrap();

        let outcome = store
            .ownership()
            .acquire(200, &params_at(now + Duration::seconds(10), &alive, 60, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Reader);
        assert_eq!(store.ownership().get().unwrap().unwrap().pid, 100);
    }

    #[test]
    fn takeover_on_dead_owner() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let alive = |_: i64| true;
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, None))
            .unwrap();

        let dead = |pid: i64| pid != 100;
        let outcome = store
            .ownership()
            .acquire(200, &params_at(now + Duration::seconds(1), &dead, 60, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);
        assert_eq!(store.ownership().get().unwrap().unwrap().pid, 200);
    }

    #[test]
    fn takeover_on_stale_heartbeat() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let alive = |_: i64| true;
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, None))
            .unwrap();

        // Age exactly equal to the threshold is stale.
        let outcome = store
            .ownership()
            .acquire(200, &params_at(now + Duration::seconds(60), &alive, 60, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);
    }

    #[test]
    fn zero_stale_threshold_always_promotes() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let alive = |_: i64| true;
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 0, None))
            .unwrap();

        let outcome = store
            .ownership()
            .acquire(200, &params_at(now, &alive, 0, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);
    }

    #[test]
    fn pid_recycling_detected_via_instance_ids() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let alive = |_: i64| true;

        // P1 owns with instance A; the OS later hands P1's pid to another
        // process, so the pid still probes alive.
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, Some("A")))
            .unwrap();

        let outcome = store
            .ownership()
            .acquire(200, &params_at(now + Duration::seconds(5), &alive, 60, Some("B")))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);

        let row = store.ownership().get().unwrap().unwrap();
        assert_eq!(row.pid, 200);
        assert_eq!(row.instance_id.as_deref(), Some("B"));
    }

    #[test]
    fn own_refresh_with_new_instance_id_is_not_recycling() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let alive = |_: i64| true;
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, Some("A")))
            .unwrap();

        // Same pid, different instance id, fresh heartbeat: falls through
        // to the stale check and stays whatever the row says.
        let outcome = store
            .ownership()
            .acquire(100, &params_at(now + Duration::seconds(5), &alive, 60, Some("B")))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Reader);
        assert_eq!(
            store.ownership().get().unwrap().unwrap().instance_id.as_deref(),
            Some("A")
        );
    }

    #[test]
    fn unparsable_heartbeat_counts_as_age_zero() {
        let store = Store::open_in_memory().unwrap();
        insert_raw_row(&store, 100, "not-a-timestamp", None);

        let alive = |_: i64| true;
        // Threshold > 0: age 0 is fresh, caller stays reader.
        let outcome = store
            .ownership()
            .acquire(200, &params_at(Utc::now(), &alive, 60, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Reader);

        // Threshold 0: age 0 is stale, caller promotes.
        let outcome = store
            .ownership()
            .acquire(200, &params_at(Utc::now(), &alive, 0, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);
    }

    #[test]
    fn heartbeat_and_release_require_matching_pid() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let alive = |_: i64| true;
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, None))
            .unwrap();

        assert!(!store.ownership().update_heartbeat(999, now).unwrap());
        assert!(store.ownership().update_heartbeat(100, now).unwrap());

        assert!(!store.ownership().release(999).unwrap());
        assert!(store.ownership().release(100).unwrap());
        assert!(store.ownership().get().unwrap().is_none());
    }

    #[test]
    fn release_then_acquire_is_owner() {
        let store = Store::open_in_memory().unwrap();
        let alive = |_: i64| true;
        let now = Utc::now();
        store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, None))
            .unwrap();
        store.ownership().release(100).unwrap();

        let outcome = store
            .ownership()
            .acquire(100, &params_at(now, &alive, 60, None))
            .unwrap();
        assert_eq!(outcome, AcquireOutcome::Owner);
    }

    fn insert_raw_row(store: &Store, pid: i64, heartbeat: &str, instance: Option<&str>) {
        store
            .conn()
            .execute(
                "INSERT INTO watcher_owner (pid, heartbeat_at, instance_id) VALUES (?1, ?2, ?3)",
                params![pid, heartbeat, instance],
            )
            .unwrap();
    }
}
