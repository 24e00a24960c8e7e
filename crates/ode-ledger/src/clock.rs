use crate::entry::EntryId;

/// Hybrid logical clock that issues entry ids.
///
/// Combines wall-clock milliseconds with a logical counter so that:
/// - ids are strictly increasing, even for writes inside the same millisecond
/// - ids stay close to wall-clock time
/// - a wall clock that steps backwards (or a restart on such a clock) never
///   re-issues an id, because the clock resumes from the last id on disk
///
/// Not synchronized: the ledger only calls it while holding its writer lock.
#[derive(Debug, Default)]
pub struct IdClock {
    last: Option<EntryId>,
}

pub(crate) fn wall_clock_ms() -> u64 {
    let elapsed = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    elapsed.as_millis() as u64
}

impl IdClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume after the greatest id already issued.
    pub fn resume(last: Option<EntryId>) -> Self {
        Self { last }
    }

    /// Issue the next id.
    pub fn next(&mut self) -> EntryId {
        self.next_at(wall_clock_ms())
    }

    pub(crate) fn next_at(&mut self, wall: u64) -> EntryId {
        let id = match self.last {
            Some(prev) if wall <= prev.physical => {
                if prev.logical >= EntryId::MAX_LOGICAL {
                    // Borrow the next millisecond rather than overflow the
                    // fixed-width logical field.
                    EntryId::new(prev.physical + 1, 0)
                } else {
                    EntryId::new(prev.physical, prev.logical + 1)
                }
            }
            _ => EntryId::new(wall, 0),
        };
        self.last = Some(id);
        id
    }
}
