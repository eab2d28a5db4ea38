// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::sync::MutexGuard;

use jiff::Timestamp;
use jiff::civil::Time;
use jiff::tz::TimeZone;

use crate::rotation::clock::Clock;

/// Decides when a file sink must roll over.
///
/// Two triggers are combined: the file reaching `max_bytes`, and the wall clock passing the next
/// `daily_boundary`. The first boundary is anchored on the first check, to the target file's
/// last-modified time when the file exists, so that a restarted process still rotates a file
/// written before midnight. After every positive decision the next boundary is recomputed from
/// the evaluation time, so a checker that sat idle for days fires once and never schedules a
/// boundary in the past.
///
/// The checker is safe to share between writers: each call runs in one critical section.
#[derive(Debug)]
pub struct RotationChecker {
    max_bytes: Option<u64>,
    daily_boundary: Option<Time>,
    tz: TimeZone,
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    anchored: bool,
    next_rotation_at: Option<Timestamp>,
    clock: Clock,
}

impl RotationChecker {
    /// Creates a checker; either trigger may be absent.
    pub fn new(max_bytes: Option<u64>, daily_boundary: Option<Time>) -> Self {
        Self {
            max_bytes,
            daily_boundary,
            tz: TimeZone::system(),
            state: Mutex::new(State {
                anchored: false,
                next_rotation_at: None,
                clock: Clock::DefaultClock,
            }),
        }
    }

    /// Sets the timezone the daily boundary is interpreted in. Defaults to the system timezone.
    pub fn timezone(mut self, tz: TimeZone) -> Self {
        self.tz = tz;
        self
    }

    #[cfg(test)]
    pub(crate) fn clock(self, clock: Clock) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.clock = clock;
        }
        self
    }

    #[cfg(test)]
    pub(crate) fn set_now(&self, now: Timestamp) {
        self.lock().clock.set_now(now);
    }

    /// The size trigger, in bytes.
    pub fn max_bytes(&self) -> Option<u64> {
        self.max_bytes
    }

    /// The time-of-day trigger.
    pub fn daily_boundary(&self) -> Option<Time> {
        self.daily_boundary
    }

    /// The next scheduled time rotation, once anchored.
    pub fn next_rotation_at(&self) -> Option<Timestamp> {
        self.lock().next_rotation_at
    }

    /// Whether the file at `path`, currently `size` bytes long, must rotate before the next
    /// append.
    pub fn should_rotate(&self, path: &Path, size: u64) -> bool {
        let mut state = self.lock();
        let now = state.clock.now();

        if !state.anchored {
            state.anchored = true;
            if let Some(boundary) = self.daily_boundary {
                let anchor = fs::metadata(path)
                    .and_then(|metadata| metadata.modified())
                    .ok()
                    .and_then(|mtime| Timestamp::try_from(mtime).ok())
                    .unwrap_or(now);
                state.next_rotation_at = next_boundary(anchor, boundary, &self.tz);
            }
        }

        let on_size = self.max_bytes.is_some_and(|max| size >= max);
        let on_time = state.next_rotation_at.is_some_and(|at| now >= at);
        if !(on_size || on_time) {
            return false;
        }

        if let Some(boundary) = self.daily_boundary {
            state.next_rotation_at = next_boundary(now, boundary, &self.tz);
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // the state stays consistent even if a holder panicked
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The first occurrence of `boundary` strictly after `after`, in `tz`.
fn next_boundary(after: Timestamp, boundary: Time, tz: &TimeZone) -> Option<Timestamp> {
    let mut date = after.to_zoned(tz.clone()).date();
    // today's boundary, or else tomorrow's
    for _ in 0..2 {
        let candidate = date.to_datetime(boundary).to_zoned(tz.clone()).ok()?;
        if candidate.timestamp() > after {
            return Some(candidate.timestamp());
        }
        date = date.tomorrow().ok()?;
    }
    None
}
