/*
 *  Copyright 2026 Rebill Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Capped exponential backoff for task retries and webhook delivery retries.

use std::time::Duration;

/// Delay schedule: `base * 2^(attempt - 1)`, capped.
///
/// `attempt` is the 1-based count of attempts already made; the first retry
/// waits `base`, the second `2 * base`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay before the next attempt, given `attempt` attempts already made.
    pub fn delay_for(&self, attempt: i32) -> Duration {
        // Exponent clamp keeps the shift in range; the cap applies long before.
        let exp = attempt.saturating_sub(1).clamp(0, 20) as u32;
        let millis = (self.base.as_millis() as u64).saturating_mul(1u64 << exp);
        let capped = millis.min(self.cap.as_millis() as u64);
        Duration::from_millis(capped)
    }
}
