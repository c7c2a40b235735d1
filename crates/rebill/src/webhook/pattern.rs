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

//! Event pattern matching for endpoint subscriptions.
//!
//! A pattern is either an exact event type (`subscription.renewed`) or a
//! namespace glob (`subscription.*`) matching every type under that
//! namespace. An empty pattern list subscribes to all events.

/// Whether a single pattern matches an event type.
pub fn matches(pattern: &str, event_type: &str) -> bool {
    if pattern == event_type {
        return true;
    }
    if let Some(namespace) = pattern.strip_suffix(".*") {
        return event_type.len() > namespace.len() + 1
            && event_type.starts_with(namespace)
            && event_type.as_bytes()[namespace.len()] == b'.';
    }
    false
}

/// Whether any pattern in the list matches. An empty list matches everything.
pub fn matches_any(patterns: &[String], event_type: &str) -> bool {
    patterns.is_empty() || patterns.iter().any(|p| matches(p, event_type))
}
