// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
/// Render coalescing: at most one render is in flight.  A request during
/// flight sets a follow-up flag; when the in-flight render resolves exactly
/// one follow-up render runs, and further requests during the follow-up
/// merge into it.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    in_flight: bool,
    follow_up: bool,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a render.  Returns `true` when the caller should render now;
    /// `false` when a render is already in flight (the request is folded
    /// into the follow-up).
    pub fn request(&mut self) -> bool {
        if self.in_flight {
            self.follow_up = true;
            false
        } else {
            self.in_flight = true;
            true
        }
    }

    /// A render finished.  Returns `true` when a follow-up render must run
    /// immediately (the scheduler stays in flight for it).
    pub fn complete(&mut self) -> bool {
        if self.follow_up {
            self.follow_up = false;
            true
        } else {
            self.in_flight = false;
            false
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
