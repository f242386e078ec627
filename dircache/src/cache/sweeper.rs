// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Background expiry sweep
//!
//! A single worker thread wakes every sweep period and removes expired
//! queries from every template. When a pass finds no cached queries at all
//! the worker pauses until the next admission resumes it.

use log::{debug, info};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::cache_manager::CacheManager;
use super::template::CachedQuery;
use crate::error::{CacheError, CacheResult};

/// Summary of one sweep pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Templates that held at least one query when the pass started
    pub populated_templates: usize,
    /// Queries removed because their TTL elapsed
    pub expired: usize,
}

#[derive(Debug, Default)]
struct SweepState {
    running: bool,
    paused: bool,
    shutdown: bool,
    /// Bumped on every resume so a pass can tell it raced with an admission
    resumes: u64,
}

/// Pause/resume/shutdown signalling between the cache and its worker
#[derive(Debug, Default)]
pub(crate) struct SweepControl {
    state: Mutex<SweepState>,
    signal: Condvar,
}

impl SweepControl {
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.resumes = state.resumes.wrapping_add(1);
        if state.paused {
            state.paused = false;
            debug!("Resuming expiry sweep");
            self.signal.notify_all();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.signal.notify_all();
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.paused = false;
        state.shutdown = false;
    }
}

/// Owner of the sweep worker. Dropping it stops the worker.
pub struct SweepHandle {
    control: Arc<SweepControl>,
    worker: Option<JoinHandle<()>>,
}

impl SweepHandle {
    /// Whether the worker is waiting for the next admission
    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.control.shutdown();
            if worker.join().is_err() {
                log::error!("Expiry sweep worker panicked");
            }
            self.control.reset();
        }
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl CacheManager {
    /// Start the sweep worker with the configured period
    pub fn start_sweeper(self: &Arc<Self>) -> CacheResult<SweepHandle> {
        let period = Duration::from_secs(self.config.sweep_period_secs.max(1));
        self.start_sweeper_every(period)
    }

    /// Start the sweep worker with an explicit period
    pub fn start_sweeper_every(self: &Arc<Self>, period: Duration) -> CacheResult<SweepHandle> {
        {
            let mut state = self.sweep.state.lock();
            if state.running {
                return Err(CacheError::Sweeper("sweeper already running".to_string()));
            }
            state.running = true;
            state.paused = false;
            state.shutdown = false;
        }

        let manager = Arc::clone(self);
        let control = Arc::clone(&self.sweep);
        let worker = std::thread::Builder::new()
            .name("dircache-sweep".to_string())
            .spawn(move || run_sweeper(manager, period))
            .map_err(|e| {
                control.reset();
                CacheError::Sweeper(e.to_string())
            })?;

        info!("Expiry sweep started, period {:?}", period);
        Ok(SweepHandle {
            control: Arc::clone(&self.sweep),
            worker: Some(worker),
        })
    }

    /// One sweep pass: remove every query whose TTL has elapsed
    pub fn expire_stale(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for template in &self.templates {
            let expired: Vec<Arc<CachedQuery>> = {
                let mut chain = template.chain.write();
                if !chain.is_empty() {
                    report.populated_templates += 1;
                }
                let mut expired = Vec::new();
                while let Some(cached) = chain.pop_expired(now) {
                    self.lru.lock().unlink(cached.id);
                    expired.push(cached);
                }
                expired
            };

            if expired.is_empty() {
                continue;
            }

            let _guard = self.store_guard.write();
            for cached in &expired {
                debug!(
                    "Query {} of template {} expired at {}",
                    cached.id, template.id, cached.expiry
                );
                self.release(cached);
            }
            self.counters.lock().expired += expired.len() as u64;
            report.expired += expired.len();
        }

        if report.expired > 0 {
            info!("Expiry sweep removed {} queries", report.expired);
        }
        report
    }
}

fn run_sweeper(manager: Arc<CacheManager>, period: Duration) {
    let control = Arc::clone(&manager.sweep);
    let mut state = control.state.lock();

    while !state.shutdown {
        if state.paused {
            control.signal.wait(&mut state);
            continue;
        }

        let Some(deadline) = Instant::now().checked_add(period) else {
            // Unrepresentable deadline: only shutdown ends the wait
            while !state.shutdown {
                control.signal.wait(&mut state);
            }
            break;
        };
        while !state.shutdown && Instant::now() < deadline {
            control.signal.wait_until(&mut state, deadline);
        }
        if state.shutdown {
            break;
        }

        let seen = state.resumes;
        let report = MutexGuard::unlocked(&mut state, || manager.expire_stale());

        if report.populated_templates == 0 && state.resumes == seen && !state.shutdown {
            debug!("No cached queries left, pausing expiry sweep");
            state.paused = true;
        }
    }

    debug!("Expiry sweep worker exiting");
}
