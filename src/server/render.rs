//! Submission of committed surfaces to the render backend
//!
//! Every commit that makes new contents current schedules one submission.
//! Backpressure is retried on the next cycle; failures are retried with
//! exponential backoff until the retry budget runs out, at which point the
//! surface is marked non-presentable until a later submission succeeds.
//! Damage of commits that have not reached the backend yet accumulates, so
//! the submission that finally gets through reports all of it.

use crate::backend::{RenderBackend, Submission};
use crate::compositor::{DamageSet, SurfaceManager};
use crate::protocol::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct PendingSubmission {
    failures: u32,
    not_before: Instant,
    damage: DamageSet,
}

/// What one flush did, for logging and tests
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub accepted: Vec<SurfaceId>,
    pub deferred: Vec<SurfaceId>,
    pub abandoned: Vec<SurfaceId>,
}

#[derive(Debug)]
pub struct RenderQueue {
    pending: BTreeMap<SurfaceId, PendingSubmission>,
    max_retries: u32,
    base_backoff: Duration,
}

impl RenderQueue {
    pub fn new(max_retries: u32, base_backoff: Duration) -> Self {
        RenderQueue {
            pending: BTreeMap::new(),
            max_retries,
            base_backoff,
        }
    }

    /// Queue a submission. A newer commit restarts any pending retry and
    /// adds its damage to what is still unsubmitted.
    pub fn schedule(&mut self, surface: SurfaceId, damage: &[Rect], now: Instant) {
        let pending = self
            .pending
            .entry(surface)
            .or_insert_with(|| PendingSubmission {
                failures: 0,
                not_before: now,
                damage: DamageSet::default(),
            });
        pending.failures = 0;
        pending.not_before = now;
        for rect in damage {
            pending.damage.add(*rect);
        }
    }

    pub fn forget(&mut self, surface: SurfaceId) {
        self.pending.remove(&surface);
    }

    pub fn forget_client(&mut self, client: ClientId) {
        self.pending.retain(|surface, _| surface.client != client);
    }

    pub fn is_pending(&self, surface: SurfaceId) -> bool {
        self.pending.contains_key(&surface)
    }

    /// Earliest time a pending submission becomes due
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.not_before).min()
    }

    fn backoff(base_backoff: Duration, failures: u32) -> Duration {
        base_backoff
            .saturating_mul(1u32 << failures.saturating_sub(1).min(16))
    }

    /// Submit everything that is due
    pub fn flush(
        &mut self,
        backend: &mut dyn RenderBackend,
        surfaces: &mut SurfaceManager,
        now: Instant,
    ) -> FlushReport {
        let mut report = FlushReport::default();
        let due: Vec<SurfaceId> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.not_before <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(surface) = surfaces.surface(id) else {
                self.pending.remove(&id);
                continue;
            };
            let handle = surface
                .current
                .buffer
                .and_then(|object| surfaces.buffer(BufferId::new(id.client, object)))
                .map(|buffer| buffer.handle());
            let Some(handle) = handle else {
                // Nothing to show; the unmap itself is what the backend sees
                self.pending.remove(&id);
                continue;
            };
            let Some(pending) = self.pending.get_mut(&id) else {
                continue;
            };
            // A surface the backend gave up on is resubmitted whole
            if !surface.presentable {
                pending.damage.add(surface.current.bounds());
            }
            pending.damage.clip(surface.current.bounds());
            let damage = pending.damage.rects().to_vec();

            match backend.submit(id, &handle, &damage) {
                Ok(Submission::Accepted) => {
                    self.pending.remove(&id);
                    surfaces.set_presentable(id, true);
                    report.accepted.push(id);
                }
                Ok(Submission::Backpressure) => {
                    log::trace!("Backend pushed back on {}", id);
                    report.deferred.push(id);
                }
                Err(err) => {
                    let failures = pending.failures + 1;
                    if failures > self.max_retries {
                        log::error!(
                            "Giving up on {} after {} failed submissions: {}",
                            id,
                            failures,
                            err
                        );
                        self.pending.remove(&id);
                        surfaces.set_presentable(id, false);
                        report.abandoned.push(id);
                    } else {
                        let delay = Self::backoff(self.base_backoff, failures);
                        log::warn!(
                            "Submission of {} failed ({}), retry {} in {:?}",
                            id,
                            err,
                            failures,
                            delay
                        );
                        pending.failures = failures;
                        pending.not_before = now + delay;
                        report.deferred.push(id);
                    }
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CascadePlacement, NullBackend};
    use crate::compositor::SurfaceLimits;
    use std::os::fd::OwnedFd;

    const CLIENT: ClientId = ClientId(1);

    fn mapped_surface() -> (SurfaceManager, SurfaceId) {
        let mut manager = SurfaceManager::new(
            SurfaceLimits::default(),
            vec![PixelFormat::Argb8888],
            Rect::from_size(640, 480),
        );
        let mut placement = CascadePlacement::new(Rect::from_size(640, 480));
        let file = tempfile::tempfile().unwrap();
        file.set_len(1600).unwrap();
        manager
            .create_pool(CLIENT, ObjectId(5), OwnedFd::from(file), 1600)
            .unwrap();
        manager
            .create_buffer(CLIENT, ObjectId(5), ObjectId(6), 0, 20, 20, 80, 0)
            .unwrap();
        manager.create_surface(CLIENT, ObjectId(3), 6).unwrap();
        manager.attach(CLIENT, ObjectId(3), Some(ObjectId(6)), 0, 0).unwrap();
        manager.commit(CLIENT, ObjectId(3), &mut placement).unwrap();
        (manager, SurfaceId::new(CLIENT, ObjectId(3)))
    }

    fn schedule_current(queue: &mut RenderQueue, manager: &SurfaceManager, surface: SurfaceId, now: Instant) {
        let damage = manager.surface(surface).unwrap().current.damage.clone();
        queue.schedule(surface, &damage, now);
    }

    #[test]
    fn test_accepted_submission_carries_damage() {
        let (mut manager, surface) = mapped_surface();
        let mut backend = NullBackend::new();
        let mut queue = RenderQueue::new(3, Duration::from_millis(10));
        let now = Instant::now();
        schedule_current(&mut queue, &manager, surface, now);

        let report = queue.flush(&mut backend, &mut manager, now);
        assert_eq!(report.accepted, vec![surface]);
        assert_eq!(backend.frames()[0].damage, vec![Rect::new(0, 0, 20, 20)]);
        assert!(!queue.is_pending(surface));
    }

    #[test]
    fn test_backpressure_retries_next_cycle() {
        let (mut manager, surface) = mapped_surface();
        let mut backend = NullBackend::new();
        backend.push_back(1);
        let mut queue = RenderQueue::new(3, Duration::from_millis(10));
        let now = Instant::now();
        schedule_current(&mut queue, &manager, surface, now);

        assert_eq!(queue.flush(&mut backend, &mut manager, now).deferred, vec![surface]);
        assert_eq!(queue.flush(&mut backend, &mut manager, now).accepted, vec![surface]);
    }

    #[test]
    fn test_failures_back_off_then_mark_non_presentable() {
        let (mut manager, surface) = mapped_surface();
        let mut backend = NullBackend::new();
        backend.fail(3);
        let mut queue = RenderQueue::new(2, Duration::from_millis(10));
        let start = Instant::now();
        schedule_current(&mut queue, &manager, surface, start);

        queue.flush(&mut backend, &mut manager, start);
        // Not due yet
        assert!(queue
            .flush(&mut backend, &mut manager, start + Duration::from_millis(5))
            .deferred
            .is_empty());
        queue.flush(&mut backend, &mut manager, start + Duration::from_millis(10));
        let report = queue.flush(&mut backend, &mut manager, start + Duration::from_secs(1));
        assert_eq!(report.abandoned, vec![surface]);
        assert!(!manager.surface(surface).unwrap().presentable);

        // A later commit that gets through makes it presentable again
        schedule_current(&mut queue, &manager, surface, start + Duration::from_secs(2));
        queue.flush(&mut backend, &mut manager, start + Duration::from_secs(2));
        assert!(manager.surface(surface).unwrap().presentable);
    }

    #[test]
    fn test_deferred_damage_is_carried_into_the_next_commit() {
        let (mut manager, surface) = mapped_surface();
        let mut placement = CascadePlacement::new(Rect::from_size(640, 480));
        let mut backend = NullBackend::new();
        backend.push_back(1);
        let mut queue = RenderQueue::new(3, Duration::from_millis(10));
        let now = Instant::now();

        manager.damage(CLIENT, ObjectId(3), Rect::new(0, 0, 5, 5)).unwrap();
        manager.commit(CLIENT, ObjectId(3), &mut placement).unwrap();
        schedule_current(&mut queue, &manager, surface, now);
        assert_eq!(queue.flush(&mut backend, &mut manager, now).deferred, vec![surface]);

        manager.damage(CLIENT, ObjectId(3), Rect::new(15, 15, 5, 5)).unwrap();
        manager.commit(CLIENT, ObjectId(3), &mut placement).unwrap();
        schedule_current(&mut queue, &manager, surface, now);
        assert_eq!(queue.flush(&mut backend, &mut manager, now).accepted, vec![surface]);

        let mut submitted = backend.frames()[0].damage.clone();
        submitted.sort_by_key(|rect| (rect.x, rect.y));
        assert_eq!(submitted, vec![Rect::new(0, 0, 5, 5), Rect::new(15, 15, 5, 5)]);

        // Accepted damage is not reported again
        manager.damage(CLIENT, ObjectId(3), Rect::new(8, 8, 2, 2)).unwrap();
        manager.commit(CLIENT, ObjectId(3), &mut placement).unwrap();
        schedule_current(&mut queue, &manager, surface, now);
        queue.flush(&mut backend, &mut manager, now);
        assert_eq!(backend.frames()[1].damage, vec![Rect::new(8, 8, 2, 2)]);
    }
}
