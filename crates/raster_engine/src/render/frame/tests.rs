//! Frame protocol tests against a scripted in-memory backend
//!
//! The backend simulates a GPU that retires a submission as soon as its fence
//! is waited on, and checks the pacing invariants on every call:
//! a slot's sync primitives are only reused after its fence was observed
//! signaled, and an image is only targeted after the fence guarding its
//! previous submission was observed signaled.

use super::*;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    WaitFence(usize),
    ResetFence(usize),
    Acquire(usize),
    Submit { slot: usize, image: u32 },
    Present { slot: usize, image: u32 },
    WaitIdle,
    WaitEvents,
    Rebuild(usize),
    Upload(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fence {
    Signaled,
    Unsignaled,
    Pending,
}

#[derive(Debug, Clone, Copy)]
enum AcquireScript {
    Ready,
    Suboptimal,
    Stale,
}

#[derive(Debug, Clone, Copy)]
enum PresentScript {
    Ready,
    Suboptimal,
    Stale,
}

struct ScriptedBackend {
    events: Vec<Event>,
    clock: u64,
    fences: Vec<Fence>,
    /// Time each slot's fence was last observed signaled
    fence_observed_at: Vec<Option<u64>>,
    /// Time of each slot's last submission
    slot_submitted_at: Vec<Option<u64>>,
    /// Last submission per image: (slot, time)
    image_submitted: Vec<Option<(usize, u64)>>,
    image_count: usize,
    rebuild_image_counts: VecDeque<usize>,
    next_image: u32,
    acquire_script: VecDeque<AcquireScript>,
    present_script: VecDeque<PresentScript>,
    extents: VecDeque<(u32, u32)>,
    default_extent: (u32, u32),
    window_resized: bool,
    resize_on_wait_events: bool,
    fail_wait_on_call: Option<usize>,
    fence_waits: usize,
    uploaded: Vec<Vertex>,
}

impl ScriptedBackend {
    fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            events: Vec::new(),
            clock: 0,
            fences: vec![Fence::Signaled; frames_in_flight],
            fence_observed_at: vec![None; frames_in_flight],
            slot_submitted_at: vec![None; frames_in_flight],
            image_submitted: vec![None; image_count],
            image_count,
            rebuild_image_counts: VecDeque::new(),
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            extents: VecDeque::new(),
            default_extent: (800, 600),
            window_resized: false,
            resize_on_wait_events: false,
            fail_wait_on_call: None,
            fence_waits: 0,
            uploaded: Vec::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|event| predicate(event)).count()
    }

    fn submissions(&self) -> Vec<(usize, u32)> {
        self.events
            .iter()
            .filter_map(|event| match *event {
                Event::Submit { slot, image } => Some((slot, image)),
                _ => None,
            })
            .collect()
    }
}

impl FrameBackend for ScriptedBackend {
    fn wait_slot_fence(&mut self, slot: usize) -> FrameResult<()> {
        self.fence_waits += 1;
        if self.fail_wait_on_call == Some(self.fence_waits) {
            return Err(FrameError::Timeout {
                operation: "in-flight fence",
                timeout_ms: 100,
            });
        }

        let now = self.tick();
        self.events.push(Event::WaitFence(slot));
        assert_ne!(self.fences[slot], Fence::Unsignaled, "waiting on a reset fence that was never submitted would deadlock");
        self.fences[slot] = Fence::Signaled;
        self.fence_observed_at[slot] = Some(now);
        Ok(())
    }

    fn reset_slot_fence(&mut self, slot: usize) -> FrameResult<()> {
        self.tick();
        self.events.push(Event::ResetFence(slot));
        assert_eq!(self.fences[slot], Fence::Signaled, "reset of a fence still pending on slot {slot}");
        self.fences[slot] = Fence::Unsignaled;
        Ok(())
    }

    fn acquire_image(&mut self, slot: usize) -> FrameResult<SurfaceStatus<u32>> {
        self.tick();
        self.events.push(Event::Acquire(slot));

        let script = self.acquire_script.pop_front().unwrap_or(AcquireScript::Ready);
        if matches!(script, AcquireScript::Stale) {
            return Ok(SurfaceStatus::Stale);
        }

        let image = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count as u32;
        Ok(match script {
            AcquireScript::Suboptimal => SurfaceStatus::Suboptimal(image),
            _ => SurfaceStatus::Ready(image),
        })
    }

    fn submit(&mut self, slot: usize, image: u32) -> FrameResult<()> {
        let now = self.tick();
        self.events.push(Event::Submit { slot, image });

        // Frame-slot mutual exclusion
        assert_eq!(self.fences[slot], Fence::Unsignaled, "slot {slot} submitted without a fence reset");
        if let Some(previous) = self.slot_submitted_at[slot] {
            let observed = self.fence_observed_at[slot].unwrap_or(0);
            assert!(observed > previous, "slot {slot} reused before its fence was observed signaled");
        }

        // Image reuse safety
        if let Some((owner, previous)) = self.image_submitted[image as usize] {
            let observed = self.fence_observed_at[owner].unwrap_or(0);
            assert!(observed > previous, "image {image} targeted before slot {owner}'s fence retired it");
        }

        self.fences[slot] = Fence::Pending;
        self.slot_submitted_at[slot] = Some(now);
        self.image_submitted[image as usize] = Some((slot, now));
        Ok(())
    }

    fn present(&mut self, slot: usize, image: u32) -> FrameResult<SurfaceStatus<()>> {
        self.tick();
        self.events.push(Event::Present { slot, image });
        Ok(match self.present_script.pop_front().unwrap_or(PresentScript::Ready) {
            PresentScript::Ready => SurfaceStatus::Ready(()),
            PresentScript::Suboptimal => SurfaceStatus::Suboptimal(()),
            PresentScript::Stale => SurfaceStatus::Stale,
        })
    }

    fn wait_device_idle(&mut self) -> FrameResult<()> {
        self.tick();
        self.events.push(Event::WaitIdle);
        for fence in &mut self.fences {
            if *fence == Fence::Pending {
                *fence = Fence::Signaled;
            }
        }
        let now = self.clock;
        for (slot, fence) in self.fences.iter().enumerate() {
            if *fence == Fence::Signaled {
                self.fence_observed_at[slot] = Some(now);
            }
        }
        Ok(())
    }

    fn window_extent(&mut self) -> (u32, u32) {
        self.extents.pop_front().unwrap_or(self.default_extent)
    }

    fn wait_window_events(&mut self) {
        self.events.push(Event::WaitEvents);
        if self.resize_on_wait_events {
            self.window_resized = true;
        }
    }

    fn take_window_resized(&mut self) -> bool {
        std::mem::take(&mut self.window_resized)
    }

    fn rebuild_surface(&mut self) -> FrameResult<usize> {
        self.tick();
        if let Some(count) = self.rebuild_image_counts.pop_front() {
            self.image_count = count;
        }
        self.events.push(Event::Rebuild(self.image_count));
        self.image_submitted = vec![None; self.image_count];
        self.next_image = 0;
        Ok(self.image_count)
    }

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn upload_vertices(&mut self, vertices: &[Vertex]) -> FrameResult<()> {
        self.tick();
        self.events.push(Event::Upload(vertices.len()));
        assert!(
            self.fences.iter().all(|fence| *fence == Fence::Signaled),
            "vertex upload while a draw may still read the buffer"
        );
        self.uploaded = vertices.to_vec();
        Ok(())
    }
}

fn orchestrator(frames_in_flight: usize, image_count: usize) -> FrameOrchestrator<ScriptedBackend> {
    FrameOrchestrator::new(ScriptedBackend::new(frames_in_flight, image_count), frames_in_flight)
}

#[test]
fn test_new_orchestrator_is_idle() {
    let frames = orchestrator(2, 3);
    assert_eq!(frames.state(), FrameState::Idle);
    assert_eq!(frames.current_slot(), 0);
    assert_eq!(frames.image_in_use(), &[None, None, None]);
    assert_eq!(frames.stats(), FrameStats::default());
}

#[test]
fn test_five_frames_cycle_slots() {
    let mut frames = orchestrator(2, 3);
    let mut slots = Vec::new();

    for _ in 0..5 {
        slots.push(frames.current_slot());
        let outcome = frames.draw_frame().unwrap();
        assert!(matches!(outcome, FrameOutcome::Presented { adapted: false, .. }));
        assert_eq!(frames.state(), FrameState::Idle);
    }

    assert_eq!(slots, vec![0, 1, 0, 1, 0]);
    assert_eq!(frames.current_slot(), 1);

    let submissions = frames.backend().submissions();
    assert_eq!(submissions, vec![(0, 0), (1, 1), (0, 2), (1, 0), (0, 1)]);

    // Every image was written at least once, the map holds the latest owner
    let mut written = [0usize; 3];
    for (_, image) in &submissions {
        written[*image as usize] += 1;
    }
    assert!(written.iter().all(|&count| count >= 1));
    assert_eq!(frames.image_in_use(), &[Some(1), Some(0), Some(0)]);

    assert_eq!(frames.stats().frames_presented, 5);
    assert_eq!(frames.stats().adapts, 0);
}

#[test]
fn test_frame_step_order() {
    let mut frames = orchestrator(2, 3);
    frames.draw_frame().unwrap();

    assert_eq!(
        frames.backend().events,
        vec![
            Event::WaitFence(0),
            Event::Acquire(0),
            Event::ResetFence(0),
            Event::Submit { slot: 0, image: 0 },
            Event::Present { slot: 0, image: 0 },
        ]
    );
}

#[test]
fn test_reused_image_waits_for_previous_owner() {
    let mut frames = orchestrator(2, 3);
    for _ in 0..3 {
        frames.draw_frame().unwrap();
    }
    frames.backend_mut().events.clear();

    // Image 0 was last submitted by slot 0; slot 1 now acquires it
    frames.draw_frame().unwrap();
    assert_eq!(
        frames.backend().events,
        vec![
            Event::WaitFence(1),
            Event::Acquire(1),
            Event::WaitFence(0),
            Event::ResetFence(1),
            Event::Submit { slot: 1, image: 0 },
            Event::Present { slot: 1, image: 0 },
        ]
    );
}

#[test]
fn test_more_slots_than_images() {
    // N > M forces the image wait to do real work every frame
    let mut frames = orchestrator(3, 2);
    for _ in 0..12 {
        frames.draw_frame().unwrap();
    }
    assert_eq!(frames.backend().submissions().len(), 12);
    assert_eq!(frames.current_slot(), 0);
}

#[test]
fn test_stale_on_third_acquire_skips_frame() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().acquire_script = VecDeque::from(vec![
        AcquireScript::Ready,
        AcquireScript::Ready,
        AcquireScript::Stale,
    ]);

    frames.draw_frame().unwrap();
    frames.draw_frame().unwrap();
    let slot_before = frames.current_slot();
    let submissions_before = frames.backend().submissions().len();
    let presents_before = frames.backend().count(|e| matches!(e, Event::Present { .. }));

    let outcome = frames.draw_frame().unwrap();

    assert_eq!(outcome, FrameOutcome::Skipped);
    assert_eq!(frames.current_slot(), slot_before);
    assert_eq!(frames.backend().submissions().len(), submissions_before);
    assert_eq!(frames.backend().count(|e| matches!(e, Event::Present { .. })), presents_before);
    assert_eq!(frames.backend().count(|e| matches!(e, Event::Rebuild(_))), 1);
    assert_eq!(frames.stats().adapts, 1);
    assert_eq!(frames.stats().frames_skipped, 1);
    assert_eq!(frames.image_in_use(), &[None, None, None]);
    assert_eq!(frames.state(), FrameState::Idle);

    // The abandoned frame never reset its fence, so the retry can wait on it
    let outcome = frames.draw_frame().unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { slot: 0, image: 0, adapted: false });
    assert_eq!(frames.current_slot(), 1);
}

#[test]
fn test_stale_acquire_does_not_reset_fence() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().acquire_script = VecDeque::from(vec![AcquireScript::Stale]);

    frames.draw_frame().unwrap();
    assert_eq!(frames.backend().count(|e| matches!(e, Event::ResetFence(_))), 0);
    assert_eq!(frames.backend().fences, vec![Fence::Signaled, Fence::Signaled]);
}

#[test]
fn test_suboptimal_present_adapts_after_frame() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().present_script = VecDeque::from(vec![PresentScript::Ready, PresentScript::Suboptimal]);

    frames.draw_frame().unwrap();
    let outcome = frames.draw_frame().unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { slot: 1, image: 1, adapted: true });
    assert_eq!(frames.current_slot(), 0);
    assert_eq!(frames.stats().adapts, 1);
    assert_eq!(frames.stats().frames_presented, 2);

    // Rebuild happens after the present of the degraded frame
    let events = &frames.backend().events;
    let present = events.iter().rposition(|e| matches!(e, Event::Present { .. })).unwrap();
    let rebuild = events.iter().position(|e| matches!(e, Event::Rebuild(_))).unwrap();
    assert!(rebuild > present);
}

#[test]
fn test_stale_present_adapts() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().present_script = VecDeque::from(vec![PresentScript::Stale]);

    let outcome = frames.draw_frame().unwrap();
    assert_eq!(outcome, FrameOutcome::Presented { slot: 0, image: 0, adapted: true });
    assert_eq!(frames.stats().adapts, 1);
}

#[test]
fn test_suboptimal_acquire_still_draws() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().acquire_script = VecDeque::from(vec![AcquireScript::Suboptimal]);

    let outcome = frames.draw_frame().unwrap();

    assert_eq!(outcome, FrameOutcome::Presented { slot: 0, image: 0, adapted: true });
    assert_eq!(frames.backend().submissions(), vec![(0, 0)]);
    assert_eq!(frames.stats().adapts, 1);
}

#[test]
fn test_resize_flag_treated_like_suboptimal() {
    let mut frames = orchestrator(2, 3);
    frames.notify_resized();
    let outcome = frames.draw_frame().unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { adapted: true, .. }));

    frames.backend_mut().window_resized = true;
    let outcome = frames.draw_frame().unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { adapted: true, .. }));

    let outcome = frames.draw_frame().unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { adapted: false, .. }));
    assert_eq!(frames.stats().adapts, 2);
}

#[test]
fn test_minimized_window_stalls_rebuild() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().extents = VecDeque::from(vec![(0, 0), (640, 0), (0, 480), (640, 480)]);

    frames.adapt().unwrap();

    let events = &frames.backend().events;
    assert_eq!(
        events.as_slice(),
        &[
            Event::WaitEvents,
            Event::WaitEvents,
            Event::WaitEvents,
            Event::WaitIdle,
            Event::Rebuild(3),
        ]
    );
}

#[test]
fn test_restore_from_minimized_rebuilds_once() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().resize_on_wait_events = true;
    frames.backend_mut().extents = VecDeque::from(vec![(0, 0), (0, 0), (800, 600)]);

    frames.adapt().unwrap();
    assert_eq!(frames.stats().adapts, 1);

    // Framebuffer-size events seen while minimized are covered by that rebuild
    let outcome = frames.draw_frame().unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { adapted: false, .. }));
    assert_eq!(frames.stats().adapts, 1);
}

#[test]
fn test_adapt_is_idempotent_on_valid_surface() {
    let mut frames = orchestrator(2, 3);
    for _ in 0..3 {
        frames.draw_frame().unwrap();
    }
    let slot = frames.current_slot();

    frames.adapt().unwrap();
    frames.adapt().unwrap();

    assert_eq!(frames.current_slot(), slot);
    assert_eq!(frames.image_in_use(), &[None, None, None]);
    assert_eq!(frames.backend().count(|e| matches!(e, Event::WaitEvents)), 0);
    assert_eq!(frames.backend().count(|e| *e == Event::Rebuild(3)), 2);

    // Drawing continues from the same slot afterwards
    let outcome = frames.draw_frame().unwrap();
    assert!(matches!(outcome, FrameOutcome::Presented { slot: s, .. } if s == slot));
}

#[test]
fn test_rebuild_resizes_image_map() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().rebuild_image_counts = VecDeque::from(vec![5]);
    frames.draw_frame().unwrap();

    frames.adapt().unwrap();
    assert_eq!(frames.image_in_use().len(), 5);
    assert!(frames.image_in_use().iter().all(Option::is_none));

    for _ in 0..7 {
        frames.draw_frame().unwrap();
    }
    assert_eq!(frames.stats().frames_presented, 8);
}

#[test]
fn test_image_out_of_range_is_error() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().next_image = 7;

    let result = frames.draw_frame();
    assert!(matches!(result, Err(FrameError::ImageOutOfRange { image: 7, count: 3 })));
    assert_eq!(frames.backend().submissions().len(), 0);
}

#[test]
fn test_timeout_propagates() {
    let mut frames = orchestrator(2, 3);
    frames.backend_mut().fail_wait_on_call = Some(2);

    frames.draw_frame().unwrap();
    let result = frames.draw_frame();

    assert!(matches!(result, Err(FrameError::Timeout { operation: "in-flight fence", .. })));
    assert_eq!(frames.state(), FrameState::WaitSlot);
    assert_eq!(frames.current_slot(), 1);
}

#[test]
fn test_update_vertices_waits_for_all_slots() {
    let mut frames = orchestrator(2, 3);
    frames.draw_frame().unwrap();
    frames.draw_frame().unwrap();
    frames.backend_mut().events.clear();

    let vertices = vec![Vertex::new([0.0, 0.0, 0.5], [1.0, 1.0, 1.0]); 3];
    frames.update_vertices(&vertices).unwrap();

    assert_eq!(
        frames.backend().events,
        vec![Event::WaitFence(0), Event::WaitFence(1), Event::Upload(3)]
    );
    assert_eq!(frames.backend().uploaded, vertices);
}

#[test]
fn test_wait_idle_delegates() {
    let mut frames = orchestrator(2, 3);
    frames.draw_frame().unwrap();
    frames.wait_idle().unwrap();
    assert_eq!(frames.backend().events.last(), Some(&Event::WaitIdle));
    assert_eq!(frames.backend().fences, vec![Fence::Signaled, Fence::Signaled]);
}

#[test]
fn test_surface_status_degraded() {
    assert!(!SurfaceStatus::Ready(()).is_degraded());
    assert!(SurfaceStatus::Suboptimal(()).is_degraded());
    assert!(SurfaceStatus::<()>::Stale.is_degraded());
}
