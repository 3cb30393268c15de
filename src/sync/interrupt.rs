//! Coordination with an in-flight render.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::RwLock;

/// Shutter interval and frame rate used for motion sampling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTiming {
    pub shutter: [f32; 2],
    pub fps: f32,
}

impl MotionTiming {
    pub fn is_instantaneous(&self) -> bool {
        self.shutter[0] == self.shutter[1]
    }

    /// Seconds per frame.
    pub fn frame_duration(&self) -> f32 {
        1.0 / self.fps
    }
}

/// The render side of the engine: must be told before shared state changes.
pub trait RenderCoordinator: Send + Sync {
    /// Pauses the render so shared state can be mutated. Must be cheap and
    /// safe to call repeatedly.
    fn interrupt(&self);
    fn resume(&self) {}
    fn shutter_range(&self) -> [f32; 2];
    fn fps(&self) -> f32;

    fn timing(&self) -> MotionTiming {
        MotionTiming {
            shutter: self.shutter_range(),
            fps: self.fps(),
        }
    }
}

/// Atomic render-state flags shared between the sync engine and the render
/// loop.
#[derive(Debug)]
pub struct RenderParam {
    paused: AtomicBool,
    needs_restart: AtomicBool,
    interrupts: AtomicUsize,
    shutter: RwLock<[f32; 2]>,
    fps: RwLock<f32>,
}

impl RenderParam {
    pub fn new(shutter: [f32; 2], fps: f32) -> Self {
        Self {
            paused: AtomicBool::new(false),
            needs_restart: AtomicBool::new(false),
            interrupts: AtomicUsize::new(0),
            shutter: RwLock::new(shutter),
            fps: RwLock::new(fps),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Number of times a running render was actually interrupted.
    pub fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::Acquire)
    }

    /// Returns whether a restart was requested and clears the request.
    pub fn take_restart(&self) -> bool {
        self.needs_restart.swap(false, Ordering::AcqRel)
    }

    pub fn set_shutter_range(&self, shutter: [f32; 2]) {
        *self.shutter.write() = shutter;
    }

    pub fn set_fps(&self, fps: f32) {
        *self.fps.write() = fps;
    }
}

impl RenderCoordinator for RenderParam {
    fn interrupt(&self) {
        self.needs_restart.store(true, Ordering::Release);
        if !self.paused.swap(true, Ordering::AcqRel) {
            self.interrupts.fetch_add(1, Ordering::AcqRel);
            log::debug!("render interrupted for scene update");
        }
    }

    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    fn shutter_range(&self) -> [f32; 2] {
        *self.shutter.read()
    }

    fn fps(&self) -> f32 {
        *self.fps.read()
    }
}

/// Issues at most one interrupt per sync pass, on first use. Shared by the
/// records of a parallel pass.
pub struct InterruptScope<'a> {
    coordinator: &'a dyn RenderCoordinator,
    fired: AtomicBool,
}

impl<'a> InterruptScope<'a> {
    pub fn new(coordinator: &'a dyn RenderCoordinator) -> Self {
        Self {
            coordinator,
            fired: AtomicBool::new(false),
        }
    }

    pub fn interrupt(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            self.coordinator.interrupt();
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingCoordinator {
        calls: AtomicUsize,
    }

    impl RenderCoordinator for CountingCoordinator {
        fn interrupt(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }

        fn shutter_range(&self) -> [f32; 2] {
            [0.0, 0.0]
        }

        fn fps(&self) -> f32 {
            24.0
        }
    }

    #[test]
    fn test_scope_coalesces_interrupts() {
        let coordinator = CountingCoordinator::default();
        let scope = InterruptScope::new(&coordinator);
        assert!(!scope.fired());
        scope.interrupt();
        scope.interrupt();
        scope.interrupt();
        assert!(scope.fired());
        assert_eq!(coordinator.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_render_param_interrupt_is_idempotent_until_resumed() {
        let param = RenderParam::new([0.0, 0.5], 24.0);
        param.interrupt();
        param.interrupt();
        assert_eq!(param.interrupt_count(), 1);
        assert!(param.is_paused());
        assert!(param.take_restart());
        assert!(!param.take_restart());

        param.resume();
        param.interrupt();
        assert_eq!(param.interrupt_count(), 2);
    }

    #[test]
    fn test_timing() {
        let param = RenderParam::new([-0.25, 0.25], 25.0);
        let timing = param.timing();
        assert!(!timing.is_instantaneous());
        assert_eq!(timing.frame_duration(), 0.04);
    }
}
