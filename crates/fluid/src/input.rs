//! Pointer input adapter and the splat queue.
//!
//! Event handlers only mutate CPU-side state here; GPU resources are touched
//! exclusively by the solver once per frame. The queue is bounded so skipped
//! frames cannot grow it without limit.

use std::collections::VecDeque;

use glam::{Vec2, Vec3};

/// Queued impulse, in normalized texture coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Splat {
    pub position: Vec2,
    pub velocity_delta: Vec2,
    pub color: Vec3,
}

pub const SPLAT_QUEUE_CAPACITY: usize = 64;

/// Bounded FIFO of pending splats, drained exactly once per frame.
#[derive(Debug, Default)]
pub struct SplatQueue {
    items: VecDeque<Splat>,
}

impl SplatQueue {
    pub fn push(&mut self, splat: Splat) {
        if self.items.len() == SPLAT_QUEUE_CAPACITY {
            // Oldest impulses are the least interesting ones.
            self.items.pop_front();
        }
        self.items.push_back(splat);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Splat> + '_ {
        self.items.drain(..)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-frame pointer state. Updated on every raw input event, consumed and
/// cleared by the solver once per frame.
#[derive(Debug, Clone, Copy)]
pub struct PointerState {
    /// Position in texture coordinates, y up.
    pub position: Vec2,
    /// Aspect-corrected movement accumulated since the last consumed frame.
    pub delta: Vec2,
    pub moved: bool,
    pub down: bool,
    pub color: Vec3,
}

impl Default for PointerState {
    fn default() -> Self {
        Self {
            position: Vec2::splat(0.5),
            delta: Vec2::ZERO,
            moved: false,
            down: false,
            color: Vec3::new(0.15, 0.0, 0.0),
        }
    }
}

/// Converts raw window-pixel pointer coordinates into normalized pointer
/// state. Only the primary pointer/touch point is tracked.
#[derive(Debug)]
pub struct InputAdapter {
    pointer: PointerState,
    width: f32,
    height: f32,
}

impl InputAdapter {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pointer: PointerState::default(),
            width: width.max(1) as f32,
            height: height.max(1) as f32,
        }
    }

    pub fn set_surface_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1) as f32;
        self.height = height.max(1) as f32;
    }

    pub fn pointer(&self) -> &PointerState {
        &self.pointer
    }

    fn aspect_ratio(&self) -> f32 {
        self.width / self.height
    }

    /// Raw pointer movement in window pixels, origin top-left.
    pub fn on_pointer_move(&mut self, x: f32, y: f32) {
        let position = Vec2::new(x / self.width, 1.0 - y / self.height);
        let mut delta = position - self.pointer.position;
        let aspect = self.aspect_ratio();
        // Equalize impulse strength across screen orientations.
        if aspect < 1.0 {
            delta.x *= aspect;
        }
        if aspect > 1.0 {
            delta.y /= aspect;
        }
        self.pointer.position = position;
        self.pointer.delta += delta;
        if delta.length_squared() > 0.0 {
            self.pointer.moved = true;
        }
    }

    pub fn on_pointer_down(&mut self, color: Vec3) {
        self.pointer.down = true;
        self.pointer.color = color;
    }

    pub fn on_pointer_up(&mut self) {
        self.pointer.down = false;
    }

    /// Consumes accumulated movement, if any. Clears the moved flag and the
    /// delta so each movement contributes exactly one splat.
    pub fn take_movement(&mut self) -> Option<(Vec2, Vec2, Vec3)> {
        if !self.pointer.moved {
            return None;
        }
        let delta = self.pointer.delta;
        self.pointer.delta = Vec2::ZERO;
        self.pointer.moved = false;
        Some((self.pointer.position, delta, self.pointer.color))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn movement_sets_flag_and_accumulates_delta() {
        let mut input = InputAdapter::new(100, 100);
        input.on_pointer_move(50.0, 50.0);
        // First event establishes position; swallow it.
        let _ = input.take_movement();

        input.on_pointer_move(60.0, 50.0);
        input.on_pointer_move(70.0, 50.0);
        let (position, delta, _) = input.take_movement().expect("pointer moved");
        assert!((position.x - 0.7).abs() < 1e-6);
        assert!((delta.x - 0.2).abs() < 1e-6);
        assert_eq!(delta.y, 0.0);

        // Consuming clears both flag and delta.
        assert!(input.take_movement().is_none());
        assert_eq!(input.pointer().delta, Vec2::ZERO);
    }

    #[test]
    fn window_y_is_flipped_into_texcoords() {
        let mut input = InputAdapter::new(200, 100);
        input.on_pointer_move(0.0, 0.0);
        assert_eq!(input.pointer().position, Vec2::new(0.0, 1.0));
        input.on_pointer_move(200.0, 100.0);
        assert_eq!(input.pointer().position, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn delta_is_aspect_corrected() {
        // Wide surface: y deltas shrink by the aspect ratio.
        let mut input = InputAdapter::new(200, 100);
        input.on_pointer_move(0.0, 0.0);
        let _ = input.take_movement();
        input.on_pointer_move(0.0, 100.0);
        let (_, delta, _) = input.take_movement().unwrap();
        assert!((delta.y - (-0.5)).abs() < 1e-6);
    }

    #[test]
    fn stationary_pointer_produces_no_movement() {
        let mut input = InputAdapter::new(100, 100);
        input.on_pointer_move(40.0, 40.0);
        let _ = input.take_movement();
        input.on_pointer_move(40.0, 40.0);
        assert!(input.take_movement().is_none());
    }

    #[test]
    fn splat_queue_is_bounded() {
        let mut queue = SplatQueue::default();
        for i in 0..(SPLAT_QUEUE_CAPACITY + 10) {
            queue.push(Splat {
                position: Vec2::splat(i as f32),
                velocity_delta: Vec2::ZERO,
                color: Vec3::ZERO,
            });
        }
        assert_eq!(queue.len(), SPLAT_QUEUE_CAPACITY);
        // Oldest entries were dropped, newest kept.
        let first = queue.drain().next().unwrap();
        assert_eq!(first.position.x, 10.0);
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut queue = SplatQueue::default();
        queue.push(Splat {
            position: Vec2::splat(0.5),
            velocity_delta: Vec2::X,
            color: Vec3::ONE,
        });
        assert_eq!(queue.drain().count(), 1);
        assert!(queue.is_empty());
    }
}
