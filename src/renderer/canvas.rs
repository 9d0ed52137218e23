//! Command recording surface handed to content providers.

use super::commands::Command;
use super::device::TextureHandle;
use super::types::{Color, CompositeOperation};
use crate::geometry::{Mat4, Rect};

/// Content that knows how to draw itself into a [`Canvas`].
pub trait ContentProvider {
    fn update_canvas(&self, canvas: &mut Canvas);
}

impl<F: Fn(&mut Canvas)> ContentProvider for F {
    fn update_canvas(&self, canvas: &mut Canvas) {
        self(canvas)
    }
}

/// Ordered list of recorded commands plus a changed flag.
///
/// The flag is raised by any recording, or by a reset that discarded
/// commands. It stays raised until [`Canvas::mark_clean`].
#[derive(Debug, Default, Clone)]
pub struct Canvas {
    commands: Vec<Command>,
    changed: bool,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        if !self.commands.is_empty() {
            self.changed = true;
        }
        self.commands.clear();
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn mark_clean(&mut self) {
        self.changed = false;
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// Move the recorded commands out without touching the changed flag.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn record(&mut self, command: Command) {
        self.commands.push(command);
        self.changed = true;
    }

    pub fn set_composite_operation(&mut self, op: CompositeOperation) {
        self.record(Command::SetCompositeOperation(op));
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.record(Command::SetTransform(transform));
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        self.record(Command::FillRect { rect, color });
    }

    pub fn draw_texture(&mut self, texture: TextureHandle, rect: Rect, tint: Color) {
        self.record(Command::DrawTexture {
            texture,
            rect,
            tint,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_canvas_is_clean() {
        let canvas = Canvas::new();
        assert!(!canvas.is_changed());
        assert!(canvas.is_empty());
    }

    #[test]
    fn test_recording_marks_changed() {
        let mut canvas = Canvas::new();
        canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 1.0, 1.0), Color::BLACK);
        assert!(canvas.is_changed());
        assert_eq!(canvas.commands().len(), 1);
    }

    #[test]
    fn test_reset_of_empty_canvas_stays_clean() {
        let mut canvas = Canvas::new();
        canvas.reset();
        assert!(!canvas.is_changed());
    }

    #[test]
    fn test_reset_of_recorded_canvas_marks_changed() {
        let mut canvas = Canvas::new();
        canvas.set_composite_operation(CompositeOperation::Copy);
        canvas.mark_clean();

        canvas.reset();
        assert!(canvas.is_changed());
        assert!(canvas.is_empty());
    }

    #[test]
    fn test_take_commands_keeps_flag() {
        let mut canvas = Canvas::new();
        canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 1.0, 1.0), Color::BLACK);
        canvas.mark_clean();

        let taken = canvas.take_commands();
        assert_eq!(taken.len(), 1);
        assert!(canvas.is_empty());
        assert!(!canvas.is_changed());
    }

    #[test]
    fn test_closure_content_provider() {
        let content = |canvas: &mut Canvas| {
            canvas.set_transform(Mat4::translate(1.0, 1.0));
            canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 2.0, 2.0), Color::WHITE);
        };
        let mut canvas = Canvas::new();
        content.update_canvas(&mut canvas);
        assert_eq!(
            canvas.commands()[0],
            Command::SetTransform(Mat4::translate(1.0, 1.0))
        );
        assert_eq!(canvas.commands().len(), 2);
    }
}
