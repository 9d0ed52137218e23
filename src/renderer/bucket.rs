//! Render buckets: cached, independently re-rendered pieces of the scene.
//!
//! A bucket keeps its content as recorded commands in a [`Canvas`] and the
//! rendered result in the front texture of its [`Context`]. Each frame the
//! owner calls [`RenderBucket::update_content`] with the current size and
//! transform; the texture is only re-rendered when the canvas, the size or
//! the transform changed. Otherwise the cached texture is composited as is.

use std::cmp::Ordering;

use bitflags::bitflags;

use super::batch::BatchManager;
use super::canvas::{Canvas, ContentProvider};
use super::context::Context;
use super::device::RenderDevice;
use super::types::{Color, CompositeOperation, FilterMode};
use crate::error::DeviceError;
use crate::geometry::{Mat4, Point, Rect};

bitflags! {
    /// What triggered the last rebuild of a bucket.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ContentChanges: u8 {
        /// Recorded commands changed
        const CANVAS    = 0b001;
        /// Pixel size changed; the context was reallocated
        const SIZE      = 0b010;
        /// Local-to-screen transform changed
        const TRANSFORM = 0b100;
    }
}

#[derive(Debug)]
pub struct RenderBucket {
    width: u32,
    height: u32,
    local_to_screen: Mat4,
    filter: FilterMode,
    /// `None` only after a failed reallocation
    context: Option<Context>,
    render_order: i32,
    canvas: Canvas,
    last_changes: ContentChanges,
}

impl RenderBucket {
    pub fn new(
        width: u32,
        height: u32,
        local_to_screen: Mat4,
        device: &mut dyn RenderDevice,
        filter: FilterMode,
    ) -> Result<Self, DeviceError> {
        let context = Context::new(device, width, height, filter)?;
        Ok(Self {
            width,
            height,
            local_to_screen,
            filter,
            context: Some(context),
            render_order: 0,
            canvas: Canvas::new(),
            last_changes: ContentChanges::empty(),
        })
    }

    pub fn update_render_order(&mut self, render_order: i32) {
        self.render_order = render_order;
    }

    pub fn render_order(&self) -> i32 {
        self.render_order
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn local_to_screen(&self) -> Mat4 {
        self.local_to_screen
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn context(&self) -> Option<&Context> {
        self.context.as_ref()
    }

    /// Changes that caused the last `update_content` to rebuild, or empty if
    /// the cached texture was reused.
    pub fn last_changes(&self) -> ContentChanges {
        self.last_changes
    }

    /// Let `content` record into a fresh canvas.
    ///
    /// The canvas only counts as changed when the new commands differ from
    /// the previous recording, or when an earlier change has not been
    /// rendered yet.
    pub fn update_canvas(&mut self, content: &dyn ContentProvider) {
        let pending = self.canvas.is_changed();
        let previous = self.canvas.take_commands();
        content.update_canvas(&mut self.canvas);

        if self.canvas.commands() != previous.as_slice() {
            self.canvas.mark_changed();
        } else if !pending {
            self.canvas.mark_clean();
        }
    }

    /// Bring the cached texture up to date.
    ///
    /// Returns `true` when the texture was re-rendered.
    pub fn update_content(
        &mut self,
        width: u32,
        height: u32,
        local_to_screen: Mat4,
        device: &mut dyn RenderDevice,
    ) -> Result<bool, DeviceError> {
        let mut changes = ContentChanges::empty();
        if self.canvas.is_changed() {
            changes |= ContentChanges::CANVAS;
        }
        if self.update_size(width, height, device)? {
            changes |= ContentChanges::SIZE;
        }
        if self.update_transformation(local_to_screen) {
            changes |= ContentChanges::TRANSFORM;
        }
        self.last_changes = changes;

        let Some(context) = self.context.as_mut() else {
            return Ok(false);
        };

        if changes.is_empty() {
            crate::render_stats::record_bucket_reused();
            log::trace!("bucket reusing texture {}", context.texture().id);
            return Ok(false);
        }

        context.bind(BatchManager::new());
        context.prepare();
        for command in self.canvas.commands() {
            command.execute(context);
        }
        let batches = context.flush(device)?;
        self.canvas.mark_clean();

        crate::render_stats::record_bucket_rebuilt();
        log::debug!(
            "bucket rebuilt ({:?}): {} commands, {} batches",
            changes,
            self.canvas.commands().len(),
            batches
        );
        Ok(true)
    }

    /// Exact compare; on change the old context is freed before the new one
    /// is allocated.
    fn update_size(
        &mut self,
        width: u32,
        height: u32,
        device: &mut dyn RenderDevice,
    ) -> Result<bool, DeviceError> {
        if width == self.width && height == self.height && self.context.is_some() {
            return Ok(false);
        }

        self.width = width;
        self.height = height;

        if let Some(old) = self.context.take() {
            old.free(device);
        }
        self.context = Some(Context::new(device, width, height, self.filter)?);
        Ok(true)
    }

    fn update_transformation(&mut self, local_to_screen: Mat4) -> bool {
        if local_to_screen == self.local_to_screen {
            return false;
        }
        self.local_to_screen = local_to_screen;
        true
    }

    /// Composite the cached texture into `batch` under `parent_transform`.
    pub fn render(&self, batch: &mut BatchManager, parent_transform: &Mat4) {
        let Some(context) = self.context.as_ref() else {
            return;
        };
        let local = parent_transform.then(&self.local_to_screen);
        batch.add_change_composite_operation(CompositeOperation::SourceOver);
        batch.add_texture_quad(context.texture(), &local, Color::WHITE);
    }

    /// Axis-aligned bounds of the bucket in screen space.
    pub fn screen_space_aabb(&self) -> Rect {
        let (w, h) = (self.width as f32, self.height as f32);
        let corners: [Point; 4] = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)]
            .map(|(x, y)| self.local_to_screen.transform_point(x, y));
        Rect::bounding(&corners)
    }

    /// Ascending render order.
    pub fn cmp_render_order(&self, other: &RenderBucket) -> Ordering {
        self.render_order.cmp(&other.render_order)
    }

    /// Release the bucket's textures.
    pub fn free(mut self, device: &mut dyn RenderDevice) {
        if let Some(context) = self.context.take() {
            context.free(device);
        }
    }
}

/// Buckets compare by render order only.
impl PartialEq for RenderBucket {
    fn eq(&self, other: &Self) -> bool {
        self.render_order == other.render_order
    }
}

impl Eq for RenderBucket {}

impl PartialOrd for RenderBucket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RenderBucket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_render_order(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::{DeviceEvent, RecordingDevice};

    fn red_square(canvas: &mut Canvas) {
        canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::rgb(1.0, 0.0, 0.0));
    }

    fn blue_square(canvas: &mut Canvas) {
        canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::rgb(0.0, 0.0, 1.0));
    }

    fn bucket(device: &mut RecordingDevice) -> RenderBucket {
        RenderBucket::new(100, 100, Mat4::IDENTITY, device, FilterMode::Linear).unwrap()
    }

    #[test]
    fn test_identical_updates_skip_rebuild() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        b.update_canvas(&red_square);

        assert!(b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap());
        assert!(!b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap());
        assert!(b.last_changes().is_empty());
        assert_eq!(device.submissions().len(), 1);
        b.free(&mut device);
    }

    #[test]
    fn test_canvas_change_rebuilds() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        b.update_canvas(&red_square);
        b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap();

        b.update_canvas(&blue_square);
        assert!(b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap());
        assert_eq!(b.last_changes(), ContentChanges::CANVAS);
        assert_eq!(device.submissions().len(), 2);
        b.free(&mut device);
    }

    #[test]
    fn test_identical_rerecord_skips_rebuild() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        let white_square = |canvas: &mut Canvas| {
            canvas.fill_rect(Rect::from_xywh(0.0, 0.0, 10.0, 10.0), Color::WHITE);
        };

        let rebuilt: Vec<bool> = (0..3)
            .map(|_| {
                b.update_canvas(&white_square);
                b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap()
            })
            .collect();
        assert_eq!(rebuilt, [true, false, false]);
        assert_eq!(device.submissions().len(), 1);
        b.free(&mut device);
    }

    #[test]
    fn test_unrendered_change_survives_identical_rerecord() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        b.update_canvas(&red_square);
        b.update_canvas(&red_square);
        assert!(b.canvas().is_changed());
        assert!(b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap());
        b.free(&mut device);
    }

    #[test]
    fn test_clearing_recorded_content_rebuilds() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        b.update_canvas(&red_square);
        b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap();

        b.update_canvas(&|_: &mut Canvas| {});
        assert!(b.update_content(100, 100, Mat4::IDENTITY, &mut device).unwrap());
        assert_eq!(b.last_changes(), ContentChanges::CANVAS);
        assert!(b.canvas().is_empty());
        b.free(&mut device);
    }

    #[test]
    fn test_transform_change_rebuilds() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        assert!(b
            .update_content(100, 100, Mat4::translate(1.0, 0.0), &mut device)
            .unwrap());
        assert_eq!(b.last_changes(), ContentChanges::TRANSFORM);
        assert_eq!(b.local_to_screen(), Mat4::translate(1.0, 0.0));
        b.free(&mut device);
    }

    #[test]
    fn test_resize_frees_old_context_first() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);
        let old = b.context().unwrap().texture();
        device.take_events();

        assert!(b.update_content(50, 20, Mat4::IDENTITY, &mut device).unwrap());
        assert_eq!(b.last_changes(), ContentChanges::SIZE);

        let events = device.take_events();
        assert!(matches!(events[0], DeviceEvent::Freed(_)));
        assert!(matches!(events[1], DeviceEvent::Freed(_)));
        assert!(matches!(events[2], DeviceEvent::Created(t) if t.width == 50 && t.height == 20));
        assert!(matches!(events[3], DeviceEvent::Created(_)));
        assert!(!device.is_live(old));
        assert_eq!(device.live_count(), 2);
        b.free(&mut device);
    }

    #[test]
    fn test_failed_resize_recovers_on_next_update() {
        let mut device = RecordingDevice::new();
        let mut b = bucket(&mut device);

        device.set_fail_allocations(true);
        assert!(b.update_content(10, 10, Mat4::IDENTITY, &mut device).is_err());
        assert!(b.context().is_none());

        device.set_fail_allocations(false);
        assert!(b.update_content(10, 10, Mat4::IDENTITY, &mut device).unwrap());
        assert_eq!(b.context().unwrap().width(), 10);
        b.free(&mut device);
    }

    #[test]
    fn test_render_emits_one_white_quad() {
        let mut device = RecordingDevice::new();
        let b = RenderBucket::new(20, 10, Mat4::translate(5.0, 5.0), &mut device, FilterMode::Linear)
            .unwrap();
        let mut batch = BatchManager::new();
        b.render(&mut batch, &Mat4::scale(2.0));

        assert_eq!(batch.batches().len(), 1);
        let out = &batch.batches()[0];
        assert_eq!(out.operation(), CompositeOperation::SourceOver);
        assert_eq!(out.texture(), Some(b.context().unwrap().texture()));
        let quad = out.quads()[0];
        assert_eq!(quad.vertices[0].position, [10.0, 10.0]);
        assert_eq!(quad.vertices[3].position, [50.0, 30.0]);
        assert_eq!(quad.vertices[0].color, Color::WHITE.to_array());
        b.free(&mut device);
    }

    #[test]
    fn test_screen_space_aabb() {
        let mut device = RecordingDevice::new();
        let b = bucket(&mut device);
        assert_eq!(b.screen_space_aabb(), Rect::from_xywh(0.0, 0.0, 100.0, 100.0));
        b.free(&mut device);

        let rotated = RenderBucket::new(
            10,
            10,
            Mat4::rotate_degrees(180.0),
            &mut device,
            FilterMode::Linear,
        )
        .unwrap();
        let aabb = rotated.screen_space_aabb();
        assert!((aabb.x() + 10.0).abs() < 1e-4);
        assert!((aabb.width() - 10.0).abs() < 1e-4);
        rotated.free(&mut device);
    }

    #[test]
    fn test_cmp_render_order() {
        let mut device = RecordingDevice::new();
        let mut a = bucket(&mut device);
        let mut b = bucket(&mut device);
        a.update_render_order(3);
        b.update_render_order(1);
        assert_eq!(a.cmp_render_order(&b), Ordering::Greater);
        assert_eq!(b.cmp_render_order(&a), Ordering::Less);
        a.free(&mut device);
        b.free(&mut device);
    }

    #[test]
    fn test_buckets_sort_by_render_order() {
        let mut device = RecordingDevice::new();
        let mut buckets: Vec<RenderBucket> = [2, -1, 2, 0]
            .into_iter()
            .enumerate()
            .map(|(i, order)| {
                let mut b = RenderBucket::new(
                    i as u32 + 1,
                    1,
                    Mat4::IDENTITY,
                    &mut device,
                    FilterMode::Nearest,
                )
                .unwrap();
                b.update_render_order(order);
                b
            })
            .collect();

        buckets.sort();
        let orders: Vec<i32> = buckets.iter().map(RenderBucket::render_order).collect();
        assert_eq!(orders, [-1, 0, 2, 2]);
        // equal orders keep insertion order
        let widths: Vec<u32> = buckets.iter().map(RenderBucket::width).collect();
        assert_eq!(widths, [2, 4, 1, 3]);
        assert!(buckets[0] < buckets[1]);
        assert!(buckets[2] == buckets[3]);

        for b in buckets {
            b.free(&mut device);
        }
    }
}
