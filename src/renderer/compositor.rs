//! Frame driver: keeps the set of buckets and composites them in render order.

use super::batch::BatchManager;
use super::bucket::RenderBucket;
use super::device::{RenderDevice, TextureHandle};
use crate::error::DeviceError;
use crate::geometry::Mat4;
use crate::SceneConfig;

pub struct Compositor {
    config: SceneConfig,
    /// Insertion order is the tie-break for equal render orders
    buckets: Vec<(u64, RenderBucket)>,
    frame: BatchManager,
}

impl Compositor {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            frame: BatchManager::with_capacity(config.initial_batch_capacity),
            buckets: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Allocate a bucket with the configured filter mode and insert it.
    pub fn create_bucket(
        &mut self,
        id: u64,
        width: u32,
        height: u32,
        local_to_screen: Mat4,
        device: &mut dyn RenderDevice,
    ) -> Result<&mut RenderBucket, DeviceError> {
        let bucket = RenderBucket::new(width, height, local_to_screen, device, self.config.filter_mode)?;
        if let Some(old) = self.insert_bucket(id, bucket) {
            old.free(device);
        }
        let idx = self
            .position(id)
            .ok_or_else(|| DeviceError::Backend(format!("bucket {id} missing after insert")))?;
        Ok(&mut self.buckets[idx].1)
    }

    /// Insert or replace the bucket stored under `id`.
    ///
    /// A replaced bucket keeps its position and is handed back to the caller,
    /// who is responsible for freeing it.
    pub fn insert_bucket(&mut self, id: u64, bucket: RenderBucket) -> Option<RenderBucket> {
        match self.position(id) {
            Some(idx) => Some(std::mem::replace(&mut self.buckets[idx].1, bucket)),
            None => {
                self.buckets.push((id, bucket));
                None
            }
        }
    }

    /// Remove and free a bucket. Returns whether it existed.
    pub fn remove_bucket(&mut self, id: u64, device: &mut dyn RenderDevice) -> bool {
        match self.position(id) {
            Some(idx) => {
                let (_, bucket) = self.buckets.remove(idx);
                bucket.free(device);
                true
            }
            None => false,
        }
    }

    pub fn bucket(&self, id: u64) -> Option<&RenderBucket> {
        self.position(id).map(|idx| &self.buckets[idx].1)
    }

    pub fn bucket_mut(&mut self, id: u64) -> Option<&mut RenderBucket> {
        self.position(id).map(move |idx| &mut self.buckets[idx].1)
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.buckets.iter().position(|(bid, _)| *bid == id)
    }

    /// Forward to [`RenderBucket::update_content`]. Unknown ids are ignored
    /// and report no rebuild.
    pub fn update_content(
        &mut self,
        id: u64,
        width: u32,
        height: u32,
        local_to_screen: Mat4,
        device: &mut dyn RenderDevice,
    ) -> Result<bool, DeviceError> {
        match self.bucket_mut(id) {
            Some(bucket) => bucket.update_content(width, height, local_to_screen, device),
            None => {
                log::debug!("update_content for unknown bucket {}", id);
                Ok(false)
            }
        }
    }

    /// Ids in the order they are composited.
    pub fn render_sequence(&self) -> Vec<u64> {
        self.sorted().into_iter().map(|(id, _)| *id).collect()
    }

    fn sorted(&self) -> Vec<&(u64, RenderBucket)> {
        let mut sorted: Vec<_> = self.buckets.iter().collect();
        // Stable: equal render orders keep insertion order
        sorted.sort_by(|a, b| a.1.cmp(&b.1));
        sorted
    }

    /// Composite every bucket, lowest render order first.
    pub fn compose(&mut self, parent_transform: &Mat4) -> &BatchManager {
        let mut frame = std::mem::take(&mut self.frame);
        frame.clear();
        for (_, bucket) in self.sorted() {
            bucket.render(&mut frame, parent_transform);
        }
        self.frame = frame;
        &self.frame
    }

    /// Batches from the last `compose`.
    pub fn frame(&self) -> &BatchManager {
        &self.frame
    }

    /// Clear `target` and draw the last composed frame into it.
    pub fn submit(
        &self,
        device: &mut dyn RenderDevice,
        target: TextureHandle,
    ) -> Result<usize, DeviceError> {
        device.clear(target)?;
        device.submit(target, self.frame.batches())?;
        crate::render_stats::record_submission(self.frame.batches().len(), self.frame.quad_count());
        crate::render_stats::end_frame();
        Ok(self.frame.batches().len())
    }

    /// Free every bucket.
    pub fn free(self, device: &mut dyn RenderDevice) {
        for (_, bucket) in self.buckets {
            bucket.free(device);
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}
