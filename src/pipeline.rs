use std::sync::Arc;

use crate::{
    label_style::LabelStyleTable,
    orientation::Camera,
    segmentation::{LabelVolume, ThresholdRule},
    stack_loader::ImageStack,
    volume::Image,
    window_level::WindowLevel,
};

/// Label volume of the background image and how to draw it.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Stack index of the image the labels were classified from.
    pub background_index: usize,
    pub rules: Arc<[ThresholdRule]>,
    pub labels: Arc<LabelVolume>,
    pub styles: Arc<LabelStyleTable>,
}

/// Snapshot handed to the renderer.
///
/// Never mutated: a slice change or a new segmentation produces a new
/// descriptor, while the stack and label data are shared between them.
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    stack: Arc<ImageStack>,
    slice_index: usize,
    camera: Camera,
    window_level: WindowLevel,
    segmentation: Option<Segmentation>,
}

impl PipelineDescriptor {
    pub fn new(
        stack: Arc<ImageStack>,
        slice_index: usize,
        camera: Camera,
        window_level: WindowLevel,
        segmentation: Option<Segmentation>,
    ) -> Self {
        Self {
            stack,
            slice_index,
            camera,
            window_level,
            segmentation,
        }
    }

    pub fn stack(&self) -> &Arc<ImageStack> {
        &self.stack
    }

    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn window_level(&self) -> WindowLevel {
        self.window_level
    }

    pub fn segmentation(&self) -> Option<&Segmentation> {
        self.segmentation.as_ref()
    }

    pub fn active_image(&self) -> Option<&Image> {
        self.stack.get(self.slice_index)
    }

    /// Segmentation to overlay on the active image, if it was classified
    /// from that image.
    pub fn active_segmentation(&self) -> Option<&Segmentation> {
        self.segmentation
            .as_ref()
            .filter(|segmentation| segmentation.background_index == self.slice_index)
    }
}
