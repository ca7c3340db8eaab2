use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    enums::InitialSlice,
    label_style::{LabelStyle, LabelStyleTable, StyleError},
    navigator::{ScrollRange, SliceNavigator},
    orientation::{Camera, GeometryError},
    pipeline::{PipelineDescriptor, Segmentation},
    segmentation::{SegmentationClassifier, ThresholdRule},
    stack_loader::{Decoder, ImageStack, LoadedBatch, SourceFile, StackError, StackLoader},
    window_level::{WindowLevel, WindowLevelError},
};

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    WindowLevel(#[from] WindowLevelError),

    #[error(transparent)]
    Style(#[from] StyleError),

    #[error("No image stack loaded")]
    NoStack,
}

/// Draws published pipelines.
pub trait Renderer {
    fn set_pipeline(&mut self, descriptor: Arc<PipelineDescriptor>);
    fn reset_camera(&mut self);
    fn render(&mut self);
    /// Install the slice scroll binding, or remove it with `None`.
    fn bind_scroll(&mut self, range: Option<ScrollRange>);
}

/// Receives human readable progress and error messages.
pub trait StatusSink {
    fn report(&mut self, message: &str);
}

/// Emits status messages as `info` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&mut self, message: &str) {
        info!(target: "dicom_stack::status", "{message}");
    }
}

#[derive(Debug, Clone)]
pub struct ViewerOptions {
    pub initial_slice: InitialSlice,
    /// Slices moved per scroll unit
    pub scroll_step: usize,
    /// Largest accepted entry of `DᵀD − I` for a direction matrix `D`.
    pub orthonormal_tolerance: f64,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            initial_slice: InitialSlice::default(),
            scroll_step: 1,
            orthonormal_tolerance: 1e-4,
        }
    }
}

/// Everything derived from one published stack.
struct View {
    stack: Arc<ImageStack>,
    camera: Camera,
    navigator: SliceNavigator,
    window_level: WindowLevel,
    segmentation: Option<Segmentation>,
    descriptor: Arc<PipelineDescriptor>,
}

impl View {
    fn rebuild_descriptor(&mut self) {
        self.descriptor = Arc::new(PipelineDescriptor::new(
            Arc::clone(&self.stack),
            self.navigator.current(),
            self.camera,
            self.window_level,
            self.segmentation.clone(),
        ));
    }
}

fn window_level_for(stack: &ImageStack, index: usize) -> Result<WindowLevel, WindowLevelError> {
    let image = stack.get(index).ok_or(WindowLevelError::EmptyRange)?;
    Ok(WindowLevel::from_range(image.scalar_range()?))
}

/// Owns the published stack and everything derived from it, and drives the
/// renderer and status collaborators.
///
/// All operations except loading are synchronous; errors are reported to the
/// status sink as well as returned.
pub struct ViewerContext<R, S> {
    options: ViewerOptions,
    loader: StackLoader,
    renderer: R,
    status: S,
    view: Option<View>,
}

impl<R: Renderer, S: StatusSink> ViewerContext<R, S> {
    pub fn new(renderer: R, status: S, options: ViewerOptions) -> Self {
        Self {
            options,
            loader: StackLoader::new(),
            renderer,
            status,
            view: None,
        }
    }

    /// Loader sharing this context's batch generations. Use it to decode
    /// without holding the context, then hand the result to [`Self::publish`].
    pub fn loader(&self) -> StackLoader {
        self.loader.clone()
    }

    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn status(&self) -> &S {
        &self.status
    }

    pub fn descriptor(&self) -> Option<Arc<PipelineDescriptor>> {
        self.view.as_ref().map(|view| Arc::clone(&view.descriptor))
    }

    pub fn stack(&self) -> Option<&Arc<ImageStack>> {
        self.view.as_ref().map(|view| &view.stack)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.view.as_ref().map(|view| view.navigator.current())
    }

    pub fn navigator(&self) -> Option<&SliceNavigator> {
        self.view.as_ref().map(|view| &view.navigator)
    }

    /// Decode `sources` and publish the resulting stack.
    ///
    /// Returns `Ok(false)` if another load was requested through
    /// [`Self::loader`] while this one was decoding; the newer load owns the
    /// status line then. On failure the previously published stack, if any,
    /// stays in place.
    pub async fn load_batch<D: Decoder + ?Sized>(
        &mut self,
        sources: &[SourceFile],
        decoder: &D,
    ) -> Result<bool, ViewerError> {
        self.status
            .report(&format!("Loading {} file(s)...", sources.len()));
        let loaded = self.loader.load(sources, decoder).await;
        match loaded {
            Ok(batch) => self.publish(batch),
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Replace the published stack with `batch`.
    ///
    /// Returns `Ok(false)` without touching anything when a newer batch has
    /// been requested since `batch` was started.
    pub fn publish(&mut self, batch: LoadedBatch) -> Result<bool, ViewerError> {
        if !self.loader.is_current(batch.generation) {
            warn!(
                generation = batch.generation,
                current = self.loader.current_generation(),
                "Discarding superseded batch"
            );
            return Ok(false);
        }

        let view = match self.build_view(batch.stack) {
            Ok(view) => view,
            Err(e) => return Err(self.fail(e)),
        };
        let mode = view.navigator.mode();
        let scroll_range = view.navigator.scroll_range();
        let descriptor = Arc::clone(&view.descriptor);
        self.view = Some(view);

        info!(generation = batch.generation, %mode, "Published stack");
        self.renderer.set_pipeline(descriptor);
        self.renderer.bind_scroll(scroll_range);
        self.renderer.reset_camera();
        self.renderer.render();
        self.status.report(&mode.to_string());
        Ok(true)
    }

    fn build_view(&self, stack: ImageStack) -> Result<View, ViewerError> {
        let reference = stack.reference().ok_or(StackError::EmptyCollection)?;
        let camera = Camera::for_image(reference, self.options.orthonormal_tolerance)?;
        let mut navigator = SliceNavigator::new(stack.len(), self.options.scroll_step)
            .ok_or(StackError::EmptyCollection)?;
        navigator.set_index(self.options.initial_slice.index(navigator.max_index()));
        let window_level = window_level_for(&stack, navigator.current())?;

        let stack = Arc::new(stack);
        let descriptor = Arc::new(PipelineDescriptor::new(
            Arc::clone(&stack),
            navigator.current(),
            camera,
            window_level,
            None,
        ));
        Ok(View {
            stack,
            camera,
            navigator,
            window_level,
            segmentation: None,
            descriptor,
        })
    }

    /// Move by `delta` slices. Returns the new index if it changed.
    pub fn scroll(&mut self, delta: i64) -> Option<usize> {
        let index = self.view.as_mut()?.navigator.scroll(delta)?;
        self.slice_changed(index);
        Some(index)
    }

    /// Feed a fractional wheel delta; see [`SliceNavigator::scroll_continuous`].
    pub fn scroll_continuous(&mut self, delta: f64) -> Option<usize> {
        let index = self.view.as_mut()?.navigator.scroll_continuous(delta)?;
        self.slice_changed(index);
        Some(index)
    }

    /// Jump to `index`, clamped to the stack. Returns the new index if it
    /// changed.
    pub fn set_index(&mut self, index: usize) -> Option<usize> {
        let index = self.view.as_mut()?.navigator.set_index(index)?;
        self.slice_changed(index);
        Some(index)
    }

    fn slice_changed(&mut self, index: usize) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        match window_level_for(&view.stack, index) {
            Ok(window_level) => view.window_level = window_level,
            Err(e) => {
                // Keep showing the slice with the previous window.
                warn!(index, error = %e, "Could not re-window slice");
                self.status.report(&format!("Error: {e}"));
            }
        }
        view.rebuild_descriptor();
        debug!(
            index,
            window = view.window_level.window,
            level = view.window_level.level,
            "Slice changed"
        );

        self.renderer.set_pipeline(Arc::clone(&view.descriptor));
        self.renderer.render();
    }

    /// Classify the reference image with `rules` and overlay the result
    /// drawn with `styles`.
    pub fn segment(
        &mut self,
        rules: Vec<ThresholdRule>,
        styles: Vec<LabelStyle>,
    ) -> Result<(), ViewerError> {
        let segmentation = match self.build_segmentation(rules, styles) {
            Ok(segmentation) => segmentation,
            Err(e) => return Err(self.fail(e)),
        };
        if let Some(view) = self.view.as_mut() {
            info!(
                labels = segmentation.styles.len(),
                rules = segmentation.rules.len(),
                "Segmentation applied"
            );
            view.segmentation = Some(segmentation);
            view.rebuild_descriptor();
            self.renderer.set_pipeline(Arc::clone(&view.descriptor));
            self.renderer.render();
        }
        Ok(())
    }

    fn build_segmentation(
        &self,
        rules: Vec<ThresholdRule>,
        styles: Vec<LabelStyle>,
    ) -> Result<Segmentation, ViewerError> {
        let view = self.view.as_ref().ok_or(ViewerError::NoStack)?;
        let styles = LabelStyleTable::new(styles, &rules)?;
        let background = view.stack.reference().ok_or(ViewerError::NoStack)?;
        let classifier = SegmentationClassifier::new(rules);
        let labels = classifier.classify(background);

        Ok(Segmentation {
            background_index: 0,
            rules: classifier.rules().into(),
            labels: Arc::new(labels),
            styles: Arc::new(styles),
        })
    }

    pub fn clear_segmentation(&mut self) {
        let Some(view) = self.view.as_mut() else {
            return;
        };
        if view.segmentation.take().is_none() {
            return;
        }
        view.rebuild_descriptor();
        self.renderer.set_pipeline(Arc::clone(&view.descriptor));
        self.renderer.render();
    }

    fn fail(&mut self, error: ViewerError) -> ViewerError {
        warn!(error = %error, "Viewer operation failed");
        self.status.report(&format!("Error: {error}"));
        error
    }
}
