//! End-to-end behavior of the viewer context with recording collaborators.

use std::{sync::Arc, time::Duration};

use dicom_stack::{
    context::{Renderer, StatusSink, ViewerContext, ViewerError, ViewerOptions},
    enums::InitialSlice,
    label_style::{LabelStyle, StyleError},
    navigator::ScrollRange,
    pipeline::PipelineDescriptor,
    preview,
    segmentation::ThresholdRule,
    stack_loader::{DecodeError, Decoder, SourceFile, StackError, StackLoader},
    volume::Image,
    window_level::WindowLevel,
};
use futures::{FutureExt, future::BoxFuture};
use nalgebra::{Matrix3, Point3, Vector3};
use ndarray::{Array3, Array4};

#[derive(Default)]
struct RecordingRenderer {
    pipelines: Vec<Arc<PipelineDescriptor>>,
    scroll_bindings: Vec<Option<ScrollRange>>,
    renders: usize,
    camera_resets: usize,
}

impl Renderer for RecordingRenderer {
    fn set_pipeline(&mut self, descriptor: Arc<PipelineDescriptor>) {
        self.pipelines.push(descriptor);
    }

    fn reset_camera(&mut self) {
        self.camera_resets += 1;
    }

    fn render(&mut self) {
        self.renders += 1;
    }

    fn bind_scroll(&mut self, range: Option<ScrollRange>) {
        self.scroll_bindings.push(range);
    }
}

#[derive(Default)]
struct RecordingStatus(Vec<String>);

impl StatusSink for RecordingStatus {
    fn report(&mut self, message: &str) {
        self.0.push(message.to_owned());
    }
}

/// File bytes are `[low, high, delay_ms]`; the decoded 2×2 slice spans
/// `low * 10..=high * 10`. A `low` of 255 fails to decode.
struct SyntheticDecoder;

impl Decoder for SyntheticDecoder {
    fn decode<'a>(&'a self, source: &'a SourceFile) -> BoxFuture<'a, Result<Image, DecodeError>> {
        async move {
            let [low, high, delay] = source.bytes[..] else {
                return Err(DecodeError::Other("bad synthetic file".into()));
            };
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
            if low == u8::MAX {
                return Err(DecodeError::Other(format!("{} is corrupt", source.filename)));
            }
            let (low, high) = (low as f32 * 10.0, high as f32 * 10.0);
            let frame = Array3::from_shape_vec((1, 2, 2), vec![low, low, high, high])
                .map_err(|e| DecodeError::Other(e.to_string()))?;
            Ok(Image::from_frames(frame))
        }
        .boxed()
    }
}

fn file(name: &str, low: u8, high: u8, delay_ms: u8) -> SourceFile {
    SourceFile::new(name, vec![low, high, delay_ms])
}

fn viewer() -> ViewerContext<RecordingRenderer, RecordingStatus> {
    ViewerContext::new(
        RecordingRenderer::default(),
        RecordingStatus::default(),
        ViewerOptions::default(),
    )
}

fn five_slices() -> Vec<SourceFile> {
    // Earlier files decode slower.
    (0..5u8)
        .map(|i| file(&format!("slice{i}.dcm"), i, i + 10, 40 - i * 10))
        .collect()
}

#[tokio::test]
async fn loads_stack_in_selection_order() {
    let mut viewer = viewer();
    assert!(viewer.load_batch(&five_slices(), &SyntheticDecoder).await.unwrap());

    let stack = viewer.stack().unwrap();
    assert_eq!(stack.len(), 5);
    for (index, image) in stack.iter().enumerate() {
        assert_eq!(image.data()[[0, 0, 0, 0]], index as f32 * 10.0);
    }

    let renderer = viewer.renderer();
    assert_eq!(
        renderer.scroll_bindings,
        vec![Some(ScrollRange { min: 0, max: 4, step: 1 })]
    );
    assert_eq!(renderer.camera_resets, 1);
    assert_eq!(renderer.renders, 1);
    assert_eq!(
        viewer.status().0,
        vec![
            "Loading 5 file(s)...".to_owned(),
            "Loaded 5 images, scroll to navigate".to_owned(),
        ]
    );
}

#[tokio::test]
async fn identity_geometry_gives_default_camera() {
    let mut viewer = viewer();
    viewer.load_batch(&five_slices(), &SyntheticDecoder).await.unwrap();

    let descriptor = viewer.descriptor().unwrap();
    let camera = descriptor.camera();
    assert_eq!(camera.normal, Vector3::new(0.0, 0.0, 1.0));
    assert_eq!(camera.view_up, Vector3::new(0.0, -1.0, 0.0));
    assert_eq!(camera.focal_point, Point3::new(0.5, 0.5, 0.0));
    assert_eq!(camera.position, Point3::new(0.5, 0.5, -1.0));
}

#[tokio::test]
async fn single_image_does_not_bind_scrolling() {
    let mut viewer = viewer();
    viewer
        .load_batch(&[file("only.dcm", 0, 100, 0)], &SyntheticDecoder)
        .await
        .unwrap();

    assert_eq!(viewer.navigator().unwrap().max_index(), 0);
    assert_eq!(viewer.renderer().scroll_bindings, vec![None]);
    assert_eq!(viewer.status().0.last().unwrap(), "Loaded single image");
    assert_eq!(viewer.scroll(1), None);
}

#[tokio::test]
async fn scrolling_rewindows_and_rerenders() {
    let mut viewer = viewer();
    viewer.load_batch(&five_slices(), &SyntheticDecoder).await.unwrap();
    let first = viewer.descriptor().unwrap();
    assert_eq!(first.window_level(), WindowLevel { window: 100.0, level: 50.0 });

    assert_eq!(viewer.scroll(-3), None);
    assert_eq!(viewer.current_index(), Some(0));

    assert_eq!(viewer.scroll(2), Some(2));
    let second = viewer.descriptor().unwrap();
    assert_eq!(second.slice_index(), 2);
    assert_eq!(second.window_level(), WindowLevel { window: 100.0, level: 70.0 });
    // The earlier snapshot is left untouched.
    assert_eq!(first.slice_index(), 0);

    assert_eq!(viewer.set_index(4), Some(4));
    assert_eq!(viewer.scroll(10), None);
    assert_eq!(viewer.current_index(), Some(4));
    assert_eq!(viewer.renderer().renders, 3);
}

#[tokio::test]
async fn initial_slice_is_configurable() {
    let mut viewer = ViewerContext::new(
        RecordingRenderer::default(),
        RecordingStatus::default(),
        ViewerOptions {
            initial_slice: InitialSlice::Middle,
            ..ViewerOptions::default()
        },
    );
    viewer.load_batch(&five_slices(), &SyntheticDecoder).await.unwrap();
    assert_eq!(viewer.current_index(), Some(2));
}

#[tokio::test]
async fn failed_batch_keeps_previous_stack() {
    let mut viewer = viewer();
    viewer.load_batch(&five_slices(), &SyntheticDecoder).await.unwrap();
    let published = viewer.descriptor().unwrap();

    let broken = vec![file("a.dcm", 1, 2, 0), file("b.dcm", u8::MAX, 0, 0)];
    let err = viewer.load_batch(&broken, &SyntheticDecoder).await.unwrap_err();
    assert!(matches!(
        err,
        ViewerError::Stack(StackError::Decode { index: 1, .. })
    ));

    assert!(Arc::ptr_eq(&viewer.descriptor().unwrap(), &published));
    assert_eq!(viewer.stack().unwrap().len(), 5);
    assert!(viewer.status().0.last().unwrap().starts_with("Error: Failed to decode b.dcm"));
}

#[tokio::test]
async fn failed_first_batch_publishes_nothing() {
    let mut viewer = viewer();
    let broken = vec![file("a.dcm", u8::MAX, 0, 0)];
    assert!(viewer.load_batch(&broken, &SyntheticDecoder).await.is_err());
    assert!(viewer.stack().is_none());
    assert!(viewer.renderer().pipelines.is_empty());
}

#[tokio::test]
async fn empty_selection_is_reported() {
    let mut viewer = viewer();
    let err = viewer.load_batch(&[], &SyntheticDecoder).await.unwrap_err();
    assert!(matches!(err, ViewerError::Stack(StackError::EmptyCollection)));
    assert_eq!(viewer.status().0.last().unwrap(), "Error: No files selected");
}

#[tokio::test]
async fn superseded_batch_is_discarded() {
    let mut viewer = viewer();
    let loader = viewer.loader();
    let slow = vec![file("old.dcm", 1, 2, 30)];
    let fast = vec![file("new.dcm", 5, 6, 0), file("new2.dcm", 5, 6, 0)];

    let old_batch = loader.load(&slow, &SyntheticDecoder);
    let new_batch = loader.load(&fast, &SyntheticDecoder);
    let new_batch = new_batch.await.unwrap();
    assert!(viewer.publish(new_batch).unwrap());

    let old_batch = old_batch.await.unwrap();
    assert!(!viewer.publish(old_batch).unwrap());
    assert_eq!(viewer.stack().unwrap().len(), 2);
}

#[tokio::test]
async fn load_batch_reports_when_superseded() {
    /// Requests another load while decoding, as a second file selection
    /// would.
    struct SupersedingDecoder(StackLoader, SyntheticDecoder);

    impl Decoder for SupersedingDecoder {
        fn decode<'a>(
            &'a self,
            source: &'a SourceFile,
        ) -> BoxFuture<'a, Result<Image, DecodeError>> {
            drop(self.0.load(&[], &self.1));
            self.1.decode(source)
        }
    }

    let mut viewer = viewer();
    let decoder = SupersedingDecoder(viewer.loader(), SyntheticDecoder);
    let published = viewer.load_batch(&five_slices(), &decoder).await.unwrap();

    assert!(!published);
    assert!(viewer.stack().is_none());
    assert!(viewer.renderer().pipelines.is_empty());
    assert_eq!(viewer.status().0, vec!["Loading 5 file(s)...".to_owned()]);
}

#[tokio::test]
async fn non_orthonormal_direction_is_a_geometry_error() {
    struct SkewedDecoder;

    impl Decoder for SkewedDecoder {
        fn decode<'a>(
            &'a self,
            _source: &'a SourceFile,
        ) -> BoxFuture<'a, Result<Image, DecodeError>> {
            let image = Image::new(
                Array4::zeros((1, 2, 2, 1)),
                [1.0; 3],
                Point3::origin(),
                Matrix3::new(1.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
            );
            async move { Ok(image) }.boxed()
        }
    }

    let mut viewer = viewer();
    let err = viewer
        .load_batch(&[file("skewed.dcm", 0, 0, 0)], &SkewedDecoder)
        .await
        .unwrap_err();
    assert!(matches!(err, ViewerError::Geometry(_)));
    assert!(viewer.stack().is_none());
}

fn head_and_bone_rules() -> Vec<ThresholdRule> {
    vec![
        ThresholdRule::new(1, 324.0, 1524.0),
        ThresholdRule::new(2, 1200.0, 2324.0),
    ]
}

fn head_and_bone_styles() -> Vec<LabelStyle> {
    vec![
        LabelStyle::new(1, [255, 0, 0], 0.5).with_outline(3),
        LabelStyle::new(2, [0, 255, 0], 0.5).with_outline(3),
    ]
}

#[tokio::test]
async fn segmentation_labels_the_reference_image() {
    let mut viewer = viewer();
    // Reference slice holds 500 in its top row and 1300 in its bottom row.
    let sources = vec![file("0.dcm", 50, 130, 0), file("1.dcm", 0, 200, 0)];
    viewer.load_batch(&sources, &SyntheticDecoder).await.unwrap();

    viewer
        .segment(head_and_bone_rules(), head_and_bone_styles())
        .unwrap();

    let descriptor = viewer.descriptor().unwrap();
    let segmentation = descriptor.active_segmentation().unwrap();
    assert_eq!(
        segmentation.labels.labels().as_slice().unwrap(),
        &[1, 1, 2, 2]
    );
    assert_eq!(segmentation.styles.get(1).unwrap().outline_thickness, 3);
    assert!(preview::render_descriptor(&descriptor).is_some());

    viewer.scroll(1);
    let scrolled = viewer.descriptor().unwrap();
    assert!(scrolled.segmentation().is_some());
    assert!(scrolled.active_segmentation().is_none());

    viewer.clear_segmentation();
    assert!(viewer.descriptor().unwrap().segmentation().is_none());
}

#[tokio::test]
async fn segmentation_requires_styles_for_all_rules() {
    let mut viewer = viewer();
    viewer.load_batch(&five_slices(), &SyntheticDecoder).await.unwrap();

    let styles = head_and_bone_styles()[..1].to_vec();
    let err = viewer.segment(head_and_bone_rules(), styles).unwrap_err();
    assert!(matches!(
        err,
        ViewerError::Style(StyleError::MissingStyle { label: 2 })
    ));
    assert!(viewer.descriptor().unwrap().segmentation().is_none());
    assert_eq!(viewer.status().0.last().unwrap(), "Error: No style defined for label 2");
}

#[test]
fn segmentation_without_stack_fails() {
    let mut viewer = viewer();
    let err = viewer
        .segment(head_and_bone_rules(), head_and_bone_styles())
        .unwrap_err();
    assert!(matches!(err, ViewerError::NoStack));
}
