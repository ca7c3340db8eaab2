//! # DICOM-stack library
//!
//! This crate assembles independently decoded DICOM slices into a
//! navigable, windowed and optionally labelled stack, ready to be handed to
//! a renderer.
//!
//! Files of one selection are decoded concurrently and land in the stack at
//! the index they were selected at, no matter which decode finishes first.
//! A single failing file fails the whole batch. From the first image of a
//! stack the camera orientation is derived; every slice change recomputes
//! the window/level from that slice's own intensity range.
//!
//! Threshold rules classify the voxels of the first image into a label
//! volume. Rules run in the order given and later rules overwrite earlier
//! ones where their ranges overlap. Labels are drawn with per-label color,
//! opacity and outline.
//!
//! Decoding itself is left to a [`Decoder`](stack_loader::Decoder); the
//! bundled [`DicomDecoder`](dicom_decoder::DicomDecoder) uses dicom-rs.
//! Rendering is left to a [`Renderer`](context::Renderer), which receives
//! immutable [`PipelineDescriptor`](pipeline::PipelineDescriptor)s.
//!
//! # Examples
//!
//! ## Loading a directory and labelling it
//!
//! ```no_run
//! # use dicom_stack::{
//! #     context::{Renderer, TracingStatusSink, ViewerContext, ViewerOptions},
//! #     dicom_decoder::DicomDecoder,
//! #     label_style::LabelStyle,
//! #     navigator::ScrollRange,
//! #     pipeline::PipelineDescriptor,
//! #     segmentation::ThresholdRule,
//! #     stack_loader::sources_from_directory,
//! # };
//! # use std::sync::Arc;
//! # struct NoopRenderer;
//! # impl Renderer for NoopRenderer {
//! #     fn set_pipeline(&mut self, _: Arc<PipelineDescriptor>) {}
//! #     fn reset_camera(&mut self) {}
//! #     fn render(&mut self) {}
//! #     fn bind_scroll(&mut self, _: Option<ScrollRange>) {}
//! # }
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let sources = sources_from_directory("dicom")?;
//! let mut viewer = ViewerContext::new(NoopRenderer, TracingStatusSink, ViewerOptions::default());
//! viewer.load_batch(&sources, &DicomDecoder).await?;
//!
//! viewer.segment(
//!     vec![
//!         ThresholdRule::new(1, 324.0, 1524.0),
//!         ThresholdRule::new(2, 1200.0, 2324.0),
//!     ],
//!     vec![
//!         LabelStyle::new(1, [255, 0, 0], 0.5).with_outline(3),
//!         LabelStyle::new(2, [0, 255, 0], 0.5).with_outline(3),
//!     ],
//! )?;
//! viewer.scroll(1);
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod dicom_decoder;
pub mod enums;
pub mod label_style;
pub mod navigator;
pub mod orientation;
pub mod pipeline;
pub mod preview;
pub mod segmentation;
pub mod stack_loader;
pub mod volume;
pub mod window_level;
