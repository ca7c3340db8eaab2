use std::{path::PathBuf, process::ExitCode, str::FromStr, sync::Arc};

use clap::Parser;
use dicom_stack::{
    context::{Renderer, TracingStatusSink, ViewerContext, ViewerOptions},
    dicom_decoder::DicomDecoder,
    enums::InitialSlice,
    label_style::LabelStyle,
    navigator::ScrollRange,
    pipeline::PipelineDescriptor,
    preview,
    segmentation::ThresholdRule,
    stack_loader::sources_from_directory,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Load a directory of DICOM slices, optionally label it, and write a preview
#[derive(Parser, Debug)]
#[command(author, about, version, long_about)]
struct Args {
    /// Directory containing the .dcm files of one series
    input: PathBuf,

    /// Threshold rule as LABEL:LOWER:UPPER, applied in the order given
    #[arg(short, long)]
    threshold: Vec<RuleArg>,

    /// Label style as LABEL:R,G,B:OPACITY[:OUTLINE_THICKNESS]
    #[arg(short, long)]
    style: Vec<StyleArg>,

    /// Slice to show after loading
    #[arg(long)]
    slice: Option<usize>,

    /// Write the shown slice as PNG to this path
    #[arg(short, long)]
    preview: Option<PathBuf>,
}

#[derive(Debug, Clone)]
struct RuleArg(ThresholdRule);

impl FromStr for RuleArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let [label, lower, upper] = s.split(':').collect::<Vec<_>>()[..] else {
            return Err(format!("expected LABEL:LOWER:UPPER, got '{s}'"));
        };
        Ok(Self(ThresholdRule::new(
            label.parse().map_err(|e| format!("label '{label}': {e}"))?,
            lower.parse().map_err(|e| format!("lower bound '{lower}': {e}"))?,
            upper.parse().map_err(|e| format!("upper bound '{upper}': {e}"))?,
        )))
    }
}

#[derive(Debug, Clone)]
struct StyleArg(LabelStyle);

impl FromStr for StyleArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<_> = s.split(':').collect();
        let (label, color, opacity, thickness) = match parts[..] {
            [label, color, opacity] => (label, color, opacity, None),
            [label, color, opacity, thickness] => (label, color, opacity, Some(thickness)),
            _ => return Err(format!("expected LABEL:R,G,B:OPACITY[:THICKNESS], got '{s}'")),
        };

        let channels = color
            .split(',')
            .map(|c| c.parse::<u8>().map_err(|e| format!("color '{color}': {e}")))
            .collect::<Result<Vec<_>, _>>()?;
        let [r, g, b] = channels[..] else {
            return Err(format!("color '{color}' must have three channels"));
        };

        let mut style = LabelStyle::new(
            label.parse().map_err(|e| format!("label '{label}': {e}"))?,
            [r, g, b],
            opacity.parse().map_err(|e| format!("opacity '{opacity}': {e}"))?,
        );
        if let Some(thickness) = thickness {
            style = style.with_outline(
                thickness
                    .parse()
                    .map_err(|e| format!("outline thickness '{thickness}': {e}"))?,
            );
        }
        Ok(Self(style))
    }
}

/// Keeps the latest pipeline so it can be written out.
#[derive(Default)]
struct HeadlessRenderer {
    pipeline: Option<Arc<PipelineDescriptor>>,
}

impl Renderer for HeadlessRenderer {
    fn set_pipeline(&mut self, descriptor: Arc<PipelineDescriptor>) {
        self.pipeline = Some(descriptor);
    }

    fn reset_camera(&mut self) {
        if let Some(camera) = self.pipeline.as_ref().map(|p| p.camera()) {
            info!(
                normal = ?camera.normal.as_slice(),
                view_up = ?camera.view_up.as_slice(),
                focal_point = ?camera.focal_point.coords.as_slice(),
                "Camera reset"
            );
        }
    }

    fn render(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            let wl = pipeline.window_level();
            info!(
                slice = pipeline.slice_index(),
                window = wl.window,
                level = wl.level,
                labelled = pipeline.active_segmentation().is_some(),
                "Render"
            );
        }
    }

    fn bind_scroll(&mut self, range: Option<ScrollRange>) {
        info!(?range, "Scroll binding");
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let sources = sources_from_directory(&args.input)?;
    let options = ViewerOptions {
        initial_slice: InitialSlice::First,
        ..ViewerOptions::default()
    };
    let mut viewer = ViewerContext::new(HeadlessRenderer::default(), TracingStatusSink, options);
    viewer.load_batch(&sources, &DicomDecoder).await?;

    if !args.threshold.is_empty() {
        let rules = args.threshold.into_iter().map(|RuleArg(rule)| rule).collect();
        let styles = args.style.into_iter().map(|StyleArg(style)| style).collect();
        viewer.segment(rules, styles)?;
    }

    if let Some(slice) = args.slice {
        viewer.set_index(slice);
    }

    if let Some(path) = args.preview {
        let image = viewer
            .descriptor()
            .and_then(|descriptor| preview::render_descriptor(&descriptor))
            .ok_or("nothing to preview")?;
        image.save(&path)?;
        info!(path = %path.display(), "Preview written");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "dicom-stack failed");
            ExitCode::FAILURE
        }
    }
}
