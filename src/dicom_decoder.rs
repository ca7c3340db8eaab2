use std::sync::Arc;

use dicom::{
    object::{DefaultDicomObject, OpenFileOptions, file::ReadPreamble},
    pixeldata::{ConvertOptions, PixelDecoder, VoiLutOption},
};
use dicom_dictionary_std::tags;
use futures::{FutureExt, future::BoxFuture};
use nalgebra::{Matrix3, Point3};
use tracing::debug;

use crate::{
    orientation::{GeometryError, direction_from_cosines},
    stack_loader::{DecodeError, Decoder, SourceFile},
    volume::Image,
};

/// Decodes DICOM Part 10 files with dicom-rs.
///
/// Samples go through the modality LUT (rescale slope/intercept) but not
/// through any VOI LUT, so window/level can be computed from the stored
/// range. Each file is decoded on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct DicomDecoder;

impl Decoder for DicomDecoder {
    fn decode<'a>(&'a self, source: &'a SourceFile) -> BoxFuture<'a, Result<Image, DecodeError>> {
        let bytes = Arc::clone(&source.bytes);
        let filename = source.filename.clone();
        async move {
            let image = tokio::task::spawn_blocking(move || Self::decode_bytes(&bytes))
                .await
                .map_err(|e| DecodeError::Other(format!("decode task failed: {e}")))??;
            debug!(filename = %filename, dimensions = ?image.dimensions(), "Decoded DICOM file");
            Ok(image)
        }
        .boxed()
    }
}

impl DicomDecoder {
    /// Decode a complete file, preamble included.
    pub fn decode_bytes(bytes: &[u8]) -> Result<Image, DecodeError> {
        let object = OpenFileOptions::new()
            .read_preamble(ReadPreamble::Always)
            .from_reader(bytes)?;
        Self::decode_object(&object)
    }

    pub fn decode_object(object: &DefaultDicomObject) -> Result<Image, DecodeError> {
        let pixel_data = object
            .decode_pixel_data()
            .map_err(|e| DecodeError::PixelData(e.to_string()))?;
        let options = ConvertOptions::new().with_voi_lut(VoiLutOption::Identity);
        let data = pixel_data
            .to_ndarray_with_options::<f32>(&options)
            .map_err(|e| DecodeError::PixelData(e.to_string()))?;

        let geometry = Geometry::from_values(
            Self::floats(object, tags::IMAGE_ORIENTATION_PATIENT),
            Self::floats(object, tags::IMAGE_POSITION_PATIENT),
            Self::floats(object, tags::PIXEL_SPACING),
            Self::floats(object, tags::SPACING_BETWEEN_SLICES)
                .or_else(|| Self::floats(object, tags::SLICE_THICKNESS))
                .and_then(|values| values.first().copied()),
        )?;

        Ok(Image::new(
            data,
            geometry.spacing,
            geometry.origin,
            geometry.direction,
        ))
    }

    fn floats(object: &DefaultDicomObject, tag: dicom::core::Tag) -> Option<Vec<f64>> {
        object.element(tag).ok()?.to_multi_float64().ok()
    }
}

#[derive(Debug, PartialEq)]
struct Geometry {
    spacing: [f64; 3],
    origin: Point3<f64>,
    direction: Matrix3<f64>,
}

impl Geometry {
    /// Image Orientation (Patient) is required. Absent position and spacing
    /// fall back to zero origin and unit spacing. Pixel Spacing is stored row
    /// spacing first.
    fn from_values(
        orientation: Option<Vec<f64>>,
        position: Option<Vec<f64>>,
        pixel_spacing: Option<Vec<f64>>,
        slice_spacing: Option<f64>,
    ) -> Result<Self, GeometryError> {
        let cosines = orientation.ok_or(GeometryError::MissingDirection)?;
        let direction = direction_from_cosines(&cosines)?;
        let origin = match position.as_deref() {
            Some([x, y, z, ..]) => Point3::new(*x, *y, *z),
            _ => Point3::origin(),
        };
        let (row_spacing, column_spacing) = match pixel_spacing.as_deref() {
            Some([row, column, ..]) => (*row, *column),
            _ => (1.0, 1.0),
        };
        let slice_spacing = slice_spacing.filter(|s| *s > 0.0).unwrap_or(1.0);

        Ok(Self {
            spacing: [column_spacing, row_spacing, slice_spacing],
            origin,
            direction,
        })
    }
}
