use crate::{orientation::GeometryError, volume::Image};

use futures::{StreamExt, future::BoxFuture, stream::FuturesUnordered};
use std::{
    fs,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("DICOM read error: {0}")]
    Read(#[from] dicom::object::ReadError),

    #[error("Pixel data could not be decoded: {0}")]
    PixelData(String),

    #[error("Invalid image geometry: {0}")]
    Geometry(#[from] GeometryError),

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("No files selected")]
    EmptyCollection,

    #[error("Failed to decode {filename} (file #{index}): {source}")]
    Decode {
        index: usize,
        filename: String,
        #[source]
        source: DecodeError,
    },

    #[error("Image #{index} does not match the in-plane dimensions of the first image")]
    InconsistentDimensions { index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw bytes of one selected file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filename: String,
    pub bytes: Arc<[u8]>,
}

impl SourceFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Turns raw file bytes into an [`Image`].
///
/// Implementations must tolerate being called for several files at once and
/// release whatever they acquire before the returned future completes.
pub trait Decoder: Send + Sync {
    fn decode<'a>(&'a self, source: &'a SourceFile) -> BoxFuture<'a, Result<Image, DecodeError>>;
}

/// Images in selection order. Index `i` always holds the image decoded from
/// the `i`-th selected file.
#[derive(Debug, Default)]
pub struct ImageStack {
    images: Vec<Image>,
}

impl ImageStack {
    pub(crate) fn from_images(images: Vec<Image>) -> Self {
        Self { images }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Image> {
        self.images.get(index)
    }

    /// The image camera orientation is derived from.
    pub fn reference(&self) -> Option<&Image> {
        self.images.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Image> {
        self.images.iter()
    }

    /// Last valid slice index, `None` for an empty stack.
    pub fn max_index(&self) -> Option<usize> {
        self.images.len().checked_sub(1)
    }
}

/// A successfully assembled stack, tagged with the batch it belongs to.
#[derive(Debug)]
pub struct LoadedBatch {
    pub generation: u64,
    pub stack: ImageStack,
}

/// Fans out decoding of a file selection and assembles the results.
///
/// Every call to [`StackLoader::load`] starts a new batch generation; clones
/// share the counter, so the owner of the published stack can tell whether a
/// finished batch has been superseded.
#[derive(Debug, Clone, Default)]
pub struct StackLoader {
    generation: Arc<AtomicU64>,
}

impl StackLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the most recently requested batch.
    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    /// Decode all `sources` concurrently and assemble them in input order.
    ///
    /// The batch generation is taken when this is called, not when the
    /// returned future is first polled.
    ///
    /// # Errors
    ///
    /// Fails with [`StackError::EmptyCollection`] for an empty selection and
    /// with [`StackError::Decode`] as soon as any file fails; decodes still in
    /// flight are dropped.
    pub fn load<'a, D: Decoder + ?Sized>(
        &self,
        sources: &'a [SourceFile],
        decoder: &'a D,
    ) -> impl Future<Output = Result<LoadedBatch, StackError>> + Send + use<'a, D> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let stack = Self::assemble(sources, decoder, generation).await?;
            Ok(LoadedBatch { generation, stack })
        }
    }

    async fn assemble<D: Decoder + ?Sized>(
        sources: &[SourceFile],
        decoder: &D,
        generation: u64,
    ) -> Result<ImageStack, StackError> {
        if sources.is_empty() {
            return Err(StackError::EmptyCollection);
        }

        let started = Instant::now();
        info!(generation, files = sources.len(), "Decoding batch");

        let mut slots: Vec<Option<Image>> = (0..sources.len()).map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| async move { (index, decoder.decode(source).await) })
            .collect();

        let mut completed = 0;
        while let Some((index, result)) = pending.next().await {
            match result {
                Ok(image) => {
                    debug!(generation, index, filename = %sources[index].filename, "Decoded");
                    slots[index] = Some(image);
                    completed += 1;
                }
                Err(source) => {
                    warn!(
                        generation,
                        index,
                        filename = %sources[index].filename,
                        error = %source,
                        outstanding = pending.len(),
                        "Decode failed, abandoning batch"
                    );
                    return Err(StackError::Decode {
                        index,
                        filename: sources[index].filename.clone(),
                        source,
                    });
                }
            }
        }
        debug_assert_eq!(completed, sources.len());

        let images: Vec<Image> = slots.into_iter().flatten().collect();
        Self::validate_dimensions(&images)?;

        info!(
            generation,
            images = images.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch assembled"
        );
        Ok(ImageStack::from_images(images))
    }

    fn validate_dimensions(images: &[Image]) -> Result<(), StackError> {
        let Some(first) = images.first() else {
            return Err(StackError::EmptyCollection);
        };
        let [width, height, _] = first.dimensions();
        match images
            .iter()
            .position(|image| image.dimensions()[..2] != [width, height])
        {
            Some(index) => Err(StackError::InconsistentDimensions { index }),
            None => Ok(()),
        }
    }
}

/// Read every `.dcm` file of a directory, ordered by file name.
pub fn sources_from_directory(path: impl AsRef<Path>) -> Result<Vec<SourceFile>, StackError> {
    let mut paths: Vec<_> = fs::read_dir(path.as_ref())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let bytes = fs::read(&path)?;
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(SourceFile::new(filename, bytes))
        })
        .collect()
}
