// sheethub/src/watermark.rs

//! Watermarking of purchased documents.
//!
//! Documents are multi-page rasters (`PageDocument`): an ordered list of PNG
//! pages. `Watermarker::apply` is a pure transform from master bytes plus a
//! watermark image to derivative bytes; when to call it is the delivery
//! service's business, not this module's.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;
use tracing::{event, instrument, Level};

#[derive(Debug, Error)]
pub enum WatermarkError {
  #[error("Document has no pages")]
  EmptyDocument,

  #[error("Document could not be decoded. Source: {source}")]
  DocumentDecode {
    #[source]
    source: serde_json::Error,
  },

  #[error("Page {page} could not be decoded. Source: {source}")]
  PageDecode {
    page: usize,
    #[source]
    source: anyhow::Error,
  },

  #[error("Watermark image could not be decoded. Source: {source}")]
  WatermarkDecode {
    #[source]
    source: image::ImageError,
  },

  #[error("Page {page} could not be encoded. Source: {source}")]
  PageEncode {
    page: usize,
    #[source]
    source: image::ImageError,
  },

  #[error("Document could not be encoded. Source: {source}")]
  DocumentEncode {
    #[source]
    source: serde_json::Error,
  },
}

/// Deterministic transform: master document + watermark image -> derivative document.
pub trait Watermarker: Send + Sync + 'static {
  fn apply(&self, master: &[u8], watermark: &[u8]) -> Result<Vec<u8>, WatermarkError>;
}

#[derive(Serialize, Deserialize)]
struct PageDocumentWire {
  pages: Vec<String>,
}

/// Ordered pages of encoded images. Serialized as `{"pages": [<base64>, ...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageDocument {
  pages: Vec<Vec<u8>>,
}

impl PageDocument {
  pub fn from_pages(pages: Vec<Vec<u8>>) -> Self {
    Self { pages }
  }

  pub fn pages(&self) -> &[Vec<u8>] {
    &self.pages
  }

  pub fn page_count(&self) -> usize {
    self.pages.len()
  }

  pub fn encode(&self) -> Result<Vec<u8>, WatermarkError> {
    let wire = PageDocumentWire {
      pages: self.pages.iter().map(|page| STANDARD.encode(page)).collect(),
    };
    serde_json::to_vec(&wire).map_err(|source| WatermarkError::DocumentEncode { source })
  }

  pub fn decode(bytes: &[u8]) -> Result<Self, WatermarkError> {
    let wire: PageDocumentWire =
      serde_json::from_slice(bytes).map_err(|source| WatermarkError::DocumentDecode { source })?;
    let pages = wire
      .pages
      .iter()
      .enumerate()
      .map(|(index, page)| {
        STANDARD.decode(page).map_err(|e| WatermarkError::PageDecode {
          page: index + 1,
          source: anyhow::Error::new(e).context("page is not valid base64"),
        })
      })
      .collect::<Result<Vec<_>, _>>()?;
    Ok(Self { pages })
  }
}

/// Composites the watermark over every page, anchored at the bottom-right
/// corner with alpha-over blending, and re-encodes pages as PNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageWatermarker {
  /// Distance in pixels from the right and bottom edges.
  margin: u32,
}

impl ImageWatermarker {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_margin(margin: u32) -> Self {
    Self { margin }
  }

  fn stamp(&self, page: &mut RgbaImage, watermark: &RgbaImage) {
    let x = i64::from(page.width()) - i64::from(watermark.width()) - i64::from(self.margin);
    let y = i64::from(page.height()) - i64::from(watermark.height()) - i64::from(self.margin);
    imageops::overlay(page, watermark, x, y);
  }
}

impl Watermarker for ImageWatermarker {
  #[instrument(name = "ImageWatermarker::apply", skip_all, fields(master_size = master.len()), err(Display))]
  fn apply(&self, master: &[u8], watermark: &[u8]) -> Result<Vec<u8>, WatermarkError> {
    let document = PageDocument::decode(master)?;
    if document.pages.is_empty() {
      return Err(WatermarkError::EmptyDocument);
    }
    let watermark = image::load_from_memory(watermark)
      .map_err(|source| WatermarkError::WatermarkDecode { source })?
      .to_rgba8();

    let mut stamped = Vec::with_capacity(document.pages.len());
    for (index, page_bytes) in document.pages.iter().enumerate() {
      let page_number = index + 1;
      let mut page = image::load_from_memory(page_bytes)
        .map_err(|e| WatermarkError::PageDecode {
          page: page_number,
          source: anyhow::Error::new(e),
        })?
        .to_rgba8();
      self.stamp(&mut page, &watermark);

      let mut encoded = Vec::new();
      page
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .map_err(|source| WatermarkError::PageEncode {
          page: page_number,
          source,
        })?;
      stamped.push(encoded);
    }

    event!(Level::DEBUG, pages = stamped.len(), "Watermark applied to all pages.");
    PageDocument::from_pages(stamped).encode()
  }
}
