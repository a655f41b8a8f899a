//! pdfium implementation of [`PdfBackend`].
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which is not
//! re-entrant per document, so every call here is blocking and must run
//! inside `spawn_blocking` (see [`crate::analyze::export_pdf`]).
//!
//! Binding order:
//!
//! | Source | Notes |
//! |--------|-------|
//! | `PDFIUM_LIB_PATH` | file or directory holding libpdfium |
//! | system loader | `bind_to_system_library()` |
//!
//! Text is drawn with the 14 standard PDF fonts, so no font files are
//! embedded and the output is byte-stable for a given layout.

use crate::error::VerumError;
use crate::pipeline::layout::{FontFace, LogoImage, LogoPlacement, PageGeometry, ReportLayout, TextRun};
use crate::pipeline::seal::PdfBackend;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

/// Environment variable pointing at an existing libpdfium.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Document backend bound to a pdfium library.
pub struct PdfiumBackend {
    pdfium: Pdfium,
}

impl PdfiumBackend {
    /// Bind to `PDFIUM_LIB_PATH` when set, else to the system library.
    pub fn bind() -> Result<Self, VerumError> {
        let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
            Ok(raw) if !raw.trim().is_empty() => {
                let path = PathBuf::from(raw.trim());
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                debug!("Binding pdfium at {}", lib.display());
                Pdfium::bind_to_library(&lib)
                    .map_err(|e| VerumError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e)))?
            }
            _ => Pdfium::bind_to_system_library()
                .map_err(|e| VerumError::PdfiumBindingFailed(format!("{:?}", e)))?,
        };
        info!("pdfium bound");
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

fn failed(stage: &'static str) -> impl Fn(PdfiumError) -> VerumError {
    move |e| VerumError::PdfRenderFailed {
        stage,
        detail: format!("{:?}", e),
    }
}

/// The three standard fonts a layout can ask for.
#[derive(Clone, Copy)]
struct Fonts {
    regular: PdfFontToken,
    bold: PdfFontToken,
    mono: PdfFontToken,
}

impl Fonts {
    fn load(document: &mut PdfDocument) -> Self {
        let fonts = document.fonts_mut();
        Self {
            regular: fonts.helvetica(),
            bold: fonts.helvetica_bold(),
            mono: fonts.courier(),
        }
    }

    fn for_face(&self, face: FontFace) -> PdfFontToken {
        match face {
            FontFace::Regular => self.regular,
            FontFace::Bold => self.bold,
            FontFace::Mono => self.mono,
        }
    }
}

fn draw_runs(
    page: &mut PdfPage,
    fonts: &Fonts,
    geometry: &PageGeometry,
    runs: &[TextRun],
) -> Result<(), VerumError> {
    for run in runs {
        // Layout coordinates grow downwards; PDF user space grows upwards.
        let mut object = page
            .objects_mut()
            .create_text_object(
                PdfPoints::new(run.x),
                PdfPoints::new(geometry.height - run.baseline),
                &run.text,
                fonts.for_face(run.face),
                PdfPoints::new(run.size),
            )
            .map_err(failed("text"))?;
        object
            .set_fill_color(PdfColor::new(run.gray, run.gray, run.gray, 255))
            .map_err(failed("text colour"))?;
    }
    Ok(())
}

fn draw_logo(
    page: &mut PdfPage,
    geometry: &PageGeometry,
    logo: &LogoImage,
    placement: &LogoPlacement,
) -> Result<(), VerumError> {
    let image = image::load_from_memory(&logo.png).map_err(|e| VerumError::PdfRenderFailed {
        stage: "logo decode",
        detail: e.to_string(),
    })?;
    page.objects_mut()
        .create_image_object(
            PdfPoints::new(placement.x),
            PdfPoints::new(geometry.height - placement.top - placement.height),
            &image,
            Some(PdfPoints::new(placement.width)),
            Some(PdfPoints::new(placement.height)),
        )
        .map_err(failed("logo"))?;
    Ok(())
}

impl PdfBackend for PdfiumBackend {
    fn paginate(&self, layout: &ReportLayout) -> Result<Vec<u8>, VerumError> {
        let mut document = self.pdfium.create_new_pdf().map_err(failed("create"))?;
        let fonts = Fonts::load(&mut document);

        for (index, laid_out) in layout.pages.iter().enumerate() {
            let mut page = document
                .pages_mut()
                .create_page_at_end(PdfPagePaperSize::a4())
                .map_err(failed("page"))?;
            if index == 0 {
                if let Some((logo, placement)) = &layout.logo {
                    draw_logo(&mut page, &layout.geometry, logo, placement)?;
                }
            }
            draw_runs(&mut page, &fonts, &layout.geometry, &laid_out.runs)?;
        }

        let bytes = document.save_to_bytes().map_err(failed("save"))?;
        debug!("Paginated {} pages → {} bytes", layout.page_count(), bytes.len());
        Ok(bytes)
    }

    fn stamp(
        &self,
        unsealed: &[u8],
        geometry: &PageGeometry,
        runs: &[TextRun],
    ) -> Result<Vec<u8>, VerumError> {
        let mut document = self
            .pdfium
            .load_pdf_from_byte_vec(unsealed.to_vec(), None)
            .map_err(failed("reload"))?;
        let fonts = Fonts::load(&mut document);
        {
            let mut last = document.pages().last().map_err(failed("last page"))?;
            draw_runs(&mut last, &fonts, geometry, runs)?;
        }
        document.save_to_bytes().map_err(failed("save"))
    }

    fn last_page_text(&self, document: &[u8]) -> Result<String, VerumError> {
        let document = self
            .pdfium
            .load_pdf_from_byte_vec(document.to_vec(), None)
            .map_err(failed("load"))?;
        let page = document.pages().last().map_err(failed("last page"))?;
        let text = page.text().map_err(failed("text extraction"))?;
        Ok(text.all())
    }
}
