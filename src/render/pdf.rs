//! PDF backend on `printpdf` 0.8.
//!
//! printpdf builds documents from `PdfPage`s holding `Vec<Op>` operation
//! lists. Each native run becomes one text section, in a standard-14 font
//! or in the document's embedded user font when it carries one; each
//! bitmap run places a shared image XObject scaled to a square of
//! `BITMAP_SCALE × font size` sitting on the baseline. Missing characters
//! only move the pen.

use super::{RenderBackend, RenderDocument};
use crate::error::RenderError;
use crate::glyph::resolver::BITMAP_SCALE;
use crate::glyph::GlyphDecision;
use crate::layout::TextStyle;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use printpdf::{
    BuiltinFont, FontId, Mm, Op, ParsedFont, PdfDocument, PdfPage, PdfSaveOptions, PdfWarnMsg,
    Point, Pt, RawImage, RawImageData, RawImageFormat, TextItem, XObjectId, XObjectTransform,
};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Pixel density at which a bitmap's pixel size equals its size in points.
const NATIVE_DPI: f32 = 72.0;

/// The face native runs are written in.
#[derive(Debug, Clone)]
enum TextFace {
    Builtin(BuiltinFont),
    Embedded(FontId),
}

impl TextFace {
    fn ops(&self, text: &str, size: f32) -> [Op; 2] {
        let items = vec![TextItem::Text(text.to_string())];
        match self {
            Self::Builtin(font) => [
                Op::SetFontSizeBuiltinFont {
                    size: Pt(size),
                    font: font.clone(),
                },
                Op::WriteTextBuiltinFont {
                    items,
                    font: font.clone(),
                },
            ],
            Self::Embedded(id) => [
                Op::SetFontSize {
                    size: Pt(size),
                    font: id.clone(),
                },
                Op::WriteText {
                    items,
                    font: id.clone(),
                },
            ],
        }
    }
}

/// Renders with Helvetica (prose) and Courier (code), or with the
/// document's user font when it has one.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfBackend;

impl PdfBackend {
    pub fn new() -> Self {
        Self
    }

    fn font_for(style: TextStyle) -> BuiltinFont {
        match style {
            TextStyle::Prose => BuiltinFont::Helvetica,
            TextStyle::Code => BuiltinFont::Courier,
        }
    }
}

impl RenderBackend for PdfBackend {
    #[instrument(skip_all, fields(title = %doc.title, pages = doc.page_count()))]
    fn render(
        &self,
        doc: &RenderDocument,
        progress: &dyn Fn(usize, usize),
    ) -> Result<Vec<u8>, RenderError> {
        let g = &doc.geometry;
        let page_w = Mm(g.page_width / crate::config::PT_PER_MM);
        let page_h = Mm(g.page_height / crate::config::PT_PER_MM);

        let mut pdf = PdfDocument::new(&doc.title);
        let mut warnings: Vec<PdfWarnMsg> = Vec::new();
        let face = match &doc.font {
            Some(user) => {
                let parsed = ParsedFont::from_bytes(user.data(), 0, &mut warnings).ok_or_else(|| {
                    RenderError::Backend(format!("cannot embed font {}", user.name()))
                })?;
                TextFace::Embedded(pdf.add_font(&parsed))
            }
            None => TextFace::Builtin(Self::font_for(doc.style)),
        };
        let mut xobjects: HashMap<&str, (XObjectId, usize)> = HashMap::new();
        let glyph_box = BITMAP_SCALE * g.font_size;
        let total = doc.page_count();
        let mut pages = Vec::with_capacity(total);

        for (page_idx, lines) in doc.pages.iter().enumerate() {
            let mut ops: Vec<Op> = Vec::new();

            for (line_idx, runs) in lines.iter().enumerate() {
                let baseline =
                    g.page_height - g.margin - g.font_size - line_idx as f32 * g.line_height;
                let mut x = g.margin;

                for run in runs {
                    match &run.decision {
                        GlyphDecision::Native => {
                            ops.push(Op::StartTextSection);
                            ops.push(Op::SetTextCursor {
                                pos: Point {
                                    x: Pt(x),
                                    y: Pt(baseline),
                                },
                            });
                            ops.extend(face.ops(&run.text, g.font_size));
                            ops.push(Op::EndTextSection);
                        }
                        GlyphDecision::Bitmap { key } => {
                            let (id, px) = match xobjects.get(key.as_str()) {
                                Some(entry) => entry.clone(),
                                None => {
                                    let data = doc.bitmaps.get(key).ok_or_else(|| {
                                        RenderError::BadBitmap {
                                            key: key.clone(),
                                            detail: "bitmap not attached to document".into(),
                                        }
                                    })?;
                                    let raw = decode_bitmap(key, data)?;
                                    let px = raw.width.max(raw.height).max(1);
                                    let id = pdf.add_image(&raw);
                                    xobjects.insert(key.as_str(), (id.clone(), px));
                                    (id, px)
                                }
                            };
                            let scale = glyph_box / px as f32;
                            ops.push(Op::UseXobject {
                                id,
                                transform: XObjectTransform {
                                    translate_x: Some(Pt(x)),
                                    translate_y: Some(Pt(baseline - 0.1 * g.font_size)),
                                    scale_x: Some(scale),
                                    scale_y: Some(scale),
                                    dpi: Some(NATIVE_DPI),
                                    rotate: None,
                                },
                            });
                        }
                        GlyphDecision::Missing(_) => {}
                    }
                    x += run.advance;
                }
            }

            pages.push(PdfPage::new(page_w, page_h, ops));
            progress(page_idx + 1, total);
        }

        if pages.is_empty() {
            pages.push(PdfPage::new(page_w, page_h, Vec::new()));
        }
        pdf.with_pages(pages);

        let bytes = pdf.save(&PdfSaveOptions::default(), &mut warnings);
        debug!(
            bytes = bytes.len(),
            bitmaps = xobjects.len(),
            warnings = warnings.len(),
            "PDF rendered"
        );
        Ok(bytes)
    }
}

/// Decode a base64 PNG into RGB pixels, flattening transparency onto white.
fn decode_bitmap(key: &str, data: &str) -> Result<RawImage, RenderError> {
    let bad = |detail: String| RenderError::BadBitmap {
        key: key.to_string(),
        detail,
    };
    let bytes = STANDARD.decode(data.trim()).map_err(|e| bad(e.to_string()))?;
    let img = image::load_from_memory(&bytes).map_err(|e| bad(e.to_string()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for p in rgba.pixels() {
        let [r, g, b, a] = p.0;
        let alpha = a as u16;
        for c in [r, g, b] {
            let blended = (c as u16 * alpha + 255 * (255 - alpha)) / 255;
            pixels.push(blended as u8);
        }
    }

    Ok(RawImage {
        pixels: RawImageData::U8(pixels),
        width: width as usize,
        height: height as usize,
        data_format: RawImageFormat::RGB8,
        tag: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BatchConfig;
    use crate::glyph::GlyphRun;
    use std::collections::BTreeMap;
    use std::io::Cursor;

    fn png_b64() -> String {
        let img = image::RgbaImage::from_pixel(8, 8, image::Rgba([0, 0, 0, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        STANDARD.encode(out.into_inner())
    }

    fn run(decision: GlyphDecision, text: &str, advance: f32) -> GlyphRun {
        GlyphRun {
            decision,
            text: text.into(),
            advance,
        }
    }

    fn doc(pages: Vec<Vec<Vec<GlyphRun>>>, bitmaps: BTreeMap<String, String>) -> RenderDocument {
        RenderDocument {
            title: "test".into(),
            style: TextStyle::Prose,
            geometry: BatchConfig::default().geometry(TextStyle::Prose),
            pages,
            bitmaps,
            font: None,
        }
    }

    #[test]
    fn renders_a_pdf_with_text_and_bitmaps() {
        let mut bitmaps = BTreeMap::new();
        bitmaps.insert("0x1F980".to_string(), png_b64());
        let d = doc(
            vec![
                vec![vec![
                    run(GlyphDecision::Native, "Hello ", 30.0),
                    run(GlyphDecision::Bitmap { key: "0x1F980".into() }, "🦀", 8.9),
                    run(GlyphDecision::Missing('中'), "中", 4.2),
                ]],
                vec![vec![run(GlyphDecision::Native, "page two", 40.0)]],
            ],
            bitmaps,
        );
        let pages_seen = std::cell::Cell::new(0);
        let bytes = PdfBackend::new()
            .render(&d, &|done, _| pages_seen.set(done))
            .unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert_eq!(pages_seen.get(), 2);
    }

    #[test]
    fn embeds_the_user_font() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/Tuffy.ttf");
        let font = crate::layout::UserFont::open(&path).unwrap();
        let mut d = doc(
            vec![vec![vec![run(GlyphDecision::Native, "Γειά σου", 40.0)]]],
            BTreeMap::new(),
        );
        d.font = Some(std::sync::Arc::new(font));

        let bytes = PdfBackend::new().render(&d, &|_, _| {}).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let plain = PdfBackend::new()
            .render(&doc(d.pages.clone(), BTreeMap::new()), &|_, _| {})
            .unwrap();
        assert!(bytes.len() > plain.len(), "font program not embedded");
    }

    #[test]
    fn missing_bitmap_is_an_error() {
        let d = doc(
            vec![vec![vec![run(
                GlyphDecision::Bitmap { key: "0x2603".into() },
                "☃",
                8.9,
            )]]],
            BTreeMap::new(),
        );
        let err = PdfBackend::new().render(&d, &|_, _| {}).unwrap_err();
        assert!(matches!(err, RenderError::BadBitmap { .. }));
    }

    #[test]
    fn corrupt_bitmap_is_an_error() {
        assert!(decode_bitmap("0x41", "bm90IGEgcG5n").is_err());
        assert!(decode_bitmap("0x41", "***").is_err());
    }

    #[test]
    fn transparency_flattens_to_white() {
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 0]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        let raw = decode_bitmap("0x41", &STANDARD.encode(out.into_inner())).unwrap();
        match raw.pixels {
            RawImageData::U8(px) => assert_eq!(px, vec![255, 255, 255]),
            _ => panic!("expected 8-bit pixels"),
        }
    }
}
