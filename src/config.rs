//! Configuration types for batch conversion.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. Keeping every knob in one serialisable struct lets
//! the Safe-mode journal persist the exact parameter set of a run, so an
//! interrupted batch resumes with the same page geometry it started with.

use crate::error::BatchError;
use crate::layout::TextStyle;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Points per millimetre (PDF user space is 1/72 inch).
pub const PT_PER_MM: f32 = 72.0 / 25.4;

/// Configuration for one conversion batch.
///
/// # Example
/// ```rust
/// use paperweight::{BatchConfig, PaperSize, ResourceMode};
///
/// let config = BatchConfig::builder()
///     .paper(PaperSize::Letter)
///     .mode(ResourceMode::Safe)
///     .build()
///     .unwrap();
/// assert_eq!(config.mode, ResourceMode::Safe);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Physical page size. Default: A4.
    pub paper: PaperSize,

    /// Page border. Default: 3.7 % of the shorter page edge.
    pub margin: Margin,

    /// Extra width, in millimetres, removed from the layout box so wrapping
    /// happens slightly before the visual border. Default: 1.5.
    pub safety_buffer_mm: f32,

    /// Font size for prose sources, in points. Default: 10.5.
    pub prose_font_size: f32,

    /// Font size for code sources, in points. Default: 9.
    pub code_font_size: f32,

    /// Line height as a multiple of the prose font size. Default: 1.35.
    pub prose_line_height: f32,

    /// Line height as a multiple of the code font size. Default: 1.25.
    pub code_line_height: f32,

    /// Durability strategy. Default: [`ResourceMode::Safe`].
    pub mode: ResourceMode,

    /// Where artifacts land inside the archive. Default: [`OutputLayout::Mirror`].
    pub layout: OutputLayout,

    /// Archive base name (without extension). Default: `Convert_<unix-millis>`.
    pub archive_base_name: Option<String>,

    /// Fast mode only: refuse artifacts once the in-memory archive holds this
    /// many bytes. `None` means unbounded.
    pub fast_memory_budget: Option<u64>,

    /// TrueType/OpenType file drawn instead of the standard faces. Loaded
    /// when a batch starts or resumes; characters it lacks fall back to
    /// glyph bitmaps.
    #[serde(default)]
    pub custom_font: Option<PathBuf>,

    /// Progress events receiver. Not journaled.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            paper: PaperSize::A4,
            margin: Margin::default(),
            safety_buffer_mm: 1.5,
            prose_font_size: 10.5,
            code_font_size: 9.0,
            prose_line_height: 1.35,
            code_line_height: 1.25,
            mode: ResourceMode::default(),
            layout: OutputLayout::default(),
            archive_base_name: None,
            fast_memory_budget: None,
            custom_font: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("paper", &self.paper)
            .field("margin", &self.margin)
            .field("safety_buffer_mm", &self.safety_buffer_mm)
            .field("prose_font_size", &self.prose_font_size)
            .field("code_font_size", &self.code_font_size)
            .field("mode", &self.mode)
            .field("layout", &self.layout)
            .field("archive_base_name", &self.archive_base_name)
            .field("fast_memory_budget", &self.fast_memory_budget)
            .field("custom_font", &self.custom_font)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    /// Compute the page geometry for a source of the given style.
    pub fn geometry(&self, style: TextStyle) -> PageGeometry {
        let (w_mm, h_mm) = self.paper.dimensions_mm();
        let page_width = w_mm * PT_PER_MM;
        let page_height = h_mm * PT_PER_MM;
        let margin = self.margin.resolve_pt(w_mm, h_mm);
        let safety = self.safety_buffer_mm.max(0.0) * PT_PER_MM;

        let (font_size, factor) = match style {
            TextStyle::Prose => (self.prose_font_size, self.prose_line_height),
            TextStyle::Code => (self.code_font_size, self.code_line_height),
        };

        PageGeometry {
            page_width,
            page_height,
            margin,
            layout_width: page_width - 2.0 * margin - safety,
            usable_height: page_height - 2.0 * margin,
            font_size,
            line_height: font_size * factor,
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn paper(mut self, paper: PaperSize) -> Self {
        self.config.paper = paper;
        self
    }

    pub fn margin(mut self, margin: Margin) -> Self {
        self.config.margin = margin;
        self
    }

    pub fn safety_buffer_mm(mut self, mm: f32) -> Self {
        self.config.safety_buffer_mm = mm.max(0.0);
        self
    }

    pub fn prose_font_size(mut self, pt: f32) -> Self {
        self.config.prose_font_size = pt.clamp(4.0, 72.0);
        self
    }

    pub fn code_font_size(mut self, pt: f32) -> Self {
        self.config.code_font_size = pt.clamp(4.0, 72.0);
        self
    }

    pub fn prose_line_height(mut self, factor: f32) -> Self {
        self.config.prose_line_height = factor.clamp(1.0, 4.0);
        self
    }

    pub fn code_line_height(mut self, factor: f32) -> Self {
        self.config.code_line_height = factor.clamp(1.0, 4.0);
        self
    }

    pub fn mode(mut self, mode: ResourceMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn layout(mut self, layout: OutputLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn archive_base_name(mut self, name: impl Into<String>) -> Self {
        self.config.archive_base_name = Some(name.into());
        self
    }

    pub fn fast_memory_budget(mut self, bytes: u64) -> Self {
        self.config.fast_memory_budget = Some(bytes);
        self
    }

    pub fn custom_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.custom_font = Some(path.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating that both text styles leave a
    /// usable layout box on the page.
    pub fn build(self) -> Result<BatchConfig, BatchError> {
        let c = &self.config;
        if let PaperSize::Custom {
            width_mm,
            height_mm,
        } = c.paper
        {
            if !(width_mm > 0.0 && height_mm > 0.0) {
                return Err(BatchError::InvalidConfig(format!(
                    "paper must have positive dimensions, got {width_mm}×{height_mm} mm"
                )));
            }
        }
        for style in [TextStyle::Prose, TextStyle::Code] {
            let g = c.geometry(style);
            if g.layout_width < g.font_size {
                return Err(BatchError::InvalidConfig(format!(
                    "margins leave only {:.1}pt of line width for {style:?} text",
                    g.layout_width
                )));
            }
            if g.usable_height < g.line_height {
                return Err(BatchError::InvalidConfig(format!(
                    "margins leave no room for a single {style:?} line"
                )));
            }
        }
        if let Some(name) = &c.archive_base_name {
            if name.trim().is_empty() || name.contains('/') {
                return Err(BatchError::InvalidConfig(format!(
                    "archive base name '{name}' must be non-empty and contain no '/'"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Resolved page geometry for one text style, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub page_width: f32,
    pub page_height: f32,
    pub margin: f32,
    /// Maximum measured line width handed to the wrapper.
    pub layout_width: f32,
    /// Vertical space available for lines.
    pub usable_height: f32,
    pub font_size: f32,
    pub line_height: f32,
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Batch durability strategy.
///
/// | Mode | Throughput | Survives interruption |
/// |------|-----------|-----------------------|
/// | `Fast` | high: one archive built in memory | no |
/// | `Safe` | lower: every artifact hits the durable store | yes, via `resume_batch` |
///
/// Safe is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResourceMode {
    Fast,
    #[default]
    Safe,
}

/// How artifact paths are derived from a task's paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputLayout {
    /// `<destination_path>/<stem>.pdf`: the source tree is reproduced. (default)
    #[default]
    Mirror,
    /// `<base_path>/<stem>.pdf`: the tree under each input root is flattened.
    Flat,
}

/// Page margins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Margin {
    /// Percentage of the shorter page edge. Non-positive values fall back to 3.7.
    Percent(f32),
    /// Absolute millimetres. Non-positive values fall back to 3.7 % of the shorter edge.
    Millimetres(f32),
}

impl Default for Margin {
    fn default() -> Self {
        Margin::Percent(3.7)
    }
}

impl Margin {
    /// Margin in points for a page of the given millimetre dimensions.
    pub fn resolve_pt(&self, width_mm: f32, height_mm: f32) -> f32 {
        let short_edge = width_mm.min(height_mm);
        let mm = match *self {
            Margin::Percent(p) => {
                let p = if p > 0.0 { p } else { 3.7 };
                short_edge * p / 100.0
            }
            Margin::Millimetres(m) if m > 0.0 => m,
            Margin::Millimetres(_) => short_edge * 0.037,
        };
        mm * PT_PER_MM
    }
}

impl FromStr for Margin {
    type Err = String;

    /// Parse `"3.7%"` or `"12mm"` (a bare number is millimetres).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if let Some(p) = s.strip_suffix('%') {
            return p
                .trim()
                .parse()
                .map(Margin::Percent)
                .map_err(|_| format!("invalid margin percentage '{s}'"));
        }
        s.strip_suffix("mm")
            .unwrap_or(&s)
            .trim()
            .parse()
            .map(Margin::Millimetres)
            .map_err(|_| format!("invalid margin '{s}'"))
    }
}

/// Named paper sizes plus custom dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum PaperSize {
    A3,
    #[default]
    A4,
    A5,
    A6,
    B4,
    B5,
    Letter,
    Legal,
    Tabloid,
    Executive,
    HalfLetter,
    Hagaki,
    Custom { width_mm: f32, height_mm: f32 },
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (f32, f32) {
        match *self {
            Self::A3 => (297.0, 420.0),
            Self::A4 => (210.0, 297.0),
            Self::A5 => (148.0, 210.0),
            Self::A6 => (105.0, 148.0),
            Self::B4 => (250.0, 353.0),
            Self::B5 => (176.0, 250.0),
            Self::Letter => (216.0, 279.0),
            Self::Legal => (216.0, 356.0),
            Self::Tabloid => (279.0, 432.0),
            Self::Executive => (184.0, 267.0),
            Self::HalfLetter => (140.0, 216.0),
            Self::Hagaki => (100.0, 148.0),
            Self::Custom {
                width_mm,
                height_mm,
            } => (width_mm, height_mm),
        }
    }
}

impl FromStr for PaperSize {
    type Err = String;

    /// Parse a paper name (`a4`, `letter`, …) or `WIDTHxHEIGHT` in millimetres.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let named = match lower.as_str() {
            "a3" => Some(Self::A3),
            "a4" => Some(Self::A4),
            "a5" => Some(Self::A5),
            "a6" => Some(Self::A6),
            "b4" => Some(Self::B4),
            "b5" => Some(Self::B5),
            "letter" => Some(Self::Letter),
            "legal" => Some(Self::Legal),
            "tabloid" => Some(Self::Tabloid),
            "executive" => Some(Self::Executive),
            "half-letter" | "halfletter" => Some(Self::HalfLetter),
            "hagaki" => Some(Self::Hagaki),
            _ => None,
        };
        if let Some(size) = named {
            return Ok(size);
        }
        let (w, h) = lower
            .split_once('x')
            .ok_or_else(|| format!("unknown paper size '{s}'"))?;
        let width_mm: f32 = w.trim().parse().map_err(|_| format!("invalid width in '{s}'"))?;
        let height_mm: f32 = h.trim().parse().map_err(|_| format!("invalid height in '{s}'"))?;
        Ok(Self::Custom {
            width_mm,
            height_mm,
        })
    }
}
