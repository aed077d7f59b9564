//! Shape, morph shape and glyph outline decoding.
//!
//! Edge records are turned into per-style segment lists: an edge contributes
//! to its fill-1 style as drawn, to its fill-0 style reversed and to its line
//! style as drawn. Coordinates are absolute twips.

use std::collections::HashMap;

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;
use crate::reader::{Matrix, Rect, Rgba};

type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradientRecord {
    pub ratio: u8,
    pub color: Rgba,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gradient {
    pub matrix: Matrix,
    pub spread: u8,
    pub interpolation: u8,
    pub records: Vec<GradientRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FillStyle {
    Solid(Rgba),
    LinearGradient(Gradient),
    RadialGradient(Gradient),
    FocalGradient { gradient: Gradient, focal_point: f32 },
    Bitmap {
        id: u16,
        matrix: Matrix,
        repeating: bool,
        smoothed: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CapStyle {
    Round,
    None,
    Square,
}

impl CapStyle {
    fn from_bits(bits: u32) -> Self {
        match bits {
            1 => Self::None,
            2 => Self::Square,
            _ => Self::Round,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum JoinStyle {
    Round,
    Bevel,
    Miter(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineStyle {
    /// Width in twips.
    pub width: u16,
    pub color: Rgba,
    pub start_cap: CapStyle,
    pub end_cap: CapStyle,
    pub join: JoinStyle,
    pub fill: Option<FillStyle>,
    pub no_h_scale: bool,
    pub no_v_scale: bool,
    pub pixel_hinting: bool,
    pub no_close: bool,
}

impl LineStyle {
    fn simple(width: u16, color: Rgba) -> Self {
        Self {
            width,
            color,
            start_cap: CapStyle::Round,
            end_cap: CapStyle::Round,
            join: JoinStyle::Round,
            fill: None,
            no_h_scale: false,
            no_v_scale: false,
            pixel_hinting: false,
            no_close: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PathSegment {
    Line { from: Point, to: Point },
    Curve { from: Point, control: Point, to: Point },
}

impl PathSegment {
    fn reversed(self) -> Self {
        match self {
            Self::Line { from, to } => Self::Line { from: to, to: from },
            Self::Curve { from, control, to } => Self::Curve {
                from: to,
                control,
                to: from,
            },
        }
    }
}

/// Which style a path is painted with; indices are zero-based into the
/// definition's style tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PathStyle {
    Fill(u32),
    Line(u32),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapePath {
    pub style: PathStyle,
    pub segments: Vec<PathSegment>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ShapeDefinition {
    pub id: u16,
    pub version: u8,
    pub bounds: Rect,
    pub edge_bounds: Option<Rect>,
    pub uses_fill_winding_rule: bool,
    pub uses_non_scaling_strokes: bool,
    pub uses_scaling_strokes: bool,
    pub fill_styles: Vec<FillStyle>,
    pub line_styles: Vec<LineStyle>,
    pub paths: Vec<ShapePath>,
    pub scaling_grid: Option<Rect>,
}

impl ShapeDefinition {
    /// Bitmap ids referenced by fill styles.
    pub fn bitmap_dependencies(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self
            .fill_styles
            .iter()
            .chain(self.line_styles.iter().filter_map(|l| l.fill.as_ref()))
            .filter_map(|fill| match fill {
                FillStyle::Bitmap { id, .. } => Some(*id),
                _ => None,
            })
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorphFillStyle {
    pub start: FillStyle,
    pub end: FillStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorphLineStyle {
    pub start: LineStyle,
    pub end: LineStyle,
}

/// Start and end outlines share style indices and segment structure, so
/// paths can be interpolated pairwise by ratio.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MorphShapeDefinition {
    pub id: u16,
    pub version: u8,
    pub start_bounds: Rect,
    pub end_bounds: Rect,
    pub start_edge_bounds: Option<Rect>,
    pub end_edge_bounds: Option<Rect>,
    pub fill_styles: Vec<MorphFillStyle>,
    pub line_styles: Vec<MorphLineStyle>,
    pub start_paths: Vec<ShapePath>,
    pub end_paths: Vec<ShapePath>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StyleChange {
    pub move_to: Option<Point>,
    pub fill0: Option<u32>,
    pub fill1: Option<u32>,
    pub line: Option<u32>,
    /// Replacement style tables, already decoded.
    pub new_styles: Option<(Vec<FillStyle>, Vec<LineStyle>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ShapeRecord {
    StyleChange(StyleChange),
    StraightEdge { dx: i32, dy: i32 },
    CurvedEdge {
        control_dx: i32,
        control_dy: i32,
        anchor_dx: i32,
        anchor_dy: i32,
    },
}

impl ShapeRecord {
    fn is_edge(&self) -> bool {
        !matches!(self, Self::StyleChange(_))
    }
}

pub fn decode_shape(
    r: &mut BitReader<'_>,
    version: u8,
    scaling_grid: Option<Rect>,
) -> Result<ShapeDefinition> {
    let id = r.read_u16()?;
    let bounds = r.read_rect()?;
    let mut edge_bounds = None;
    let mut flags = 0u8;
    if version >= 4 {
        edge_bounds = Some(r.read_rect()?);
        flags = r.read_u8()?;
    }
    let mut fill_styles = read_fill_styles(r, version)?;
    let mut line_styles = read_line_styles(r, version)?;
    let records = read_shape_records(r, version)?;
    let paths = build_paths(&records, &mut fill_styles, &mut line_styles);

    Ok(ShapeDefinition {
        id,
        version,
        bounds,
        edge_bounds,
        uses_fill_winding_rule: flags & 0x04 != 0,
        uses_non_scaling_strokes: flags & 0x02 != 0,
        uses_scaling_strokes: flags & 0x01 != 0,
        fill_styles,
        line_styles,
        paths,
        scaling_grid,
    })
}

/// Glyph outline: a style-less shape whose single fill is style 0.
pub fn decode_glyph(r: &mut BitReader<'_>) -> Result<Vec<ShapePath>> {
    let records = read_shape_records(r, 1)?;
    Ok(build_paths(&records, &mut Vec::new(), &mut Vec::new()))
}

pub fn decode_morph_shape(r: &mut BitReader<'_>, version: u8) -> Result<MorphShapeDefinition> {
    let id = r.read_u16()?;
    let start_bounds = r.read_rect()?;
    let end_bounds = r.read_rect()?;
    let (start_edge_bounds, end_edge_bounds) = if version >= 2 {
        let start = r.read_rect()?;
        let end = r.read_rect()?;
        // reserved bits + non-scaling/scaling stroke flags
        r.read_u8()?;
        (Some(start), Some(end))
    } else {
        (None, None)
    };
    let end_edges_offset = r.read_u32()? as usize;
    let end_edges_start = r.position() + end_edges_offset;

    let fill_styles = read_morph_fill_styles(r)?;
    let line_styles = read_morph_line_styles(r, version)?;
    let start_records = read_shape_records(r, 1)?;

    let mut end_reader = r.substream(end_edges_start.min(r.end()), r.end())?;
    let end_records = read_shape_records(&mut end_reader, 1)?;

    let (start_paths, end_paths) = build_morph_paths(&start_records, &end_records);

    Ok(MorphShapeDefinition {
        id,
        version,
        start_bounds,
        end_bounds,
        start_edge_bounds,
        end_edge_bounds,
        fill_styles,
        line_styles,
        start_paths,
        end_paths,
    })
}

fn read_style_count(r: &mut BitReader<'_>, extended: bool) -> Result<usize> {
    let count = r.read_u8()?;
    if count == 0xFF && extended {
        Ok(usize::from(r.read_u16()?))
    } else {
        Ok(usize::from(count))
    }
}

fn read_color(r: &mut BitReader<'_>, version: u8) -> Result<Rgba> {
    if version >= 3 {
        r.read_rgba()
    } else {
        r.read_rgb()
    }
}

fn read_fill_styles(r: &mut BitReader<'_>, version: u8) -> Result<Vec<FillStyle>> {
    let count = read_style_count(r, version >= 2)?;
    let mut styles = Vec::with_capacity(count);
    for _ in 0..count {
        styles.push(read_fill_style(r, version)?);
    }
    Ok(styles)
}

fn read_fill_style(r: &mut BitReader<'_>, version: u8) -> Result<FillStyle> {
    let offset = r.position();
    let kind = r.read_u8()?;
    let style = match kind {
        0x00 => FillStyle::Solid(read_color(r, version)?),
        0x10 => FillStyle::LinearGradient(read_gradient(r, version)?),
        0x12 => FillStyle::RadialGradient(read_gradient(r, version)?),
        0x13 => {
            let gradient = read_gradient(r, version)?;
            let focal_point = r.read_fixed8()?;
            FillStyle::FocalGradient {
                gradient,
                focal_point,
            }
        }
        0x40..=0x43 => FillStyle::Bitmap {
            id: r.read_u16()?,
            matrix: r.read_matrix()?,
            repeating: kind & 0x01 == 0,
            smoothed: kind & 0x02 == 0,
        },
        other => {
            return Err(ReaderError::InvalidValue {
                what: "fill style type",
                value: u32::from(other),
                offset,
            });
        }
    };
    Ok(style)
}

fn read_gradient(r: &mut BitReader<'_>, version: u8) -> Result<Gradient> {
    let matrix = r.read_matrix()?;
    let spread = r.read_ub(2)? as u8;
    let interpolation = r.read_ub(2)? as u8;
    let count = r.read_ub(4)?;
    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        records.push(GradientRecord {
            ratio: r.read_u8()?,
            color: read_color(r, version)?,
        });
    }
    Ok(Gradient {
        matrix,
        spread,
        interpolation,
        records,
    })
}

fn read_line_styles(r: &mut BitReader<'_>, version: u8) -> Result<Vec<LineStyle>> {
    let count = read_style_count(r, true)?;
    let mut styles = Vec::with_capacity(count);
    for _ in 0..count {
        if version >= 4 {
            styles.push(read_line_style2(r)?);
        } else {
            let width = r.read_u16()?;
            let color = read_color(r, version)?;
            styles.push(LineStyle::simple(width, color));
        }
    }
    Ok(styles)
}

/// Flag block shared by `LINESTYLE2` and `MORPHLINESTYLE2`: caps, join,
/// scaling flags and the optional miter limit.
struct LineFlags {
    start_cap: CapStyle,
    end_cap: CapStyle,
    join_bits: u32,
    has_fill: bool,
    no_h_scale: bool,
    no_v_scale: bool,
    pixel_hinting: bool,
    no_close: bool,
}

fn read_line_flags(r: &mut BitReader<'_>) -> Result<LineFlags> {
    let start_cap = CapStyle::from_bits(r.read_ub(2)?);
    let join_bits = r.read_ub(2)?;
    let has_fill = r.read_bit()?;
    let no_h_scale = r.read_bit()?;
    let no_v_scale = r.read_bit()?;
    let pixel_hinting = r.read_bit()?;
    r.read_ub(5)?;
    let no_close = r.read_bit()?;
    let end_cap = CapStyle::from_bits(r.read_ub(2)?);
    Ok(LineFlags {
        start_cap,
        end_cap,
        join_bits,
        has_fill,
        no_h_scale,
        no_v_scale,
        pixel_hinting,
        no_close,
    })
}

fn read_join(r: &mut BitReader<'_>, join_bits: u32) -> Result<JoinStyle> {
    Ok(match join_bits {
        1 => JoinStyle::Bevel,
        2 => JoinStyle::Miter(r.read_fixed8()?),
        _ => JoinStyle::Round,
    })
}

fn read_line_style2(r: &mut BitReader<'_>) -> Result<LineStyle> {
    let width = r.read_u16()?;
    let flags = read_line_flags(r)?;
    let join = read_join(r, flags.join_bits)?;
    let (color, fill) = if flags.has_fill {
        (Rgba::default(), Some(read_fill_style(r, 4)?))
    } else {
        (r.read_rgba()?, None)
    };
    Ok(LineStyle {
        width,
        color,
        start_cap: flags.start_cap,
        end_cap: flags.end_cap,
        join,
        fill,
        no_h_scale: flags.no_h_scale,
        no_v_scale: flags.no_v_scale,
        pixel_hinting: flags.pixel_hinting,
        no_close: flags.no_close,
    })
}

fn read_morph_fill_styles(r: &mut BitReader<'_>) -> Result<Vec<MorphFillStyle>> {
    let count = read_style_count(r, true)?;
    let mut styles = Vec::with_capacity(count);
    for _ in 0..count {
        styles.push(read_morph_fill_style(r)?);
    }
    Ok(styles)
}

fn read_morph_fill_style(r: &mut BitReader<'_>) -> Result<MorphFillStyle> {
    let offset = r.position();
    let kind = r.read_u8()?;
    let style = match kind {
        0x00 => MorphFillStyle {
            start: FillStyle::Solid(r.read_rgba()?),
            end: FillStyle::Solid(r.read_rgba()?),
        },
        0x10 | 0x12 | 0x13 => {
            let start_matrix = r.read_matrix()?;
            let end_matrix = r.read_matrix()?;
            let count = r.read_u8()?;
            let mut start_records = Vec::with_capacity(usize::from(count));
            let mut end_records = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                start_records.push(GradientRecord {
                    ratio: r.read_u8()?,
                    color: r.read_rgba()?,
                });
                end_records.push(GradientRecord {
                    ratio: r.read_u8()?,
                    color: r.read_rgba()?,
                });
            }
            let gradient = |matrix, records| Gradient {
                matrix,
                spread: 0,
                interpolation: 0,
                records,
            };
            let start = gradient(start_matrix, start_records);
            let end = gradient(end_matrix, end_records);
            if kind == 0x10 {
                MorphFillStyle {
                    start: FillStyle::LinearGradient(start),
                    end: FillStyle::LinearGradient(end),
                }
            } else {
                MorphFillStyle {
                    start: FillStyle::RadialGradient(start),
                    end: FillStyle::RadialGradient(end),
                }
            }
        }
        0x40..=0x43 => {
            let id = r.read_u16()?;
            let start_matrix = r.read_matrix()?;
            let end_matrix = r.read_matrix()?;
            let bitmap = |matrix| FillStyle::Bitmap {
                id,
                matrix,
                repeating: kind & 0x01 == 0,
                smoothed: kind & 0x02 == 0,
            };
            MorphFillStyle {
                start: bitmap(start_matrix),
                end: bitmap(end_matrix),
            }
        }
        other => {
            return Err(ReaderError::InvalidValue {
                what: "morph fill style type",
                value: u32::from(other),
                offset,
            });
        }
    };
    Ok(style)
}

fn read_morph_line_styles(r: &mut BitReader<'_>, version: u8) -> Result<Vec<MorphLineStyle>> {
    let count = read_style_count(r, true)?;
    let mut styles = Vec::with_capacity(count);
    for _ in 0..count {
        let start_width = r.read_u16()?;
        let end_width = r.read_u16()?;
        if version < 2 {
            let start_color = r.read_rgba()?;
            let end_color = r.read_rgba()?;
            styles.push(MorphLineStyle {
                start: LineStyle::simple(start_width, start_color),
                end: LineStyle::simple(end_width, end_color),
            });
            continue;
        }
        let flags = read_line_flags(r)?;
        let join = read_join(r, flags.join_bits)?;
        let (start_color, end_color, fills) = if flags.has_fill {
            let fill = read_morph_fill_style(r)?;
            (Rgba::default(), Rgba::default(), Some(fill))
        } else {
            (r.read_rgba()?, r.read_rgba()?, None)
        };
        let style = |width, color, fill| LineStyle {
            width,
            color,
            start_cap: flags.start_cap,
            end_cap: flags.end_cap,
            join,
            fill,
            no_h_scale: flags.no_h_scale,
            no_v_scale: flags.no_v_scale,
            pixel_hinting: flags.pixel_hinting,
            no_close: flags.no_close,
        };
        let (start_fill, end_fill) = match fills {
            Some(MorphFillStyle { start, end }) => (Some(start), Some(end)),
            None => (None, None),
        };
        styles.push(MorphLineStyle {
            start: style(start_width, start_color, start_fill),
            end: style(end_width, end_color, end_fill),
        });
    }
    Ok(styles)
}

/// Read `SHAPE`-style records: fill/line index widths followed by records up
/// to the end-of-shape marker. New style tables are only honoured from
/// version 2 on.
pub(crate) fn read_shape_records(r: &mut BitReader<'_>, version: u8) -> Result<Vec<ShapeRecord>> {
    r.align();
    let mut fill_bits = r.read_ub(4)?;
    let mut line_bits = r.read_ub(4)?;
    let mut records = Vec::new();

    loop {
        let is_edge = r.read_bit()?;
        if is_edge {
            let straight = r.read_bit()?;
            let bits = r.read_ub(4)? + 2;
            if straight {
                let general = r.read_bit()?;
                let (dx, dy) = if general {
                    (r.read_sb(bits)?, r.read_sb(bits)?)
                } else if r.read_bit()? {
                    (0, r.read_sb(bits)?)
                } else {
                    (r.read_sb(bits)?, 0)
                };
                records.push(ShapeRecord::StraightEdge { dx, dy });
            } else {
                records.push(ShapeRecord::CurvedEdge {
                    control_dx: r.read_sb(bits)?,
                    control_dy: r.read_sb(bits)?,
                    anchor_dx: r.read_sb(bits)?,
                    anchor_dy: r.read_sb(bits)?,
                });
            }
            continue;
        }

        let flags = r.read_ub(5)?;
        if flags == 0 {
            break;
        }
        let has_new_styles = flags & 0x10 != 0;
        let has_line = flags & 0x08 != 0;
        let has_fill1 = flags & 0x04 != 0;
        let has_fill0 = flags & 0x02 != 0;
        let has_move = flags & 0x01 != 0;

        let move_to = if has_move {
            let bits = r.read_ub(5)?;
            Some(Point {
                x: r.read_sb(bits)?,
                y: r.read_sb(bits)?,
            })
        } else {
            None
        };
        let fill0 = if has_fill0 {
            Some(r.read_ub(fill_bits)?)
        } else {
            None
        };
        let fill1 = if has_fill1 {
            Some(r.read_ub(fill_bits)?)
        } else {
            None
        };
        let line = if has_line {
            Some(r.read_ub(line_bits)?)
        } else {
            None
        };
        let new_styles = if has_new_styles && version >= 2 {
            let fills = read_fill_styles(r, version)?;
            let lines = read_line_styles(r, version)?;
            fill_bits = r.read_ub(4)?;
            line_bits = r.read_ub(4)?;
            Some((fills, lines))
        } else {
            None
        };
        records.push(ShapeRecord::StyleChange(StyleChange {
            move_to,
            fill0,
            fill1,
            line,
            new_styles,
        }));
    }
    r.align();
    Ok(records)
}

/// Accumulates segments per style in first-use order.
#[derive(Default)]
struct PathSet {
    paths: Vec<ShapePath>,
    index: HashMap<PathStyle, usize>,
}

impl PathSet {
    fn push(&mut self, style: PathStyle, segment: PathSegment) {
        let slot = *self.index.entry(style).or_insert_with(|| {
            self.paths.push(ShapePath {
                style,
                segments: Vec::new(),
            });
            self.paths.len() - 1
        });
        self.paths[slot].segments.push(segment);
    }

    fn push_edge(&mut self, pen: &Pen, segment: PathSegment) {
        if let Some(fill) = pen.fill1 {
            self.push(PathStyle::Fill(fill), segment);
        }
        if let Some(fill) = pen.fill0 {
            self.push(PathStyle::Fill(fill), segment.reversed());
        }
        if let Some(line) = pen.line {
            self.push(PathStyle::Line(line), segment);
        }
    }
}

/// Drawing state while walking records.
#[derive(Default)]
struct Pen {
    position: Point,
    fill0: Option<u32>,
    fill1: Option<u32>,
    line: Option<u32>,
    fill_base: u32,
    line_base: u32,
}

impl Pen {
    /// Apply a style change; new style tables are appended to `fills` and
    /// `lines` and later indices are rebased onto them.
    fn apply(&mut self, change: &StyleChange, fills: &mut Vec<FillStyle>, lines: &mut Vec<LineStyle>) {
        if let Some((new_fills, new_lines)) = &change.new_styles {
            self.fill_base = fills.len() as u32;
            self.line_base = lines.len() as u32;
            fills.extend(new_fills.iter().cloned());
            lines.extend(new_lines.iter().cloned());
            self.fill0 = None;
            self.fill1 = None;
            self.line = None;
        }
        if let Some(to) = change.move_to {
            self.position = to;
        }
        let rebase = |index: u32, base: u32| (index != 0).then(|| base + index - 1);
        if let Some(fill0) = change.fill0 {
            self.fill0 = rebase(fill0, self.fill_base);
        }
        if let Some(fill1) = change.fill1 {
            self.fill1 = rebase(fill1, self.fill_base);
        }
        if let Some(line) = change.line {
            self.line = rebase(line, self.line_base);
        }
    }

    fn advance(&mut self, record: &ShapeRecord) -> Option<PathSegment> {
        let from = self.position;
        match *record {
            ShapeRecord::StraightEdge { dx, dy } => {
                let to = Point {
                    x: from.x + dx,
                    y: from.y + dy,
                };
                self.position = to;
                Some(PathSegment::Line { from, to })
            }
            ShapeRecord::CurvedEdge {
                control_dx,
                control_dy,
                anchor_dx,
                anchor_dy,
            } => {
                let control = Point {
                    x: from.x + control_dx,
                    y: from.y + control_dy,
                };
                let to = Point {
                    x: control.x + anchor_dx,
                    y: control.y + anchor_dy,
                };
                self.position = to;
                Some(PathSegment::Curve { from, control, to })
            }
            ShapeRecord::StyleChange(_) => None,
        }
    }
}

fn build_paths(
    records: &[ShapeRecord],
    fills: &mut Vec<FillStyle>,
    lines: &mut Vec<LineStyle>,
) -> Vec<ShapePath> {
    let mut set = PathSet::default();
    let mut pen = Pen::default();
    for record in records {
        match record {
            ShapeRecord::StyleChange(change) => pen.apply(change, fills, lines),
            edge => {
                if let Some(segment) = pen.advance(edge) {
                    set.push_edge(&pen, segment);
                }
            }
        }
    }
    set.paths
}

/// Straight segments are promoted to curves when their counterpart is
/// curved, so both outlines keep the same segment kinds.
fn as_curve(segment: PathSegment) -> PathSegment {
    match segment {
        PathSegment::Line { from, to } => PathSegment::Curve {
            from,
            control: Point {
                x: (from.x + to.x) / 2,
                y: (from.y + to.y) / 2,
            },
            to,
        },
        curve => curve,
    }
}

/// Walk start and end records in lockstep. Styles always come from the
/// start records; the end records only contribute geometry.
fn build_morph_paths(
    start: &[ShapeRecord],
    end: &[ShapeRecord],
) -> (Vec<ShapePath>, Vec<ShapePath>) {
    let mut start_set = PathSet::default();
    let mut end_set = PathSet::default();
    let mut start_pen = Pen::default();
    let mut end_pen = Pen::default();
    let mut end_records = end.iter().peekable();
    // Morph shapes have no new-style records; these stay empty.
    let mut no_fills = Vec::new();
    let mut no_lines = Vec::new();

    for record in start {
        match record {
            ShapeRecord::StyleChange(change) => {
                start_pen.apply(change, &mut no_fills, &mut no_lines);
                if change.move_to.is_some() {
                    if let Some(ShapeRecord::StyleChange(end_change)) = end_records.peek() {
                        if let Some(to) = end_change.move_to {
                            end_pen.position = to;
                        }
                        end_records.next();
                    }
                }
            }
            edge => {
                let Some(start_segment) = start_pen.advance(edge) else {
                    continue;
                };
                while let Some(ShapeRecord::StyleChange(end_change)) = end_records.peek() {
                    if let Some(to) = end_change.move_to {
                        end_pen.position = to;
                    }
                    end_records.next();
                }
                let end_segment = match end_records.next() {
                    Some(end_edge) if end_edge.is_edge() => end_pen.advance(end_edge),
                    _ => None,
                };
                let Some(end_segment) = end_segment else {
                    tracing::warn!("morph shape end outline has fewer edges than start outline");
                    break;
                };
                let (start_segment, end_segment) = match (start_segment, end_segment) {
                    (PathSegment::Line { .. }, PathSegment::Line { .. }) => (start_segment, end_segment),
                    (s, e) => (as_curve(s), as_curve(e)),
                };
                start_set.push_edge(&start_pen, start_segment);
                end_set.push_edge(&start_pen, end_segment);
            }
        }
    }
    (start_set.paths, end_set.paths)
}
