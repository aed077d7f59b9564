//! Shared record types and their readers.
//!
//! Everything here is a plain value decoded straight from the bit stream:
//! rectangles, matrices, colour transforms, filters, blend modes and sound
//! playback info.

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;

type Result<T> = std::result::Result<T, ReaderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub fn to_argb(self) -> u32 {
        u32::from_be_bytes([self.a, self.r, self.g, self.b])
    }
}

/// Rectangle in twips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Rect {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

/// 2x3 affine matrix. `a`/`d` scale, `b`/`c` rotate-skew, translation in twips.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub tx: i32,
    pub ty: i32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0,
        ty: 0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn to_array(self) -> [f32; 6] {
        [
            self.a,
            self.b,
            self.c,
            self.d,
            self.tx as f32,
            self.ty as f32,
        ]
    }
}

/// Colour transform with multipliers in 8.8 fixed point (256 = 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorTransform {
    pub r_mult: i16,
    pub g_mult: i16,
    pub b_mult: i16,
    pub a_mult: i16,
    pub r_add: i16,
    pub g_add: i16,
    pub b_add: i16,
    pub a_add: i16,
}

impl Default for ColorTransform {
    fn default() -> Self {
        Self {
            r_mult: 256,
            g_mult: 256,
            b_mult: 256,
            a_mult: 256,
            r_add: 0,
            g_add: 0,
            b_add: 0,
            a_add: 0,
        }
    }
}

impl ColorTransform {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    /// Multipliers as floats followed by the additive terms.
    pub fn to_array(self) -> [f32; 8] {
        [
            f32::from(self.r_mult) / 256.0,
            f32::from(self.g_mult) / 256.0,
            f32::from(self.b_mult) / 256.0,
            f32::from(self.a_mult) / 256.0,
            f32::from(self.r_add),
            f32::from(self.g_add),
            f32::from(self.b_add),
            f32::from(self.a_add),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BlendMode {
    #[default]
    Normal,
    Layer,
    Multiply,
    Screen,
    Lighten,
    Darken,
    Difference,
    Add,
    Subtract,
    Invert,
    Alpha,
    Erase,
    Overlay,
    HardLight,
}

impl BlendMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            2 => Self::Layer,
            3 => Self::Multiply,
            4 => Self::Screen,
            5 => Self::Lighten,
            6 => Self::Darken,
            7 => Self::Difference,
            8 => Self::Add,
            9 => Self::Subtract,
            10 => Self::Invert,
            11 => Self::Alpha,
            12 => Self::Erase,
            13 => Self::Overlay,
            14 => Self::HardLight,
            _ => Self::Normal,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            Self::Normal => 1,
            Self::Layer => 2,
            Self::Multiply => 3,
            Self::Screen => 4,
            Self::Lighten => 5,
            Self::Darken => 6,
            Self::Difference => 7,
            Self::Add => 8,
            Self::Subtract => 9,
            Self::Invert => 10,
            Self::Alpha => 11,
            Self::Erase => 12,
            Self::Overlay => 13,
            Self::HardLight => 14,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShadowParams {
    pub blur_x: f32,
    pub blur_y: f32,
    pub angle: f32,
    pub distance: f32,
    pub strength: f32,
    pub inner: bool,
    pub knockout: bool,
    pub composite_source: bool,
    pub on_top: bool,
    pub passes: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Filter {
    DropShadow {
        color: Rgba,
        params: ShadowParams,
    },
    Blur {
        blur_x: f32,
        blur_y: f32,
        passes: u8,
    },
    Glow {
        color: Rgba,
        params: ShadowParams,
    },
    Bevel {
        shadow_color: Rgba,
        highlight_color: Rgba,
        params: ShadowParams,
    },
    GradientGlow {
        colors: Vec<Rgba>,
        ratios: Vec<u8>,
        params: ShadowParams,
    },
    Convolution {
        matrix_x: u8,
        matrix_y: u8,
        divisor: f32,
        bias: f32,
        matrix: Vec<f32>,
        default_color: Rgba,
        clamp: bool,
        preserve_alpha: bool,
    },
    ColorMatrix {
        matrix: [f32; 20],
    },
    GradientBevel {
        colors: Vec<Rgba>,
        ratios: Vec<u8>,
        params: ShadowParams,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SoundEnvelopePoint {
    /// Position in 44 kHz samples.
    pub position: u32,
    pub left_level: u16,
    pub right_level: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SoundInfo {
    pub sync_stop: bool,
    pub sync_no_multiple: bool,
    pub in_point: Option<u32>,
    pub out_point: Option<u32>,
    pub loop_count: Option<u16>,
    pub envelope: Option<Vec<SoundEnvelopePoint>>,
}

impl BitReader<'_> {
    pub fn read_rect(&mut self) -> Result<Rect> {
        self.align();
        let bits = self.read_ub(5)?;
        let rect = Rect {
            x_min: self.read_sb(bits)?,
            x_max: self.read_sb(bits)?,
            y_min: self.read_sb(bits)?,
            y_max: self.read_sb(bits)?,
        };
        self.align();
        Ok(rect)
    }

    pub fn read_rgb(&mut self) -> Result<Rgba> {
        Ok(Rgba {
            r: self.read_u8()?,
            g: self.read_u8()?,
            b: self.read_u8()?,
            a: 255,
        })
    }

    pub fn read_rgba(&mut self) -> Result<Rgba> {
        Ok(Rgba {
            r: self.read_u8()?,
            g: self.read_u8()?,
            b: self.read_u8()?,
            a: self.read_u8()?,
        })
    }

    pub fn read_matrix(&mut self) -> Result<Matrix> {
        self.align();
        let mut matrix = Matrix::IDENTITY;
        if self.read_bit()? {
            let bits = self.read_ub(5)?;
            matrix.a = self.read_fb(bits)?;
            matrix.d = self.read_fb(bits)?;
        }
        if self.read_bit()? {
            let bits = self.read_ub(5)?;
            matrix.b = self.read_fb(bits)?;
            matrix.c = self.read_fb(bits)?;
        }
        let bits = self.read_ub(5)?;
        matrix.tx = self.read_sb(bits)?;
        matrix.ty = self.read_sb(bits)?;
        self.align();
        Ok(matrix)
    }

    pub fn read_color_transform(&mut self, with_alpha: bool) -> Result<ColorTransform> {
        self.align();
        let has_add = self.read_bit()?;
        let has_mult = self.read_bit()?;
        let bits = self.read_ub(4)?;
        let mut cxform = ColorTransform::default();
        if has_mult {
            cxform.r_mult = self.read_sb(bits)? as i16;
            cxform.g_mult = self.read_sb(bits)? as i16;
            cxform.b_mult = self.read_sb(bits)? as i16;
            if with_alpha {
                cxform.a_mult = self.read_sb(bits)? as i16;
            }
        }
        if has_add {
            cxform.r_add = self.read_sb(bits)? as i16;
            cxform.g_add = self.read_sb(bits)? as i16;
            cxform.b_add = self.read_sb(bits)? as i16;
            if with_alpha {
                cxform.a_add = self.read_sb(bits)? as i16;
            }
        }
        self.align();
        Ok(cxform)
    }

    pub fn read_filters(&mut self) -> Result<Vec<Filter>> {
        let count = self.read_u8()?;
        let mut filters = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            filters.push(self.read_filter()?);
        }
        Ok(filters)
    }

    fn read_filter(&mut self) -> Result<Filter> {
        let offset = self.position();
        let id = self.read_u8()?;
        let filter = match id {
            0 => {
                let color = self.read_rgba()?;
                let blur_x = self.read_fixed()?;
                let blur_y = self.read_fixed()?;
                let angle = self.read_fixed()?;
                let distance = self.read_fixed()?;
                let strength = self.read_fixed8()?;
                let params = self.read_shadow_flags(blur_x, blur_y, angle, distance, strength, 5)?;
                Filter::DropShadow { color, params }
            }
            1 => {
                let blur_x = self.read_fixed()?;
                let blur_y = self.read_fixed()?;
                let passes = (self.read_u8()? >> 3) & 0x1F;
                Filter::Blur {
                    blur_x,
                    blur_y,
                    passes,
                }
            }
            2 => {
                let color = self.read_rgba()?;
                let blur_x = self.read_fixed()?;
                let blur_y = self.read_fixed()?;
                let strength = self.read_fixed8()?;
                let params = self.read_shadow_flags(blur_x, blur_y, 0.0, 0.0, strength, 5)?;
                Filter::Glow { color, params }
            }
            3 => {
                let shadow_color = self.read_rgba()?;
                let highlight_color = self.read_rgba()?;
                let blur_x = self.read_fixed()?;
                let blur_y = self.read_fixed()?;
                let angle = self.read_fixed()?;
                let distance = self.read_fixed()?;
                let strength = self.read_fixed8()?;
                let params = self.read_shadow_flags(blur_x, blur_y, angle, distance, strength, 4)?;
                Filter::Bevel {
                    shadow_color,
                    highlight_color,
                    params,
                }
            }
            4 | 7 => {
                let count = usize::from(self.read_u8()?);
                let mut colors = Vec::with_capacity(count);
                for _ in 0..count {
                    colors.push(self.read_rgba()?);
                }
                let ratios = self.read_bytes(count)?.to_vec();
                let blur_x = self.read_fixed()?;
                let blur_y = self.read_fixed()?;
                let angle = self.read_fixed()?;
                let distance = self.read_fixed()?;
                let strength = self.read_fixed8()?;
                let params = self.read_shadow_flags(blur_x, blur_y, angle, distance, strength, 4)?;
                if id == 4 {
                    Filter::GradientGlow {
                        colors,
                        ratios,
                        params,
                    }
                } else {
                    Filter::GradientBevel {
                        colors,
                        ratios,
                        params,
                    }
                }
            }
            5 => {
                let matrix_x = self.read_u8()?;
                let matrix_y = self.read_u8()?;
                let divisor = self.read_f32()?;
                let bias = self.read_f32()?;
                let cells = usize::from(matrix_x) * usize::from(matrix_y);
                let mut matrix = Vec::with_capacity(cells);
                for _ in 0..cells {
                    matrix.push(self.read_f32()?);
                }
                let default_color = self.read_rgba()?;
                let flags = self.read_u8()?;
                Filter::Convolution {
                    matrix_x,
                    matrix_y,
                    divisor,
                    bias,
                    matrix,
                    default_color,
                    clamp: flags & 0x02 != 0,
                    preserve_alpha: flags & 0x01 != 0,
                }
            }
            6 => {
                let mut matrix = [0.0; 20];
                for value in &mut matrix {
                    *value = self.read_f32()?;
                }
                Filter::ColorMatrix { matrix }
            }
            other => {
                return Err(ReaderError::InvalidValue {
                    what: "filter id",
                    value: u32::from(other),
                    offset,
                });
            }
        };
        Ok(filter)
    }

    /// Trailing flag byte shared by the shadow-style filters. `pass_bits` is
    /// 5 for drop shadow and glow, 4 when an on-top bit precedes the passes.
    fn read_shadow_flags(
        &mut self,
        blur_x: f32,
        blur_y: f32,
        angle: f32,
        distance: f32,
        strength: f32,
        pass_bits: u32,
    ) -> Result<ShadowParams> {
        let inner = self.read_bit()?;
        let knockout = self.read_bit()?;
        let composite_source = self.read_bit()?;
        let on_top = if pass_bits == 4 {
            self.read_bit()?
        } else {
            false
        };
        let passes = self.read_ub(pass_bits)? as u8;
        self.align();
        Ok(ShadowParams {
            blur_x,
            blur_y,
            angle,
            distance,
            strength,
            inner,
            knockout,
            composite_source,
            on_top,
            passes,
        })
    }

    pub fn read_sound_info(&mut self) -> Result<SoundInfo> {
        let flags = self.read_u8()?;
        let sync_stop = flags & 0x20 != 0;
        let sync_no_multiple = flags & 0x10 != 0;
        let has_envelope = flags & 0x08 != 0;
        let has_loops = flags & 0x04 != 0;
        let has_out_point = flags & 0x02 != 0;
        let has_in_point = flags & 0x01 != 0;

        let in_point = if has_in_point {
            Some(self.read_u32()?)
        } else {
            None
        };
        let out_point = if has_out_point {
            Some(self.read_u32()?)
        } else {
            None
        };
        let loop_count = if has_loops {
            Some(self.read_u16()?)
        } else {
            None
        };
        let envelope = if has_envelope {
            let count = self.read_u8()?;
            let mut points = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                points.push(SoundEnvelopePoint {
                    position: self.read_u32()?,
                    left_level: self.read_u16()?,
                    right_level: self.read_u16()?,
                });
            }
            Some(points)
        } else {
            None
        };

        Ok(SoundInfo {
            sync_stop,
            sync_no_multiple,
            in_point,
            out_point,
            loop_count,
            envelope,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_rect() {
        // nbits = 2: 00010 | 01 11 00 01 | pad
        // x_min = 1, x_max = -1, y_min = 0, y_max = 1
        let data = [0b0001_0011, 0b1000_1000];
        let rect = BitReader::new(&data).read_rect().unwrap();
        assert_eq!(
            rect,
            Rect {
                x_min: 1,
                x_max: -1,
                y_min: 0,
                y_max: 1
            }
        );
    }

    #[test]
    fn test_identity_matrix_is_one_byte() {
        let data = [0x00, 0xAA];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_matrix().unwrap().is_identity());
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
    }

    #[test]
    fn test_matrix_with_translation() {
        // has_scale 0, has_rotate 0, nbits 00110 (6), tx = 000101 (5), ty = 111111 (-1)
        // 0 0 00110 0 | 00101 111 | 111 + pad
        let data = [0b0000_1100, 0b0010_1111, 0b1110_0000];
        let matrix = BitReader::new(&data).read_matrix().unwrap();
        assert_eq!(matrix.tx, 5);
        assert_eq!(matrix.ty, -1);
        assert_eq!(matrix.a, 1.0);
    }

    #[test]
    fn test_sound_info_flags() {
        let data = [0x24, 0x03, 0x00];
        let info = BitReader::new(&data).read_sound_info().unwrap();
        assert!(info.sync_stop);
        assert_eq!(info.loop_count, Some(3));
        assert_eq!(info.in_point, None);
    }

    #[test]
    fn test_unknown_filter_is_rejected() {
        let data = [0x01, 0x09];
        assert!(BitReader::new(&data).read_filters().is_err());
    }
}
