//! Tag codes and the unparsed tag/byte-span handles produced by the scanner.

use serde::Serialize;

use crate::bit_reader::BitReader;
use crate::error::ReaderError;

/// `(offset, length)` into the uncompressed file buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ByteSpan {
    pub offset: u32,
    pub length: u32,
}

impl ByteSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset: offset as u32,
            length: length as u32,
        }
    }

    pub fn start(&self) -> usize {
        self.offset as usize
    }

    pub fn end(&self) -> usize {
        self.offset as usize + self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The bytes this span covers, or `None` when it runs past `data`.
    pub fn slice<'a>(&self, data: &'a [u8]) -> Option<&'a [u8]> {
        data.get(self.start()..self.end())
    }
}

/// A tag whose body has been located but not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UnparsedTag {
    pub code: u16,
    /// Offset of the tag body (after the header).
    pub byte_offset: u32,
    pub byte_length: u32,
}

impl UnparsedTag {
    pub fn tag_code(&self) -> TagCode {
        TagCode::from_u16(self.code)
    }

    pub fn span(&self) -> ByteSpan {
        ByteSpan {
            offset: self.byte_offset,
            length: self.byte_length,
        }
    }

    pub fn end(&self) -> usize {
        self.byte_offset as usize + self.byte_length as usize
    }

    /// Reader over exactly this tag's body.
    pub fn reader<'a>(&self, data: &'a [u8]) -> BitReader<'a> {
        BitReader::with_range(data, self.byte_offset as usize, self.end())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub code: u16,
    pub length: u32,
}

impl BitReader<'_> {
    /// Top 10 bits are the code, bottom 6 the length; `0x3F` escapes to a
    /// following 32-bit length.
    pub fn read_tag_header(&mut self) -> Result<TagHeader, ReaderError> {
        let code_and_length = self.read_u16()?;
        let code = code_and_length >> 6;
        let short_length = u32::from(code_and_length & 0x3F);
        let length = if short_length == 0x3F {
            self.read_u32()?
        } else {
            short_length
        };
        Ok(TagHeader { code, length })
    }
}

macro_rules! tag_codes {
    ($($name:ident = $value:literal,)*) => {
        /// The fixed tag code table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum TagCode {
            $($name,)*
            Unknown(u16),
        }

        impl TagCode {
            pub fn from_u16(code: u16) -> Self {
                match code {
                    $($value => Self::$name,)*
                    other => Self::Unknown(other),
                }
            }

            pub fn to_u16(self) -> u16 {
                match self {
                    $(Self::$name => $value,)*
                    Self::Unknown(other) => other,
                }
            }
        }
    };
}

tag_codes! {
    End = 0,
    ShowFrame = 1,
    DefineShape = 2,
    PlaceObject = 4,
    RemoveObject = 5,
    DefineBits = 6,
    DefineButton = 7,
    JpegTables = 8,
    SetBackgroundColor = 9,
    DefineFont = 10,
    DefineText = 11,
    DoAction = 12,
    DefineFontInfo = 13,
    DefineSound = 14,
    StartSound = 15,
    DefineButtonSound = 17,
    SoundStreamHead = 18,
    SoundStreamBlock = 19,
    DefineBitsLossless = 20,
    DefineBitsJpeg2 = 21,
    DefineShape2 = 22,
    DefineButtonCxform = 23,
    Protect = 24,
    PlaceObject2 = 26,
    RemoveObject2 = 28,
    DefineShape3 = 32,
    DefineText2 = 33,
    DefineButton2 = 34,
    DefineBitsJpeg3 = 35,
    DefineBitsLossless2 = 36,
    DefineEditText = 37,
    DefineSprite = 39,
    ProductInfo = 41,
    FrameLabel = 43,
    SoundStreamHead2 = 45,
    DefineMorphShape = 46,
    DefineFont2 = 48,
    ExportAssets = 56,
    ImportAssets = 57,
    EnableDebugger = 58,
    DoInitAction = 59,
    DefineVideoStream = 60,
    VideoFrame = 61,
    DefineFontInfo2 = 62,
    DebugId = 63,
    EnableDebugger2 = 64,
    ScriptLimits = 65,
    SetTabIndex = 66,
    FileAttributes = 69,
    PlaceObject3 = 70,
    ImportAssets2 = 71,
    DoAbcDefine = 72,
    DefineFontAlignZones = 73,
    CsmTextSettings = 74,
    DefineFont3 = 75,
    SymbolClass = 76,
    Metadata = 77,
    DefineScalingGrid = 78,
    DoAbc = 82,
    DefineShape4 = 83,
    DefineMorphShape2 = 84,
    DefineSceneAndFrameLabelData = 86,
    DefineBinaryData = 87,
    DefineFontName = 88,
    StartSound2 = 89,
    DefineBitsJpeg4 = 90,
    DefineFont4 = 91,
}

/// The decoder family responsible for a definition tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DefinitionKind {
    /// Shape version 1-4.
    Shape(u8),
    /// Morph shape version 1-2.
    MorphShape(u8),
    /// Font version 1-4.
    Font(u8),
    /// Static text version 1-2.
    Label(u8),
    EditText,
    /// Button version 1-2.
    Button(u8),
    Sound,
    /// JPEG-family bitmap version 1-4.
    Jpeg(u8),
    /// Lossless bitmap version 1-2.
    Lossless(u8),
    Sprite,
    Video,
    Binary,
}

impl DefinitionKind {
    /// Images, sounds and fonts are decoded while scanning.
    pub fn is_eager(self) -> bool {
        matches!(
            self,
            Self::Font(_) | Self::Sound | Self::Jpeg(_) | Self::Lossless(_)
        )
    }
}

/// Tags that modify an already defined id instead of defining one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AuxiliaryKind {
    FontInfo(u8),
    ButtonSound,
    ButtonCxform,
    ScalingGrid,
    VideoFrame,
    FontAlignZones,
    CsmTextSettings,
    FontName,
}

/// How the scanner treats a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Definition(DefinitionKind),
    Auxiliary(AuxiliaryKind),
    /// Display-list and sound directives, buffered per frame.
    Control,
    /// Frame structure, labels, scripts, exports and root metadata.
    Structural,
    Unknown,
}

impl TagCode {
    pub fn class(self) -> TagClass {
        use DefinitionKind as D;
        match self {
            Self::DefineShape => TagClass::Definition(D::Shape(1)),
            Self::DefineShape2 => TagClass::Definition(D::Shape(2)),
            Self::DefineShape3 => TagClass::Definition(D::Shape(3)),
            Self::DefineShape4 => TagClass::Definition(D::Shape(4)),
            Self::DefineMorphShape => TagClass::Definition(D::MorphShape(1)),
            Self::DefineMorphShape2 => TagClass::Definition(D::MorphShape(2)),
            Self::DefineFont => TagClass::Definition(D::Font(1)),
            Self::DefineFont2 => TagClass::Definition(D::Font(2)),
            Self::DefineFont3 => TagClass::Definition(D::Font(3)),
            Self::DefineFont4 => TagClass::Definition(D::Font(4)),
            Self::DefineText => TagClass::Definition(D::Label(1)),
            Self::DefineText2 => TagClass::Definition(D::Label(2)),
            Self::DefineEditText => TagClass::Definition(D::EditText),
            Self::DefineButton => TagClass::Definition(D::Button(1)),
            Self::DefineButton2 => TagClass::Definition(D::Button(2)),
            Self::DefineSound => TagClass::Definition(D::Sound),
            Self::DefineBits => TagClass::Definition(D::Jpeg(1)),
            Self::DefineBitsJpeg2 => TagClass::Definition(D::Jpeg(2)),
            Self::DefineBitsJpeg3 => TagClass::Definition(D::Jpeg(3)),
            Self::DefineBitsJpeg4 => TagClass::Definition(D::Jpeg(4)),
            Self::DefineBitsLossless => TagClass::Definition(D::Lossless(1)),
            Self::DefineBitsLossless2 => TagClass::Definition(D::Lossless(2)),
            Self::DefineSprite => TagClass::Definition(D::Sprite),
            Self::DefineVideoStream => TagClass::Definition(D::Video),
            Self::DefineBinaryData => TagClass::Definition(D::Binary),

            Self::DefineFontInfo => TagClass::Auxiliary(AuxiliaryKind::FontInfo(1)),
            Self::DefineFontInfo2 => TagClass::Auxiliary(AuxiliaryKind::FontInfo(2)),
            Self::DefineButtonSound => TagClass::Auxiliary(AuxiliaryKind::ButtonSound),
            Self::DefineButtonCxform => TagClass::Auxiliary(AuxiliaryKind::ButtonCxform),
            Self::DefineScalingGrid => TagClass::Auxiliary(AuxiliaryKind::ScalingGrid),
            Self::VideoFrame => TagClass::Auxiliary(AuxiliaryKind::VideoFrame),
            Self::DefineFontAlignZones => TagClass::Auxiliary(AuxiliaryKind::FontAlignZones),
            Self::CsmTextSettings => TagClass::Auxiliary(AuxiliaryKind::CsmTextSettings),
            Self::DefineFontName => TagClass::Auxiliary(AuxiliaryKind::FontName),

            Self::PlaceObject
            | Self::PlaceObject2
            | Self::PlaceObject3
            | Self::RemoveObject
            | Self::RemoveObject2
            | Self::StartSound
            | Self::StartSound2 => TagClass::Control,

            Self::End
            | Self::ShowFrame
            | Self::JpegTables
            | Self::SetBackgroundColor
            | Self::DoAction
            | Self::SoundStreamHead
            | Self::SoundStreamBlock
            | Self::Protect
            | Self::ProductInfo
            | Self::FrameLabel
            | Self::SoundStreamHead2
            | Self::ExportAssets
            | Self::ImportAssets
            | Self::EnableDebugger
            | Self::DoInitAction
            | Self::DebugId
            | Self::EnableDebugger2
            | Self::ScriptLimits
            | Self::SetTabIndex
            | Self::FileAttributes
            | Self::ImportAssets2
            | Self::DoAbcDefine
            | Self::SymbolClass
            | Self::Metadata
            | Self::DoAbc
            | Self::DefineSceneAndFrameLabelData => TagClass::Structural,

            Self::Unknown(_) => TagClass::Unknown,
        }
    }
}
