//! Реестр версий формата PasiImageDB.
//!
//! Файл начинается с 16-байтовой ASCII-метки версии (дополненной NUL), за
//! которой следует заголовок файла в раскладке этой версии, затем записи
//! интеграций. Все числа хранятся в порядке little-endian, структуры упакованы
//! без выравнивания.
//!
//! ```text
//! [0..16]          TAG            метка версии, например "PasiImageDBv003"
//! [16..16+H]       FILE HEADER    раскладка зависит от версии
//! [16+H+k×R..]     RECORD k       заголовок интеграции + спектр + изображение
//! ```
//!
//! Версии только добавляют поля: v2 добавляет размеры пикселя в заголовок
//! файла, v3 добавляет `fill` в заголовок интеграции.

use pidb_types::{FileHeader, IntegrationHeader, PidbError, PidbResult, StokesParams};

use crate::binary::{
    read_f64_le, read_fixed_str, read_u32_le, write_f64_le, write_fixed_str, write_u32_le,
};

/// Размер метки версии в начале файла
pub const FORMAT_TAG_SIZE: usize = 16;

/// Ширина строковых полей заголовка файла
pub const HEADER_STRING_SIZE: usize = 16;

/// Четыре строковых поля в начале заголовка файла любой версии
pub const FILE_IDENTITY_SIZE: usize = 4 * HEADER_STRING_SIZE;

/// Ширина поля имени файла видимостей
pub const VIS_FILE_NAME_SIZE: usize = 256;

/// Смещение поля `start_time` внутри записи (одинаково во всех версиях)
pub const TIME_FIELD_OFFSET: usize = VIS_FILE_NAME_SIZE;

/// Версия формата контейнера
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum FormatVersion {
    /// Исходная раскладка
    V1 = 1,
    /// + размеры пикселя в заголовке файла
    V2 = 2,
    /// + доля заполнения в заголовке интеграции
    V3 = 3,
}

impl FormatVersion {
    /// Версия, которой пишутся новые файлы
    pub const CURRENT: FormatVersion = FormatVersion::V3;

    /// Все известные версии по возрастанию
    pub const ALL: [FormatVersion; 3] = [FormatVersion::V1, FormatVersion::V2, FormatVersion::V3];

    /// Метка версии без дополнения.
    pub fn tag_str(&self) -> &'static str {
        match self {
            FormatVersion::V1 => "PasiImageDBv001",
            FormatVersion::V2 => "PasiImageDBv002",
            FormatVersion::V3 => "PasiImageDBv003",
        }
    }

    /// Метка версии в том виде, в каком она лежит на диске.
    pub fn tag(&self) -> [u8; FORMAT_TAG_SIZE] {
        let mut tag = [0u8; FORMAT_TAG_SIZE];
        let s = self.tag_str().as_bytes();
        tag[..s.len()].copy_from_slice(s);
        tag
    }

    /// Определяет версию по сырой метке (хвостовые NUL игнорируются).
    pub fn from_tag(raw: &[u8]) -> PidbResult<Self> {
        let end = raw.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
        let trimmed = &raw[..end];

        FormatVersion::ALL
            .into_iter()
            .find(|v| v.tag_str().as_bytes() == trimmed)
            .ok_or_else(|| {
                PidbError::UnknownVersion(String::from_utf8_lossy(trimmed).into_owned())
            })
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// Раскладки заголовков этой версии.
    pub fn layout(&self) -> &'static Layout {
        layout_for(*self)
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.tag_str())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Раскладки заголовков
////////////////////////////////////////////////////////////////////////////////

/// Раскладка заголовка файла конкретной версии.
pub trait FileHeaderLayout: Send + Sync {
    /// Размер заголовка на диске
    fn size(&self) -> usize;

    fn encode(
        &self,
        header: &FileHeader,
    ) -> Vec<u8>;

    /// Поля, отсутствующие в версии, получают значения по умолчанию.
    fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<FileHeader>;
}

/// Раскладка заголовка интеграции конкретной версии.
pub trait IntegrationHeaderLayout: Send + Sync {
    /// Размер заголовка на диске
    fn size(&self) -> usize;

    /// Дописывает заголовок в `buf` в порядке объявления полей.
    fn encode(
        &self,
        header: &IntegrationHeader,
        buf: &mut Vec<u8>,
    );

    /// Поля, отсутствующие в версии, получают значения по умолчанию
    /// (`gain` = -1, `fill` = -1).
    fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<IntegrationHeader>;
}

/// Заголовок файла v1: без размеров пикселя (96 байт).
pub struct FileHeaderV1;

/// Заголовок файла v2/v3: с размерами пикселя (112 байт).
pub struct FileHeaderV2;

/// Заголовок интеграции v1/v2 (344 байта).
pub struct IntegrationHeaderV1;

/// Заголовок интеграции v3: + `fill` (352 байта).
pub struct IntegrationHeaderV3;

fn ensure_len(
    buf: &[u8],
    expected: usize,
) -> PidbResult<()> {
    if buf.len() < expected {
        return Err(PidbError::TruncatedRecord {
            expected,
            found: buf.len(),
        });
    }
    Ok(())
}

fn encode_file_identity(
    header: &FileHeader,
    buf: &mut Vec<u8>,
) {
    write_fixed_str(buf, &header.corr_version, HEADER_STRING_SIZE);
    write_fixed_str(buf, &header.imager_version, HEADER_STRING_SIZE);
    write_fixed_str(buf, &header.station, HEADER_STRING_SIZE);
    write_fixed_str(buf, &header.stokes_params.joined(), HEADER_STRING_SIZE);
    write_u32_le(buf, header.x_size);
    write_u32_le(buf, header.y_size);
    write_u32_le(buf, header.n_spec_chans);
    write_u32_le(buf, header.flags);
}

fn decode_file_identity(
    buf: &[u8],
    off: &mut usize,
) -> FileHeader {
    let corr_version = read_fixed_str(buf, off, HEADER_STRING_SIZE);
    let imager_version = read_fixed_str(buf, off, HEADER_STRING_SIZE);
    let station = read_fixed_str(buf, off, HEADER_STRING_SIZE);
    let stokes_params = StokesParams::parse(&read_fixed_str(buf, off, HEADER_STRING_SIZE));

    FileHeader {
        corr_version,
        imager_version,
        station,
        stokes_params,
        x_size: read_u32_le(buf, off),
        y_size: read_u32_le(buf, off),
        n_spec_chans: read_u32_le(buf, off),
        flags: read_u32_le(buf, off),
        ..FileHeader::default()
    }
}

impl FileHeaderLayout for FileHeaderV1 {
    fn size(&self) -> usize {
        4 * HEADER_STRING_SIZE + 4 * 4 + 2 * 8
    }

    fn encode(
        &self,
        header: &FileHeader,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        encode_file_identity(header, &mut buf);
        write_f64_le(&mut buf, header.start_time);
        write_f64_le(&mut buf, header.stop_time);
        buf
    }

    fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<FileHeader> {
        ensure_len(buf, self.size())?;

        let mut off = 0;
        let mut header = decode_file_identity(buf, &mut off);
        header.start_time = read_f64_le(buf, &mut off);
        header.stop_time = read_f64_le(buf, &mut off);
        Ok(header)
    }
}

impl FileHeaderLayout for FileHeaderV2 {
    fn size(&self) -> usize {
        4 * HEADER_STRING_SIZE + 4 * 4 + 4 * 8
    }

    fn encode(
        &self,
        header: &FileHeader,
    ) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        encode_file_identity(header, &mut buf);
        write_f64_le(&mut buf, header.x_pixel_size);
        write_f64_le(&mut buf, header.y_pixel_size);
        write_f64_le(&mut buf, header.start_time);
        write_f64_le(&mut buf, header.stop_time);
        buf
    }

    fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<FileHeader> {
        ensure_len(buf, self.size())?;

        let mut off = 0;
        let mut header = decode_file_identity(buf, &mut off);
        header.x_pixel_size = read_f64_le(buf, &mut off);
        header.y_pixel_size = read_f64_le(buf, &mut off);
        header.start_time = read_f64_le(buf, &mut off);
        header.stop_time = read_f64_le(buf, &mut off);
        Ok(header)
    }
}

// Общая часть заголовков интеграции; `fill` (v3) вставляется между `gain` и
// `zenith_ra`.
fn encode_integration(
    header: &IntegrationHeader,
    with_fill: bool,
    buf: &mut Vec<u8>,
) {
    write_fixed_str(buf, &header.vis_file_name, VIS_FILE_NAME_SIZE);
    write_f64_le(buf, header.start_time);
    write_f64_le(buf, header.centroid_time);
    write_f64_le(buf, header.int_len);
    write_f64_le(buf, header.lst);
    write_f64_le(buf, header.freq);
    write_f64_le(buf, header.bandwidth);
    write_f64_le(buf, header.gain);
    if with_fill {
        write_f64_le(buf, header.fill);
    }
    write_f64_le(buf, header.zenith_ra);
    write_f64_le(buf, header.zenith_dec);
    write_f64_le(buf, header.worldreplace0[0]);
    write_f64_le(buf, header.worldreplace0[1]);
}

fn decode_integration(
    buf: &[u8],
    with_fill: bool,
) -> IntegrationHeader {
    let mut off = 0;
    let mut h = IntegrationHeader {
        vis_file_name: read_fixed_str(buf, &mut off, VIS_FILE_NAME_SIZE),
        ..IntegrationHeader::default()
    };

    h.start_time = read_f64_le(buf, &mut off);
    h.centroid_time = read_f64_le(buf, &mut off);
    h.int_len = read_f64_le(buf, &mut off);
    h.lst = read_f64_le(buf, &mut off);
    h.freq = read_f64_le(buf, &mut off);
    h.bandwidth = read_f64_le(buf, &mut off);
    h.gain = read_f64_le(buf, &mut off);
    if with_fill {
        h.fill = read_f64_le(buf, &mut off);
    }
    h.zenith_ra = read_f64_le(buf, &mut off);
    h.zenith_dec = read_f64_le(buf, &mut off);
    h.worldreplace0 = [read_f64_le(buf, &mut off), read_f64_le(buf, &mut off)];
    h
}

impl IntegrationHeaderLayout for IntegrationHeaderV1 {
    fn size(&self) -> usize {
        VIS_FILE_NAME_SIZE + 9 * 8 + 2 * 8
    }

    fn encode(
        &self,
        header: &IntegrationHeader,
        buf: &mut Vec<u8>,
    ) {
        encode_integration(header, false, buf);
    }

    fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<IntegrationHeader> {
        ensure_len(buf, self.size())?;
        Ok(decode_integration(buf, false))
    }
}

impl IntegrationHeaderLayout for IntegrationHeaderV3 {
    fn size(&self) -> usize {
        VIS_FILE_NAME_SIZE + 10 * 8 + 2 * 8
    }

    fn encode(
        &self,
        header: &IntegrationHeader,
        buf: &mut Vec<u8>,
    ) {
        encode_integration(header, true, buf);
    }

    fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<IntegrationHeader> {
        ensure_len(buf, self.size())?;
        Ok(decode_integration(buf, true))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Таблица версий
////////////////////////////////////////////////////////////////////////////////

/// Набор раскладок одной версии формата.
pub struct Layout {
    pub version: FormatVersion,
    pub file_header: &'static dyn FileHeaderLayout,
    pub integration_header: &'static dyn IntegrationHeaderLayout,
    /// Смещение 8-байтового `start_time` от начала записи
    pub time_offset: usize,
}

impl Layout {
    /// Смещение первой записи от начала файла.
    pub fn data_offset(&self) -> usize {
        FORMAT_TAG_SIZE + self.file_header.size()
    }
}

impl std::fmt::Debug for Layout {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("version", &self.version)
            .field("file_header_size", &self.file_header.size())
            .field("integration_header_size", &self.integration_header.size())
            .field("time_offset", &self.time_offset)
            .finish()
    }
}

static LAYOUTS: [Layout; 3] = [
    Layout {
        version: FormatVersion::V1,
        file_header: &FileHeaderV1,
        integration_header: &IntegrationHeaderV1,
        time_offset: TIME_FIELD_OFFSET,
    },
    Layout {
        version: FormatVersion::V2,
        file_header: &FileHeaderV2,
        integration_header: &IntegrationHeaderV1,
        time_offset: TIME_FIELD_OFFSET,
    },
    Layout {
        version: FormatVersion::V3,
        file_header: &FileHeaderV2,
        integration_header: &IntegrationHeaderV3,
        time_offset: TIME_FIELD_OFFSET,
    },
];

/// Раскладки для версии.
pub fn layout_for(version: FormatVersion) -> &'static Layout {
    match version {
        FormatVersion::V1 => &LAYOUTS[0],
        FormatVersion::V2 => &LAYOUTS[1],
        FormatVersion::V3 => &LAYOUTS[2],
    }
}

/// Раскладки по сырой метке из файла.
pub fn layout_for_tag(raw: &[u8]) -> PidbResult<&'static Layout> {
    FormatVersion::from_tag(raw).map(layout_for)
}
