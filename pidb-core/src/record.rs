//! Кодек записи интеграции: заголовок + спектр + изображение.

use byteorder::{ByteOrder, LittleEndian};
use ndarray::Array3;
use pidb_types::{FileHeader, IntegrationHeader, PidbError, PidbResult};

use crate::{
    binary::{read_f32_slice_le, write_f32_iter_le},
    format::{layout_for, FormatVersion, Layout, VIS_FILE_NAME_SIZE},
};

/// Запись интеграции.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRecord {
    pub header: IntegrationHeader,
    /// Изображение, индексы `[stokes, x, y]`
    pub image: Array3<f32>,
    /// Спектр одиночного диполя (если в файле есть каналы)
    pub spectrum: Option<Vec<f32>>,
}

/// Кодирует и декодирует записи одного файла.
///
/// Создаётся один раз при открытии (или фиксации схемы): версия разрешается
/// в раскладку здесь, а не на каждой записи.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    layout: &'static Layout,
    schema: FileHeader,
    record_size: usize,
}

impl RecordCodec {
    /// Ошибка `InvalidShape`, если размер записи не помещается в `usize`.
    pub fn new(
        version: FormatVersion,
        header: &FileHeader,
    ) -> PidbResult<Self> {
        let record_size = record_size(version, header).ok_or_else(|| {
            PidbError::invalid_shape(format!(
                "record of {} × {} × {} pixels and {} channels overflows",
                header.stokes_count(),
                header.x_size,
                header.y_size,
                header.n_spec_chans
            ))
        })?;

        Ok(Self {
            layout: layout_for(version),
            schema: header.clone(),
            record_size,
        })
    }

    pub fn version(&self) -> FormatVersion {
        self.layout.version
    }

    pub fn layout(&self) -> &'static Layout {
        self.layout
    }

    /// Размер заголовка интеграции
    pub fn header_size(&self) -> usize {
        self.layout.integration_header.size()
    }

    /// Полный размер записи: заголовок + 4 × (каналы + стокс × x × y).
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Форма изображения `(stokes, x, y)`.
    pub fn image_dim(&self) -> (usize, usize, usize) {
        (
            self.schema.stokes_count(),
            self.schema.x_size as usize,
            self.schema.y_size as usize,
        )
    }

    /// Сериализует запись. Форма изображения и длина спектра должны совпадать
    /// со схемой.
    pub fn encode(
        &self,
        header: &IntegrationHeader,
        image: &Array3<f32>,
        spectrum: Option<&[f32]>,
    ) -> PidbResult<Vec<u8>> {
        if image.dim() != self.image_dim() {
            return Err(PidbError::invalid_shape(format!(
                "image shape {:?} ≠ schema {:?}",
                image.dim(),
                self.image_dim()
            )));
        }

        let n_chans = self.schema.n_spec_chans as usize;
        let spectrum = spectrum.filter(|s| !s.is_empty());
        match spectrum {
            Some(s) if s.len() != n_chans => {
                return Err(PidbError::invalid_shape(format!(
                    "spectrum length {} ≠ channel count {n_chans}",
                    s.len()
                )));
            }
            None if n_chans > 0 => {
                return Err(PidbError::invalid_shape(format!(
                    "spectrum missing, file has {n_chans} channels"
                )));
            }
            _ => {}
        }

        let mut buf = Vec::with_capacity(self.record_size());
        self.layout.integration_header.encode(header, &mut buf);

        if let Some(s) = spectrum {
            write_f32_iter_le(&mut buf, s);
        }

        // iter() обходит массив в логическом порядке [stokes, x, y] независимо
        // от раскладки в памяти
        write_f32_iter_le(&mut buf, image.iter());

        debug_assert_eq!(buf.len(), self.record_size());
        Ok(buf)
    }

    /// Десериализует запись. Поля, которых нет в версии файла, заполняются
    /// значениями по умолчанию; Стокс, размеры пикселя и станция копируются из
    /// заголовка файла.
    pub fn decode(
        &self,
        buf: &[u8],
    ) -> PidbResult<IntegrationRecord> {
        let expected = self.record_size();

        if buf.len() < expected {
            return Err(PidbError::TruncatedRecord {
                expected,
                found: buf.len(),
            });
        }

        let mut header = self.layout.integration_header.decode(buf)?;
        header.stokes_params = self.schema.stokes_params.clone();
        header.x_pixel_size = self.schema.x_pixel_size;
        header.y_pixel_size = self.schema.y_pixel_size;
        header.station = Some(self.schema.station.clone());

        let mut off = self.header_size();
        let n_chans = self.schema.n_spec_chans as usize;
        let spectrum = (n_chans > 0).then(|| read_f32_slice_le(buf, &mut off, n_chans));

        let dim = self.image_dim();
        let pixels = read_f32_slice_le(buf, &mut off, dim.0 * dim.1 * dim.2);
        let image = Array3::from_shape_vec(dim, pixels)
            .map_err(|e| PidbError::invalid_shape(e.to_string()))?;

        Ok(IntegrationRecord {
            header,
            image,
            spectrum,
        })
    }

    /// Частичное декодирование: только `start_time` по фиксированному
    /// смещению. Возвращает то же значение, что и [`decode`](Self::decode).
    pub fn peek_start_time(
        &self,
        buf: &[u8],
    ) -> PidbResult<f64> {
        let off = self.layout.time_offset;

        if buf.len() < off + 8 {
            return Err(PidbError::TruncatedRecord {
                expected: off + 8,
                found: buf.len(),
            });
        }

        Ok(LittleEndian::read_f64(&buf[off..off + 8]))
    }

    /// Перекодирует сырую запись этого кодека в раскладку `target`.
    ///
    /// Имя файла видимостей переносится байт в байт: на диске это не
    /// обязательно UTF-8.
    pub fn upgrade(
        &self,
        buf: &[u8],
        target: &RecordCodec,
    ) -> PidbResult<Vec<u8>> {
        let record = self.decode(buf)?;
        let mut out = target.encode(&record.header, &record.image, record.spectrum.as_deref())?;

        out[..VIS_FILE_NAME_SIZE].copy_from_slice(&buf[..VIS_FILE_NAME_SIZE]);
        Ok(out)
    }
}

/// Размер записи для версии и заголовка файла; `None` при переполнении.
pub fn record_size(
    version: FormatVersion,
    header: &FileHeader,
) -> Option<usize> {
    header
        .data_size()?
        .checked_add(layout_for(version).integration_header.size())
}

#[cfg(test)]
mod tests {
    use pidb_types::StokesParams;

    use super::*;

    fn schema(
        stokes: &str,
        x: u32,
        y: u32,
        chans: u32,
    ) -> FileHeader {
        FileHeader {
            station: "LWA1".into(),
            stokes_params: StokesParams::parse(stokes),
            x_size: x,
            y_size: y,
            n_spec_chans: chans,
            x_pixel_size: 0.75,
            y_pixel_size: 0.5,
            ..FileHeader::default()
        }
    }

    fn ramp_image(dim: (usize, usize, usize)) -> Array3<f32> {
        Array3::from_shape_fn(dim, |(s, x, y)| (s * 100 + x * 10 + y) as f32)
    }

    fn sample_header() -> IntegrationHeader {
        IntegrationHeader {
            vis_file_name: "20240101_000000.vis".into(),
            freq: 38.1e6,
            bandwidth: 100e3,
            gain: 6.0,
            fill: 0.97,
            zenith_ra: 123.4,
            zenith_dec: 34.07,
            worldreplace0: [1.5, -2.5],
            stokes_params: StokesParams::parse("I,V"),
            x_pixel_size: 0.75,
            y_pixel_size: 0.5,
            station: Some("LWA1".into()),
            ..IntegrationHeader::new(60_310.25, 5.0 / 86_400.0)
        }
    }

    #[test]
    fn test_record_size() {
        let fh = schema("I,V", 4, 3, 10);
        let codec = RecordCodec::new(FormatVersion::V3, &fh).unwrap();

        assert_eq!(codec.record_size(), 352 + 4 * (10 + 2 * 4 * 3));
        assert_eq!(record_size(FormatVersion::V1, &fh), Some(344 + 4 * (10 + 24)));
    }

    #[test]
    fn test_round_trip_with_spectrum() {
        let codec = RecordCodec::new(FormatVersion::V3, &schema("I,V", 4, 3, 5)).unwrap();
        let header = sample_header();
        let image = ramp_image((2, 4, 3));
        let spectrum = vec![0.5f32, 1.0, 1.5, 2.0, 2.5];

        let bytes = codec.encode(&header, &image, Some(&spectrum)).unwrap();
        assert_eq!(bytes.len(), codec.record_size());

        let record = codec.decode(&bytes).unwrap();
        assert_eq!(record.header, header);
        assert_eq!(record.image, image);
        assert_eq!(record.spectrum, Some(spectrum));
    }

    #[test]
    fn test_image_order_is_stokes_x_y() {
        let codec = RecordCodec::new(FormatVersion::V3, &schema("I,V", 2, 3, 0)).unwrap();
        let image = ramp_image((2, 2, 3));
        let bytes = codec
            .encode(&IntegrationHeader::default(), &image, None)
            .unwrap();

        let data = &bytes[codec.header_size()..];
        // [0,0,1] — второй элемент, [0,1,0] — четвёртый, [1,0,0] — седьмой
        assert_eq!(&data[4..8], &1.0f32.to_le_bytes());
        assert_eq!(&data[12..16], &10.0f32.to_le_bytes());
        assert_eq!(&data[24..28], &100.0f32.to_le_bytes());
    }

    #[test]
    fn test_non_standard_layout_is_written_logically() {
        let codec = RecordCodec::new(FormatVersion::V3, &schema("I", 3, 2, 0)).unwrap();
        let transposed = ramp_image((1, 2, 3)).permuted_axes([0, 2, 1]);
        let bytes = codec
            .encode(&IntegrationHeader::default(), &transposed, None)
            .unwrap();

        let record = codec.decode(&bytes).unwrap();
        assert_eq!(record.image, transposed);
    }

    #[test]
    fn test_v1_decode_backfills_defaults() {
        let fh = schema("I,V", 4, 3, 0);
        let codec = RecordCodec::new(FormatVersion::V1, &fh).unwrap();
        let header = sample_header();

        let bytes = codec.encode(&header, &ramp_image((2, 4, 3)), None).unwrap();
        let record = codec.decode(&bytes).unwrap();

        assert_eq!(record.header.fill, -1.0, "fill отсутствует в v1");
        assert_eq!(record.header.gain, 6.0);
        assert_eq!(record.header.stokes_params, fh.stokes_params);
        assert_eq!(record.header.x_pixel_size, 0.75);
        assert!(record.spectrum.is_none());
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let codec = RecordCodec::new(FormatVersion::V3, &schema("I", 2, 2, 0)).unwrap();
        let err = codec
            .encode(&IntegrationHeader::default(), &ramp_image((1, 3, 3)), None)
            .unwrap_err();

        assert!(matches!(err, PidbError::InvalidShape(_)));
    }

    #[test]
    fn test_spectrum_length_checked() {
        let codec = RecordCodec::new(FormatVersion::V3, &schema("I", 2, 2, 4)).unwrap();
        let image = ramp_image((1, 2, 2));

        assert!(codec
            .encode(&IntegrationHeader::default(), &image, Some(&[1.0, 2.0]))
            .is_err());
        assert!(codec
            .encode(&IntegrationHeader::default(), &image, None)
            .is_err());
    }

    #[test]
    fn test_truncated_decode() {
        let codec = RecordCodec::new(FormatVersion::V3, &schema("I", 2, 2, 0)).unwrap();
        let bytes = codec
            .encode(&IntegrationHeader::default(), &ramp_image((1, 2, 2)), None)
            .unwrap();

        let err = codec.decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(
            err,
            PidbError::TruncatedRecord { expected, found } if found == expected - 1
        ));
    }

    #[test]
    fn test_peek_matches_full_decode() {
        for v in FormatVersion::ALL {
            let codec = RecordCodec::new(v, &schema("I,V", 4, 3, 2)).unwrap();
            let bytes = codec
                .encode(&sample_header(), &ramp_image((2, 4, 3)), Some(&[1.0, 2.0]))
                .unwrap();

            let peeked = codec.peek_start_time(&bytes).unwrap();
            let decoded = codec.decode(&bytes).unwrap().header.start_time;
            assert_eq!(peeked, decoded, "версия {v}");
        }
    }

    #[test]
    fn test_upgrade_v1_to_v3() {
        let fh = schema("I,V", 4, 3, 0);
        let old = RecordCodec::new(FormatVersion::V1, &fh).unwrap();
        let new = RecordCodec::new(FormatVersion::V3, &fh).unwrap();
        let image = ramp_image((2, 4, 3));

        let v1_bytes = old.encode(&sample_header(), &image, None).unwrap();
        let v3_bytes = old.upgrade(&v1_bytes, &new).unwrap();
        assert_eq!(v3_bytes.len(), new.record_size());

        let record = new.decode(&v3_bytes).unwrap();
        assert_eq!(record.header.fill, -1.0);
        assert_eq!(record.header.vis_file_name, "20240101_000000.vis");
        assert_eq!(record.image, image);
    }

    #[test]
    fn test_upgrade_keeps_raw_file_name() {
        let fh = schema("I", 2, 2, 0);
        let old = RecordCodec::new(FormatVersion::V2, &fh).unwrap();
        let new = RecordCodec::new(FormatVersion::V3, &fh).unwrap();

        let mut v2_bytes = old
            .encode(&sample_header(), &ramp_image((1, 2, 2)), None)
            .unwrap();
        // Latin-1: "caf\xe9.vis"
        let name = b"caf\xe9.vis\0";
        v2_bytes[..name.len()].copy_from_slice(name);

        let v3_bytes = old.upgrade(&v2_bytes, &new).unwrap();
        assert_eq!(&v3_bytes[..VIS_FILE_NAME_SIZE], &v2_bytes[..VIS_FILE_NAME_SIZE]);
    }

    #[test]
    fn test_new_rejects_overflowing_schema() {
        let fh = FileHeader {
            stokes_params: StokesParams::parse("I,Q,U,V"),
            x_size: u32::MAX,
            y_size: u32::MAX,
            ..FileHeader::default()
        };

        assert_eq!(record_size(FormatVersion::V3, &fh), None);
        let err = RecordCodec::new(FormatVersion::V3, &fh).unwrap_err();
        assert!(matches!(err, PidbError::InvalidShape(_)));
    }
}
