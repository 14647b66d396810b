use serde::{Deserialize, Serialize};

use crate::StokesParams;

/// Бит 0 поля `flags`: записи упорядочены по времени начала.
pub const FLAG_SORTED: u32 = 0x0001;

/// Размер пикселя по умолчанию (градусы) для файлов v1, где поля нет.
pub const DEFAULT_PIXEL_SIZE: f64 = 1.0;

/// Заголовок файла PIDB (версионно-независимое представление в памяти).
///
/// Все абсолютные времена в MJD UTC, размеры пикселя в градусах.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileHeader {
    /// Версия коррелятора
    pub corr_version: String,
    /// Версия программы построения изображений
    pub imager_version: String,
    /// Название станции
    pub station: String,
    /// Параметры Стокса (через запятую на диске)
    pub stokes_params: StokesParams,
    /// Ширина изображения в пикселях
    pub x_size: u32,
    /// Высота изображения в пикселях
    pub y_size: u32,
    /// Число каналов спектра (0 — спектр отсутствует)
    pub n_spec_chans: u32,
    /// Битовые флаги (bit 0: записи отсортированы)
    pub flags: u32,
    /// Ширина пикселя (v2+, иначе 1.0)
    pub x_pixel_size: f64,
    /// Высота пикселя (v2+, иначе 1.0)
    pub y_pixel_size: f64,
    /// Самое раннее время начала записи в файле
    pub start_time: f64,
    /// Самое позднее время начала записи в файле
    pub stop_time: f64,
}

impl FileHeader {
    /// Создаёт заголовок нового файла. Размерности неизвестны до первой
    /// записи; новый пустой файл считается отсортированным.
    pub fn new(
        corr_version: &str,
        imager_version: &str,
        station: &str,
    ) -> Self {
        Self {
            corr_version: corr_version.to_string(),
            imager_version: imager_version.to_string(),
            station: station.to_string(),
            flags: FLAG_SORTED,
            ..Self::default()
        }
    }

    pub fn is_sorted(&self) -> bool {
        (self.flags & FLAG_SORTED) != 0
    }

    pub fn set_sorted(
        &mut self,
        sorted: bool,
    ) {
        if sorted {
            self.flags |= FLAG_SORTED;
        } else {
            self.flags &= !FLAG_SORTED;
        }
    }

    /// Число плоскостей Стокса.
    pub fn stokes_count(&self) -> usize {
        self.stokes_params.len()
    }

    /// Число значений f32 в изображении одной записи; `None` при
    /// переполнении (повреждённый заголовок).
    pub fn image_len(&self) -> Option<usize> {
        self.stokes_count()
            .checked_mul(self.x_size as usize)?
            .checked_mul(self.y_size as usize)
    }

    /// Число байт данных (спектр + изображение) одной записи.
    pub fn data_size(&self) -> Option<usize> {
        (self.n_spec_chans as usize)
            .checked_add(self.image_len()?)?
            .checked_mul(4)
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            corr_version: String::new(),
            imager_version: String::new(),
            station: String::new(),
            stokes_params: StokesParams::parse(""),
            x_size: 0,
            y_size: 0,
            n_spec_chans: 0,
            flags: 0,
            x_pixel_size: DEFAULT_PIXEL_SIZE,
            y_pixel_size: DEFAULT_PIXEL_SIZE,
            start_time: 0.0,
            stop_time: 0.0,
        }
    }
}
