use serde::{Deserialize, Serialize};

use crate::{StokesParams, DEFAULT_PIXEL_SIZE};

/// Значение усиления, если оно неизвестно (файлы без поля `gain`).
pub const UNKNOWN_GAIN: f64 = -1.0;

/// Значение доли заполнения, если она неизвестна (файлы до v3).
pub const UNKNOWN_FILL: f64 = -1.0;

/// Заголовок интеграции (одна запись контейнера).
///
/// Времена в MJD UTC, LST и длительность интеграции в сутках, направления
/// в градусах, частоты в Гц.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationHeader {
    /// Имя файла видимостей, по которому построено изображение
    pub vis_file_name: String,
    /// Время начала интеграции
    pub start_time: f64,
    /// Среднее время интеграции
    pub centroid_time: f64,
    /// Длительность интеграции
    pub int_len: f64,
    /// Местное звёздное время
    pub lst: f64,
    /// Центральная частота
    pub freq: f64,
    /// Полоса
    pub bandwidth: f64,
    /// Усиление приёмника (-1, если неизвестно)
    pub gain: f64,
    /// Доля заполнения интеграции (-1, если неизвестна)
    pub fill: f64,
    /// Прямое восхождение зенита
    pub zenith_ra: f64,
    /// Склонение зенита
    pub zenith_dec: f64,
    /// Пара калибровочных значений (смысл непрозрачен для формата)
    pub worldreplace0: [f64; 2],

    // Поля ниже наследуются от заголовка файла и в записи не хранятся.
    /// Параметры Стокса
    pub stokes_params: StokesParams,
    /// Ширина пикселя
    pub x_pixel_size: f64,
    /// Высота пикселя
    pub y_pixel_size: f64,
    /// Станция; `None` — не проверять при записи
    pub station: Option<String>,
}

impl IntegrationHeader {
    /// Заголовок с заданным временем начала и длительностью, остальные поля
    /// по умолчанию.
    pub fn new(
        start_time: f64,
        int_len: f64,
    ) -> Self {
        Self {
            start_time,
            centroid_time: start_time + int_len / 2.0,
            int_len,
            ..Self::default()
        }
    }

    /// Конец интеграции.
    pub fn stop_time(&self) -> f64 {
        self.start_time + self.int_len
    }
}

impl Default for IntegrationHeader {
    fn default() -> Self {
        Self {
            vis_file_name: String::new(),
            start_time: 0.0,
            centroid_time: 0.0,
            int_len: 0.0,
            lst: 0.0,
            freq: 0.0,
            bandwidth: 0.0,
            gain: UNKNOWN_GAIN,
            fill: UNKNOWN_FILL,
            zenith_ra: 0.0,
            zenith_dec: 0.0,
            worldreplace0: [0.0; 2],
            stokes_params: StokesParams::default(),
            x_pixel_size: DEFAULT_PIXEL_SIZE,
            y_pixel_size: DEFAULT_PIXEL_SIZE,
            station: None,
        }
    }
}
