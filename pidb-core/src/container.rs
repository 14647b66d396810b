use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use ndarray::Array3;
use pidb_types::{FileHeader, IntegrationHeader, PidbError, PidbResult, StokesParams};

use crate::{
    binary::truncate_to_boundary,
    format::{FormatVersion, FORMAT_TAG_SIZE, HEADER_STRING_SIZE},
    record::{record_size, RecordCodec},
};

/// Режим открытия контейнера.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Только чтение; файл должен существовать.
    Read,
    /// Новый пустой файл (существующий обнуляется).
    Write,
    /// Дозапись в существующий файл или создание нового.
    Append,
}

/// Идентификация писателя для новых файлов.
///
/// Каждая строка обрезается до 16 байт.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Версия коррелятора
    pub corr_version: String,
    /// Версия программы построения изображений
    pub imager_version: String,
    /// Название станции
    pub station: String,
}

/// Состояние заголовка: до первой записи размерности неизвестны и на диск
/// ничего не пишется.
#[derive(Debug)]
enum HeaderState {
    Uncommitted(FileHeader),
    Committed {
        header: FileHeader,
        codec: RecordCodec,
    },
}

/// Открытый файл PasiImageDB.
///
/// Владеет дескриптором файла и закэшированным заголовком. Заголовок
/// перезаписывается на месте при [`close`](Self::close), если менялся.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    mode: OpenMode,
    pub(crate) file: Option<File>,
    version: FormatVersion,
    state: HeaderState,
    pub(crate) len: usize,
    pub(crate) cursor: usize,
    /// Позиция дескриптора соответствует `cursor`
    pub(crate) cursor_synced: bool,
    dirty: bool,
}

////////////////////////////////////////////////////////////////////////////////
// Открытие
////////////////////////////////////////////////////////////////////////////////

impl Container {
    /// Открывает контейнер с пустой идентификацией писателя.
    pub fn open<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
    ) -> PidbResult<Self> {
        Self::open_with(path, mode, ContainerOptions::default())
    }

    /// Открывает контейнер. `options` используются только при создании файла.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        mode: OpenMode,
        options: ContainerOptions,
    ) -> PidbResult<Self> {
        let path = path.as_ref().to_path_buf();

        match mode {
            OpenMode::Read => Self::open_read(path),
            OpenMode::Write => Self::create(path, mode, &options),
            OpenMode::Append => Self::open_append(path, &options),
        }
    }

    fn open_read(path: PathBuf) -> PidbResult<Self> {
        if !path.is_file() {
            return Err(PidbError::FileNotFound(path));
        }

        let mut file = File::open(&path)?;
        let size = file.metadata()?.len();

        // Пустой файл — пустой контейнер последней версии
        if size == 0 {
            debug!("{}: empty file, nothing committed", path.display());

            return Ok(Self {
                path,
                mode: OpenMode::Read,
                file: Some(file),
                version: FormatVersion::CURRENT,
                state: HeaderState::Uncommitted(FileHeader::default()),
                len: 0,
                cursor: 0,
                cursor_synced: true,
                dirty: false,
            });
        }

        let version = read_version(&mut file, size)?;
        Self::from_existing(path, OpenMode::Read, file, version, size)
    }

    fn open_append(
        path: PathBuf,
        options: &ContainerOptions,
    ) -> PidbResult<Self> {
        let size = if path.is_file() {
            std::fs::metadata(&path)?.len()
        } else {
            0
        };

        if size <= FORMAT_TAG_SIZE as u64 {
            return Self::create(path, OpenMode::Append, options);
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let version = read_version(&mut file, size)?;

        // Слишком короткий файл без единой записи, вероятно, повреждён:
        // начинаем заново
        if size <= version.layout().data_offset() as u64 {
            warn!(
                "{}: {size} bytes holds no records, starting a fresh container",
                path.display()
            );
            drop(file);
            return Self::create(path, OpenMode::Append, options);
        }

        let mut container = Self::from_existing(path, OpenMode::Append, file, version, size)?;
        container.seek_to_end()?;
        Ok(container)
    }

    fn create(
        path: PathBuf,
        mode: OpenMode,
        options: &ContainerOptions,
    ) -> PidbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        let pending = FileHeader::new(
            truncate_to_boundary(&options.corr_version, HEADER_STRING_SIZE),
            truncate_to_boundary(&options.imager_version, HEADER_STRING_SIZE),
            truncate_to_boundary(&options.station, HEADER_STRING_SIZE),
        );

        debug!("{}: new container ({mode})", path.display());

        Ok(Self {
            path,
            mode,
            file: Some(file),
            version: FormatVersion::CURRENT,
            state: HeaderState::Uncommitted(pending),
            len: 0,
            cursor: 0,
            cursor_synced: true,
            dirty: false,
        })
    }

    /// Читает заголовок (дескриптор стоит сразу за меткой) и выводит число
    /// записей из размера файла.
    fn from_existing(
        path: PathBuf,
        mode: OpenMode,
        mut file: File,
        version: FormatVersion,
        size: u64,
    ) -> PidbResult<Self> {
        let layout = version.layout();
        let header_size = layout.file_header.size();
        let data_offset = layout.data_offset() as u64;

        // Обрезанный заголовок читается сколько есть, остаток нулями: размер
        // записи в ошибке считается по тем полям, что уцелели
        let available = size
            .saturating_sub(FORMAT_TAG_SIZE as u64)
            .min(header_size as u64) as usize;
        let mut buf = vec![0u8; header_size];
        file.read_exact(&mut buf[..available])?;
        let header = layout.file_header.decode(&buf)?;

        let record_size = match record_size(version, &header) {
            Some(r) if size >= data_offset && (size - data_offset) % r as u64 == 0 => r,
            r => {
                return Err(PidbError::CorruptContainer {
                    size,
                    header_size,
                    record_size: r.unwrap_or(usize::MAX),
                });
            }
        };

        let codec = RecordCodec::new(version, &header)?;
        let len = ((size - data_offset) / record_size as u64) as usize;

        debug!(
            "{}: {version}, {len} records of {record_size} bytes, sorted={}",
            path.display(),
            header.is_sorted()
        );

        Ok(Self {
            path,
            mode,
            file: Some(file),
            version,
            state: HeaderState::Committed { header, codec },
            len,
            cursor: 0,
            cursor_synced: true,
            dirty: false,
        })
    }
}

/// Читает 16-байтовую метку версии.
fn read_version(
    file: &mut File,
    size: u64,
) -> PidbResult<FormatVersion> {
    let mut tag = Vec::with_capacity(FORMAT_TAG_SIZE);
    Read::by_ref(file)
        .take(FORMAT_TAG_SIZE.min(size as usize) as u64)
        .read_to_end(&mut tag)?;

    FormatVersion::from_tag(&tag).map_err(|_| PidbError::NotAContainer {
        tag: String::from_utf8_lossy(&tag)
            .trim_end_matches('\0')
            .to_string(),
    })
}

////////////////////////////////////////////////////////////////////////////////
// Запись
////////////////////////////////////////////////////////////////////////////////

impl Container {
    /// Добавляет интеграцию. Возвращает индекс новой записи.
    ///
    /// Первая запись нового файла фиксирует схему (Стокс, размеры, размер
    /// пикселя, число каналов) и пишет метку с заголовком. Последующие записи
    /// сверяются со схемой; при расхождении файл не меняется.
    pub fn add_image(
        &mut self,
        info: &IntegrationHeader,
        image: &Array3<f32>,
        spectrum: Option<&[f32]>,
    ) -> PidbResult<usize> {
        if self.mode == OpenMode::Read {
            return Err(PidbError::ReadOnly);
        }
        if self.file.is_none() {
            return Err(PidbError::Closed);
        }

        let (n_stokes, x, y) = image.dim();

        if n_stokes != info.stokes_params.len() {
            return Err(PidbError::invalid_shape(format!(
                "image has {n_stokes} Stokes planes, parameters '{}' name {}",
                info.stokes_params,
                info.stokes_params.len()
            )));
        }

        let x_size = dim_to_u32("width", x)?;
        let y_size = dim_to_u32("height", y)?;
        let n_spec_chans = dim_to_u32("spectrum", spectrum.map_or(0, <[f32]>::len))?;

        let first = match &self.state {
            HeaderState::Uncommitted(pending) => {
                Some(schema_from(pending, info, x_size, y_size, n_spec_chans)?)
            }
            HeaderState::Committed { header, .. } => {
                check_schema(header, info, x_size, y_size, n_spec_chans)?;
                None
            }
        };

        match first {
            Some(header) => self.commit(header, info, image, spectrum)?,
            None => self.append(info, image, spectrum)?,
        }

        self.len += 1;
        self.cursor = self.len;
        self.cursor_synced = true;

        Ok(self.len - 1)
    }

    /// Первая запись: метка, заголовок и запись пишутся одним блоком.
    fn commit(
        &mut self,
        header: FileHeader,
        info: &IntegrationHeader,
        image: &Array3<f32>,
        spectrum: Option<&[f32]>,
    ) -> PidbResult<()> {
        let codec = RecordCodec::new(self.version, &header)?;
        let record = codec.encode(info, image, spectrum)?;
        let layout = self.version.layout();

        let mut buf = Vec::with_capacity(layout.data_offset() + record.len());
        buf.extend_from_slice(&self.version.tag());
        buf.extend_from_slice(&layout.file_header.encode(&header));
        buf.extend_from_slice(&record);

        let file = self.file.as_mut().ok_or(PidbError::Closed)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&buf)?;
        file.flush()?;

        debug!(
            "{}: committed schema {}×{}×{} ({} chans), record size {}",
            self.path.display(),
            header.stokes_params,
            header.x_size,
            header.y_size,
            header.n_spec_chans,
            codec.record_size()
        );

        self.state = HeaderState::Committed { header, codec };
        Ok(())
    }

    /// Последующие записи: дописываются в конец, границы времени и флаг
    /// сортировки обновляются в памяти.
    fn append(
        &mut self,
        info: &IntegrationHeader,
        image: &Array3<f32>,
        spectrum: Option<&[f32]>,
    ) -> PidbResult<()> {
        let HeaderState::Committed { header, codec } = &mut self.state else {
            return Err(PidbError::Closed);
        };

        let record = codec.encode(info, image, spectrum)?;
        let offset = codec.layout().data_offset() as u64 + (self.len * record.len()) as u64;

        let file = self.file.as_mut().ok_or(PidbError::Closed)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&record)?;
        file.flush()?;

        let t = info.start_time;

        if t < header.start_time {
            header.start_time = t;
            self.dirty = true;
        }

        if t > header.stop_time {
            header.stop_time = t;
            self.dirty = true;
        } else if t < header.stop_time && header.is_sorted() {
            // Запись раньше уже записанного максимума
            header.set_sorted(false);
            self.dirty = true;
        }

        Ok(())
    }
}

/// Заголовок файла из метаданных первой записи.
fn schema_from(
    pending: &FileHeader,
    info: &IntegrationHeader,
    x_size: u32,
    y_size: u32,
    n_spec_chans: u32,
) -> PidbResult<FileHeader> {
    let stokes = info.stokes_params.joined();

    if stokes.len() > HEADER_STRING_SIZE {
        return Err(PidbError::invalid_shape(format!(
            "Stokes parameters '{stokes}' exceed {HEADER_STRING_SIZE} bytes"
        )));
    }

    let mut header = pending.clone();

    if let Some(station) = info.station.as_deref().filter(|s| !s.is_empty()) {
        header.station = truncate_to_boundary(station, HEADER_STRING_SIZE).to_string();
    }

    header.stokes_params = StokesParams::parse(&stokes);
    header.x_size = x_size;
    header.y_size = y_size;
    header.x_pixel_size = info.x_pixel_size;
    header.y_pixel_size = info.y_pixel_size;
    header.n_spec_chans = n_spec_chans;
    header.start_time = info.start_time;
    header.stop_time = info.start_time;

    Ok(header)
}

fn dim_to_u32(
    what: &str,
    n: usize,
) -> PidbResult<u32> {
    u32::try_from(n).map_err(|_| PidbError::invalid_shape(format!("{what} {n} exceeds u32")))
}

/// Сверяет метаданные новой записи с зафиксированной схемой.
fn check_schema(
    header: &FileHeader,
    info: &IntegrationHeader,
    x_size: u32,
    y_size: u32,
    n_spec_chans: u32,
) -> PidbResult<()> {
    if let Some(station) = info.station.as_deref().filter(|s| !s.is_empty()) {
        if truncate_to_boundary(station, HEADER_STRING_SIZE) != header.station {
            return Err(PidbError::schema_mismatch("station", &header.station, station));
        }
    }

    if info.stokes_params != header.stokes_params {
        return Err(PidbError::schema_mismatch(
            "stokes_params",
            &header.stokes_params,
            &info.stokes_params,
        ));
    }

    if x_size != header.x_size {
        return Err(PidbError::schema_mismatch("width", header.x_size, x_size));
    }

    if y_size != header.y_size {
        return Err(PidbError::schema_mismatch("height", header.y_size, y_size));
    }

    if info.x_pixel_size != header.x_pixel_size {
        return Err(PidbError::schema_mismatch(
            "x_pixel_size",
            header.x_pixel_size,
            info.x_pixel_size,
        ));
    }

    if info.y_pixel_size != header.y_pixel_size {
        return Err(PidbError::schema_mismatch(
            "y_pixel_size",
            header.y_pixel_size,
            info.y_pixel_size,
        ));
    }

    if n_spec_chans != header.n_spec_chans {
        return Err(PidbError::schema_mismatch(
            "n_spec_chans",
            header.n_spec_chans,
            n_spec_chans,
        ));
    }

    Ok(())
}

////////////////////////////////////////////////////////////////////////////////
// Закрытие и доступ к состоянию
////////////////////////////////////////////////////////////////////////////////

impl Container {
    /// Закрывает файл, перезаписывая заголовок, если он менялся. Повторный
    /// вызов ничего не делает.
    ///
    /// Если перезапись не удалась, файл остаётся открытым, а заголовок
    /// грязным: следующий `close` повторит попытку.
    pub fn close(&mut self) -> PidbResult<()> {
        let Some(file) = self.file.as_mut() else {
            return Ok(());
        };

        if self.dirty {
            self.cursor_synced = false;

            if let HeaderState::Committed { header, codec } = &self.state {
                file.seek(SeekFrom::Start(FORMAT_TAG_SIZE as u64))?;
                file.write_all(&codec.layout().file_header.encode(header))?;
                file.flush()?;
                file.sync_data()?;

                debug!(
                    "{}: header rewritten (start={}, stop={}, sorted={})",
                    self.path.display(),
                    header.start_time,
                    header.stop_time,
                    header.is_sorted()
                );
            }
            self.dirty = false;
        }

        self.file = None;
        self.cursor_synced = false;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Текущий заголовок файла (до фиксации — только идентификация писателя).
    pub fn header(&self) -> &FileHeader {
        match &self.state {
            HeaderState::Uncommitted(h) => h,
            HeaderState::Committed { header, .. } => header,
        }
    }

    /// Кодек записей; `None`, пока схема не зафиксирована.
    pub fn codec(&self) -> Option<&RecordCodec> {
        match &self.state {
            HeaderState::Uncommitted(_) => None,
            HeaderState::Committed { codec, .. } => Some(codec),
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self.state, HeaderState::Committed { .. })
    }

    /// Версия формата файла.
    pub fn version(&self) -> FormatVersion {
        self.version
    }

    /// Количество записей.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_sorted(&self) -> bool {
        self.header().is_sorted()
    }

    /// Заголовок изменён в памяти и ещё не записан.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Смещение записи `index` от начала файла.
    pub fn record_offset(
        &self,
        index: usize,
    ) -> Option<u64> {
        self.codec().map(|c| {
            c.layout().data_offset() as u64 + index as u64 * c.record_size() as u64
        })
    }

    fn seek_to_end(&mut self) -> PidbResult<()> {
        let file = self.file.as_mut().ok_or(PidbError::Closed)?;
        file.seek(SeekFrom::End(0))?;
        self.cursor = self.len;
        self.cursor_synced = true;
        Ok(())
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("{}: failed to close container: {e}", self.path.display());
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для OpenMode
////////////////////////////////////////////////////////////////////////////////

impl std::fmt::Display for OpenMode {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            OpenMode::Read => write!(f, "r"),
            OpenMode::Write => write!(f, "w"),
            OpenMode::Append => write!(f, "a"),
        }
    }
}

impl std::str::FromStr for OpenMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "r" | "read" => Ok(OpenMode::Read),
            "w" | "write" => Ok(OpenMode::Write),
            "a" | "append" => Ok(OpenMode::Append),
            _ => Err(format!("Mode must be 'r', 'w', or 'a', got '{s}'")),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn info(t: f64) -> IntegrationHeader {
        IntegrationHeader {
            stokes_params: StokesParams::parse("I"),
            ..IntegrationHeader::new(t, 0.001)
        }
    }

    fn image(
        x: usize,
        y: usize,
    ) -> Array3<f32> {
        Array3::from_elem((1, x, y), 1.0)
    }

    #[test]
    fn test_open_mode_fromstr() {
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Read);
        assert_eq!("w".parse::<OpenMode>().unwrap(), OpenMode::Write);
        assert_eq!("append".parse::<OpenMode>().unwrap(), OpenMode::Append);
        assert!("x".parse::<OpenMode>().is_err());
        assert_eq!(OpenMode::Append.to_string(), "a");
    }

    #[test]
    fn test_write_mode_defers_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.pidb");
        let c = Container::open(&path, OpenMode::Write).unwrap();

        assert!(!c.is_committed());
        assert!(c.is_sorted(), "новый файл считается отсортированным");
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_first_image_commits_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commit.pidb");
        let mut c = Container::open_with(
            &path,
            OpenMode::Write,
            ContainerOptions {
                corr_version: "corr".into(),
                imager_version: "imager".into(),
                station: "LWA1".into(),
            },
        )
        .unwrap();

        assert_eq!(c.add_image(&info(10.0), &image(2, 2), None).unwrap(), 0);
        assert!(c.is_committed());
        assert_eq!(c.header().x_size, 2);
        assert_eq!(c.header().station, "LWA1");

        let expected = c.record_offset(1).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), expected);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ro.pidb");
        std::fs::write(&path, b"").unwrap();

        let mut c = Container::open(&path, OpenMode::Read).unwrap();
        let err = c.add_image(&info(1.0), &image(2, 2), None).unwrap_err();
        assert!(matches!(err, PidbError::ReadOnly));
    }

    #[test]
    fn test_stokes_count_must_match_image() {
        let dir = tempdir().unwrap();
        let mut c = Container::open(dir.path().join("s.pidb"), OpenMode::Write).unwrap();
        let mut i = info(1.0);
        i.stokes_params = StokesParams::parse("I,V");

        let err = c.add_image(&i, &image(2, 2), None).unwrap_err();
        assert!(matches!(err, PidbError::InvalidShape(_)));
        assert!(!c.is_committed());
    }

    #[test]
    fn test_sorted_flag_cleared_on_decrease() {
        let dir = tempdir().unwrap();
        let mut c = Container::open(dir.path().join("f.pidb"), OpenMode::Write).unwrap();

        c.add_image(&info(10.0), &image(2, 2), None).unwrap();
        c.add_image(&info(10.0), &image(2, 2), None).unwrap();
        assert!(c.is_sorted(), "равные времена не нарушают порядок");

        c.add_image(&info(20.0), &image(2, 2), None).unwrap();
        assert!(c.is_sorted());
        assert!(c.is_dirty());

        c.add_image(&info(15.0), &image(2, 2), None).unwrap();
        assert!(!c.is_sorted());
        assert_eq!(c.header().start_time, 10.0);
        assert_eq!(c.header().stop_time, 20.0);
    }

    #[test]
    fn test_failed_header_rewrite_keeps_container_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("retry.pidb");
        let mut c = Container::open(&path, OpenMode::Write).unwrap();
        c.add_image(&info(2.0), &image(2, 2), None).unwrap();
        c.add_image(&info(1.0), &image(2, 2), None).unwrap();
        assert!(c.is_dirty());

        // Дескриптор только для чтения: перезапись заголовка не пройдёт
        c.file = Some(File::open(&path).unwrap());
        assert!(c.close().is_err());
        assert!(!c.is_closed());
        assert!(c.is_dirty());
        assert!(c.close().is_err(), "повторный close снова сообщает об ошибке");

        c.file = Some(OpenOptions::new().write(true).open(&path).unwrap());
        c.close().unwrap();
        assert!(c.is_closed());

        let reopened = Container::open(&path, OpenMode::Read).unwrap();
        assert!(!reopened.is_sorted());
        assert_eq!(reopened.header().start_time, 1.0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut c = Container::open(dir.path().join("c.pidb"), OpenMode::Write).unwrap();
        c.add_image(&info(1.0), &image(2, 2), None).unwrap();

        c.close().unwrap();
        assert!(c.is_closed());
        c.close().unwrap();

        let err = c.add_image(&info(2.0), &image(2, 2), None).unwrap_err();
        assert!(matches!(err, PidbError::Closed));
    }
}
