use std::{
    fs,
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::{debug, info};
use pidb_types::{PidbError, PidbResult};
use tempfile::NamedTempFile;

use crate::{
    container::{Container, OpenMode},
    format::{FormatVersion, FILE_IDENTITY_SIZE, FORMAT_TAG_SIZE},
    record::RecordCodec,
};

/// Итог сортировки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    /// Флаг сортировки уже стоял; файл не тронут
    AlreadySorted,
    /// Файл переписан в порядке возрастания времени начала
    Sorted {
        records: usize,
        upgraded_from: FormatVersion,
    },
}

/// Упорядочивает записи файла по времени начала и переписывает его в
/// последней версии формата.
///
/// Все записи читаются в память. Исходный файл заменяется только после того,
/// как временный файл рядом с ним полностью записан и синхронизирован.
pub fn sort<P: AsRef<Path>>(path: P) -> PidbResult<SortOutcome> {
    let path = path.as_ref();
    let mut container = Container::open(path, OpenMode::Read)?;

    if container.is_sorted() || !container.is_committed() {
        debug!("{}: already sorted", path.display());
        return Ok(SortOutcome::AlreadySorted);
    }

    let source = container
        .codec()
        .cloned()
        .ok_or(PidbError::EndOfContainer)?;
    let record_size = source.record_size();
    let count = container.len();

    let (raw_header, region) = read_raw(&mut container, &source)?;
    let original_version = container.version();

    let mut header = container.header().clone();
    header.set_sorted(true);
    container.close()?;

    let mut order: Vec<(usize, f64)> = region
        .chunks_exact(record_size)
        .map(|r| source.peek_start_time(r))
        .enumerate()
        .map(|(i, t)| t.map(|t| (i, t)))
        .collect::<PidbResult<_>>()?;

    // Устойчивая сортировка: равные времена сохраняют исходный порядок
    order.sort_by(|a, b| a.1.total_cmp(&b.1));

    let latest = FormatVersion::CURRENT;
    let target = RecordCodec::new(latest, &header)?;

    // Строки заголовка переносятся байт в байт, как и имена в записях
    let mut encoded_header = target.layout().file_header.encode(&header);
    encoded_header[..FILE_IDENTITY_SIZE].copy_from_slice(&raw_header[..FILE_IDENTITY_SIZE]);

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&latest.tag())?;
    tmp.write_all(&encoded_header)?;

    for &(i, _) in &order {
        let raw = &region[i * record_size..(i + 1) * record_size];

        if original_version == latest {
            tmp.write_all(raw)?;
        } else {
            tmp.write_all(&source.upgrade(raw, &target)?)?;
        }
    }

    tmp.flush()?;
    tmp.as_file().sync_all()?;
    fs::set_permissions(tmp.path(), fs::metadata(path)?.permissions())?;

    tmp.persist(path).map_err(|e| PidbError::Io(e.error))?;

    info!(
        "{}: sorted {count} records ({original_version} -> {latest})",
        path.display()
    );

    Ok(SortOutcome::Sorted {
        records: count,
        upgraded_from: original_version,
    })
}

/// Сырой заголовок файла и вся область записей; её длина должна быть N × R.
fn read_raw(
    container: &mut Container,
    codec: &RecordCodec,
) -> PidbResult<(Vec<u8>, Vec<u8>)> {
    let header_size = codec.layout().file_header.size();
    let expected = container.len() * codec.record_size();
    let start = codec.layout().data_offset() as u64;

    let file = container.file.as_mut().ok_or(PidbError::Closed)?;
    container.cursor_synced = false;
    file.seek(SeekFrom::Start(FORMAT_TAG_SIZE as u64))?;

    let mut header = vec![0u8; header_size];
    file.read_exact(&mut header)?;

    let mut region = Vec::with_capacity(expected);
    file.read_to_end(&mut region)?;

    if region.len() != expected {
        return Err(PidbError::CorruptContainer {
            size: start + region.len() as u64,
            header_size,
            record_size: codec.record_size(),
        });
    }

    debug!("read {header_size} + {expected} bytes (file size {})", start + expected as u64);
    Ok((header, region))
}
