use std::io::{Read, Seek, SeekFrom};

use log::debug;
use pidb_types::{PidbError, PidbResult};

use crate::{container::Container, record::IntegrationRecord};

impl Container {
    /// Индекс записи, которую вернёт следующий [`read_next`](Self::read_next).
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn at_end(&self) -> bool {
        self.cursor >= self.len
    }

    /// Ставит курсор на запись `index`. Отрицательный индекс считается от
    /// конца (`-1` — последняя запись).
    pub fn seek(
        &mut self,
        index: isize,
    ) -> PidbResult<()> {
        let target = self.resolve_index(index)?;

        if target == self.cursor && self.cursor_synced {
            return Ok(());
        }

        let offset = self.record_offset(target).ok_or(PidbError::IndexOutOfRange {
            index,
            len: self.len,
        })?;

        let file = self.file.as_mut().ok_or(PidbError::Closed)?;
        file.seek(SeekFrom::Start(offset))?;

        debug!("seek to record {target} (offset {offset})");

        self.cursor = target;
        self.cursor_synced = true;
        Ok(())
    }

    /// Читает запись под курсором и сдвигает курсор на одну.
    pub fn read_next(&mut self) -> PidbResult<IntegrationRecord> {
        if self.file.is_none() {
            return Err(PidbError::Closed);
        }
        if self.at_end() {
            return Err(PidbError::EndOfContainer);
        }

        if !self.cursor_synced {
            self.seek(self.cursor as isize)?;
        }

        let record_size = self
            .codec()
            .map(|c| c.record_size())
            .ok_or(PidbError::EndOfContainer)?;

        let file = self.file.as_mut().ok_or(PidbError::Closed)?;
        let mut buf = Vec::with_capacity(record_size);
        let n = file.by_ref().take(record_size as u64).read_to_end(&mut buf)?;

        if n < record_size {
            // Положение дескриптора больше не совпадает с курсором
            self.cursor_synced = false;
            return Err(PidbError::TruncatedRecord {
                expected: record_size,
                found: n,
            });
        }

        self.cursor += 1;

        let codec = self.codec().ok_or(PidbError::EndOfContainer)?;
        codec.decode(&buf)
    }

    /// Произвольный доступ: `seek(index)` + `read_next()`.
    pub fn read(
        &mut self,
        index: isize,
    ) -> PidbResult<IntegrationRecord> {
        self.seek(index)?;
        self.read_next()
    }

    /// Итератор по записям от курсора до конца.
    pub fn records(&mut self) -> Records<'_> {
        Records {
            container: self,
            done: false,
        }
    }

    /// Читает все оставшиеся записи в вектор.
    pub fn read_all(&mut self) -> PidbResult<Vec<IntegrationRecord>> {
        self.records().collect()
    }

    fn resolve_index(
        &self,
        index: isize,
    ) -> PidbResult<usize> {
        let len = self.len as isize;
        let resolved = if index < 0 { index + len } else { index };

        if resolved < 0 || resolved >= len {
            return Err(PidbError::IndexOutOfRange {
                index,
                len: self.len,
            });
        }

        Ok(resolved as usize)
    }
}

/// Итератор по записям контейнера; после первой ошибки останавливается.
pub struct Records<'a> {
    container: &'a mut Container,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = PidbResult<IntegrationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.container.at_end() {
            return None;
        }

        let item = self.container.read_next();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.done {
            return (0, Some(0));
        }
        let left = self.container.len().saturating_sub(self.container.position());
        (0, Some(left))
    }
}

impl std::iter::FusedIterator for Records<'_> {}
