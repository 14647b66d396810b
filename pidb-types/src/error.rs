use std::path::PathBuf;

use thiserror::Error;

/// Результат для операций PIDB
pub type PidbResult<T> = std::result::Result<T, PidbError>;

/// Типы ошибок контейнера PIDB.
#[derive(Debug, Error)]
pub enum PidbError {
    /// Файл для чтения не существует
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Начальная 16-байтовая метка не распознана
    #[error("Not a PasiImageDB file: unrecognized version tag {tag:?}")]
    NotAContainer { tag: String },

    /// Версия формата отсутствует в реестре
    #[error("Unknown format version: {0:?}")]
    UnknownVersion(String),

    /// Размер файла не равен 16 + H + N×R
    #[error(
        "Corrupted container: file size {size} is not 16 + {header_size} + N × {record_size}"
    )]
    CorruptContainer {
        size: u64,
        header_size: usize,
        record_size: usize,
    },

    /// Новая запись не совпадает со схемой, зафиксированной в заголовке
    #[error("Schema mismatch on '{field}': file has {expected}, image has {found}")]
    SchemaMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    /// Буфер короче, чем требует раскладка записи
    #[error("Truncated record: expected {expected} bytes, found {found}")]
    TruncatedRecord { expected: usize, found: usize },

    /// Индекс за пределами [-len, len)
    #[error("Index {index} outside of range [0, {len})")]
    IndexOutOfRange { index: isize, len: usize },

    /// Курсор прошёл последнюю запись
    #[error("End of container reached")]
    EndOfContainer,

    /// Форма изображения или спектра несовместима с метаданными
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// Запись в контейнер, открытый только для чтения
    #[error("Container is read-only")]
    ReadOnly,

    /// Операция над закрытым контейнером
    #[error("Container is closed")]
    Closed,

    /// Ошибки ввода/вывода (автоконвертируются из std::io::Error)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PidbError {
    /// Удобные конструкторы
    pub fn invalid_shape<S: Into<String>>(s: S) -> Self {
        Self::InvalidShape(s.into())
    }

    pub fn schema_mismatch<E: ToString, F: ToString>(
        field: &'static str,
        expected: E,
        found: F,
    ) -> Self {
        Self::SchemaMismatch {
            field,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Фатальна ли ошибка для текущего файла (в отличие от ошибок вызывающего).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PidbError::FileNotFound(_)
                | PidbError::NotAContainer { .. }
                | PidbError::UnknownVersion(_)
                | PidbError::CorruptContainer { .. }
                | PidbError::TruncatedRecord { .. }
                | PidbError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_message_names_field() {
        let e = PidbError::schema_mismatch("width", 2, 3);
        let msg = e.to_string();

        assert!(msg.contains("'width'"));
        assert!(msg.contains("file has 2"));
        assert!(msg.contains("image has 3"));
        assert!(!e.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        let corrupt = PidbError::CorruptContainer {
            size: 100,
            header_size: 112,
            record_size: 368,
        };

        assert!(corrupt.is_fatal());
        assert!(!PidbError::EndOfContainer.is_fatal());
        assert!(!PidbError::IndexOutOfRange { index: 5, len: 3 }.is_fatal());
    }
}
