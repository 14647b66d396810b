//! Библиотека контейнера PasiImageDB
//!
//! Хранение серий изображений неба (по одному на интеграцию) в одном
//! бинарном файле: метка версии, заголовок файла и записи фиксированного
//! размера. Поддерживаются версии v1–v3; новые файлы пишутся в последней.
//!
//! # Быстрый старт
//!
//! ```no_run
//! use ndarray::Array3;
//! use pidb_core::{sort, Container, OpenMode};
//! use pidb_types::{IntegrationHeader, StokesParams};
//!
//! let mut db = Container::open("sky.pidb", OpenMode::Write)?;
//!
//! let mut info = IntegrationHeader::new(60_000.5, 5.0 / 86_400.0);
//! info.stokes_params = StokesParams::parse("I,V");
//! db.add_image(&info, &Array3::zeros((2, 128, 128)), None)?;
//! db.close()?;
//!
//! sort("sky.pidb")?;
//!
//! let mut db = Container::open("sky.pidb", OpenMode::Read)?;
//! for record in db.records() {
//!     println!("{}", record?.header.start_time);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod binary;
pub mod container;
pub mod cursor;
pub mod format;
pub mod record;
pub mod sort;

pub use container::{Container, ContainerOptions, OpenMode};
pub use cursor::Records;
pub use format::{layout_for, layout_for_tag, FormatVersion, Layout};
pub use record::{record_size, IntegrationRecord, RecordCodec};
pub use sort::{sort, SortOutcome};

/// Версия библиотеки.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
