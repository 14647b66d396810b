//! Пример: чтение PIDB-файла
//!
//! Демонстрирует:
//! - открытие контейнера и вывод заголовка
//! - итерацию записей через `records()`
//! - произвольный доступ с отрицательным индексом

use pidb_core::{Container, OpenMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let input_path = "pidb-core/test_output.pidb";

    let mut db = match Container::open(input_path, OpenMode::Read) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("✗ Cannot open container: {e}");
            return Err(Box::new(e));
        }
    };

    let h = db.header();
    println!("✓ {}", db.version());
    println!("  Station       : {}", h.station);
    println!("  Stokes        : {}", h.stokes_params);
    println!("  Image         : {} × {}", h.x_size, h.y_size);
    println!("  Spectrum      : {} chans", h.n_spec_chans);
    println!("  Time range    : {:.6} .. {:.6}", h.start_time, h.stop_time);
    println!("  Sorted        : {}", h.is_sorted());
    println!("  Records       : {}", db.len());

    println!("\nRecords:");
    for (i, record) in db.records().enumerate() {
        let r = record?;
        let peak = r.image.iter().cloned().fold(f32::MIN, f32::max);
        println!(
            "  [{i}] {:.6} {} peak={peak:.3}",
            r.header.start_time, r.header.vis_file_name
        );
    }

    let last = db.read(-1)?;
    println!("\nLast record: {}", last.header.vis_file_name);

    Ok(())
}
