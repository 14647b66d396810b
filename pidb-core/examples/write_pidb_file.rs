//! Пример: запись PIDB-файла с синтетическими изображениями
//!
//! Демонстрирует:
//! - создание контейнера с идентификацией писателя
//! - фиксацию схемы первой записью
//! - запись интеграций не по порядку и последующую сортировку

use ndarray::Array3;
use pidb_core::{sort, Container, ContainerOptions, OpenMode, SortOutcome};
use pidb_types::{IntegrationHeader, StokesParams};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_path = "pidb-core/test_output.pidb";

    let options = ContainerOptions {
        corr_version: "demo-corr".into(),
        imager_version: "demo-imager".into(),
        station: "LWA1".into(),
    };
    let mut db = Container::open_with(output_path, OpenMode::Write, options)?;

    // --- Синтетическое небо: гауссов источник, дрейфующий по изображению ---
    let side = 64;
    let int_len = 5.0 / 86_400.0;
    let order = [3usize, 0, 1, 4, 2];

    for &step in &order {
        let cx = 16.0 + 8.0 * step as f32;
        let image = Array3::from_shape_fn((2, side, side), |(s, x, y)| {
            let r2 = (x as f32 - cx).powi(2) + (y as f32 - 32.0).powi(2);
            let flux = (-r2 / 18.0).exp();
            if s == 0 { flux } else { 0.05 * flux }
        });
        let spectrum: Vec<f32> = (0..32).map(|c| 1.0 - c as f32 / 64.0).collect();

        let info = IntegrationHeader {
            vis_file_name: format!("demo_{step:03}.dat"),
            freq: 74.0e6,
            bandwidth: 100.0e3,
            stokes_params: StokesParams::parse("I,V"),
            x_pixel_size: 1.8,
            y_pixel_size: 1.8,
            ..IntegrationHeader::new(60_000.0 + step as f64 * int_len, int_len)
        };

        let index = db.add_image(&info, &image, Some(&spectrum))?;
        println!("Record {index}: step {step}, source at x={cx}");
    }

    println!("\nSorted flag after writing: {}", db.is_sorted());
    db.close()?;

    match sort(output_path)? {
        SortOutcome::AlreadySorted => println!("✓ Already sorted"),
        SortOutcome::Sorted { records, .. } => println!("✓ Sorted {records} records"),
    }

    println!("✓ Записано: {output_path}");
    Ok(())
}
