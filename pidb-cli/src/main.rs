use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{debug, error, info, LevelFilter};
use pidb_core::{sort, Container, OpenMode, SortOutcome};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(
    name = "pidb",
    version = env!("CARGO_PKG_VERSION"),
    about = "Inspect, verify and sort PasiImageDB image containers",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Подробный вывод (debug)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Тихий режим (только ошибки)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show format version, file header and record geometry
    Info {
        file: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// One line per record: index, start time, length, frequency, source file
    List { file: PathBuf },
    /// Order records by start time (rewrites the file in the latest version)
    Sort { file: PathBuf },
    /// Read every record and check header time bounds and the sorted flag
    Verify { file: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    let level = if cli.quiet {
        LevelFilter::Error
    } else if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .format_timestamp_secs()
        .init();

    let result = match &cli.command {
        Command::Info { file, json } => info_cmd(file, *json).map(|_| true),
        Command::List { file } => list_cmd(file).map(|_| true),
        Command::Sort { file } => sort_cmd(file).map(|_| true),
        Command::Verify { file } => verify_cmd(file),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

fn open(path: &Path) -> anyhow::Result<Container> {
    Container::open(path, OpenMode::Read).with_context(|| format!("cannot open {}", path.display()))
}

fn info_cmd(
    path: &Path,
    as_json: bool,
) -> anyhow::Result<()> {
    let db = open(path)?;
    let h = db.header();
    let record_size = db.codec().map_or(0, |c| c.record_size());

    if as_json {
        let report = json!({
            "file": path.display().to_string(),
            "version": db.version().tag_str(),
            "records": db.len(),
            "record_size": record_size,
            "header": h,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", path.display());
    println!("  Version        : {}", db.version());
    println!("  Records        : {}", db.len());
    println!("  Record size    : {record_size} B");
    println!("  Correlator     : {}", h.corr_version);
    println!("  Imager         : {}", h.imager_version);
    println!("  Station        : {}", h.station);
    println!("  Stokes         : {}", h.stokes_params);
    println!("  Image          : {} × {} px", h.x_size, h.y_size);
    println!("  Pixel size     : {} × {} deg", h.x_pixel_size, h.y_pixel_size);
    println!("  Spectrum chans : {}", h.n_spec_chans);
    println!("  Start (MJD)    : {:.6}", h.start_time);
    println!("  Stop (MJD)     : {:.6}", h.stop_time);
    println!("  Sorted         : {}", h.is_sorted());

    Ok(())
}

fn list_cmd(path: &Path) -> anyhow::Result<()> {
    let mut db = open(path)?;

    for (i, record) in db.records().enumerate() {
        let r = record.with_context(|| format!("record {i}"))?;
        let h = &r.header;

        println!(
            "{i:>6}  {:.6}  {:>8.3} s  {:>9.3} MHz  {}",
            h.start_time,
            h.int_len * 86_400.0,
            h.freq / 1e6,
            h.vis_file_name
        );
    }

    Ok(())
}

fn sort_cmd(path: &Path) -> anyhow::Result<()> {
    match sort(path).with_context(|| format!("cannot sort {}", path.display()))? {
        SortOutcome::AlreadySorted => info!("{}: already sorted", path.display()),
        SortOutcome::Sorted {
            records,
            upgraded_from,
        } => info!(
            "✓ {}: {records} records sorted (written from {upgraded_from})",
            path.display()
        ),
    }
    Ok(())
}

fn verify_cmd(path: &Path) -> anyhow::Result<bool> {
    let problems = verify(path)?;

    if problems.is_empty() {
        info!("✓ {}: OK", path.display());
        return Ok(true);
    }

    for p in &problems {
        error!("✗ {p}");
    }
    Ok(false)
}

/// Проверяет файл целиком. Возвращает список найденных нарушений.
fn verify(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut db = open(path)?;
    let header = db.header().clone();
    let mut problems = Vec::new();
    let mut previous: Option<f64> = None;

    for (i, record) in db.records().enumerate() {
        let t = match record {
            Ok(r) => r.header.start_time,
            Err(e) => {
                problems.push(format!("record {i}: {e}"));
                break;
            }
        };

        if t < header.start_time || t > header.stop_time {
            problems.push(format!(
                "record {i}: start {t} outside header bounds [{}, {}]",
                header.start_time, header.stop_time
            ));
        }

        if header.is_sorted() && previous.is_some_and(|p| t < p) {
            problems.push(format!("record {i}: start {t} breaks the sorted flag"));
        }

        previous = Some(t);
    }

    debug!("{}: {} problems", path.display(), problems.len());
    Ok(problems)
}

#[cfg(test)]
mod tests {
    use ndarray::Array3;
    use pidb_types::IntegrationHeader;
    use tempfile::tempdir;

    use super::*;

    fn write(
        path: &Path,
        times: &[f64],
    ) {
        let mut db = Container::open(path, OpenMode::Write).unwrap();
        for &t in times {
            db.add_image(&IntegrationHeader::new(t, 0.001), &Array3::zeros((1, 2, 2)), None)
                .unwrap();
        }
        db.close().unwrap();
    }

    #[test]
    fn test_verify_clean_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ok.pidb");
        write(&path, &[3.0, 1.0, 2.0]);

        assert!(verify(&path).unwrap().is_empty());
    }

    #[test]
    fn test_verify_detects_false_sorted_flag() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lie.pidb");
        write(&path, &[1.0, 2.0]);

        // Меняем местами время записей, не трогая флаг
        let mut raw = std::fs::read(&path).unwrap();
        let first = 16 + 112 + 256;
        let second = first + 352 + 16;
        let (a, b) = (raw[first..first + 8].to_vec(), raw[second..second + 8].to_vec());
        raw[first..first + 8].copy_from_slice(&b);
        raw[second..second + 8].copy_from_slice(&a);
        std::fs::write(&path, raw).unwrap();

        let problems = verify(&path).unwrap();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("sorted flag"));
    }

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["pidb", "info", "a.pidb", "--json", "-v"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Info { json: true, .. }));

        assert!(Cli::try_parse_from(["pidb", "-v", "-q", "list", "a.pidb"]).is_err());
    }
}
