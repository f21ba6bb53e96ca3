use anyhow::{bail, Context, Result};
use attend_core::{encode_file, FaceDescriptor, IdentityId, OnnxFaceExtractor};
use attend_engine::Engine;
use attend_store::Store;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;
mod roster;

use config::Config;
use roster::{Roster, ScanOutput};

#[derive(Parser)]
#[command(name = "attend", about = "Classroom attendance from recorded video")]
struct Cli {
    /// TOML configuration file (defaults to $ATTEND_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enrollment database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Directory holding det_10g.onnx and w600k_r50.onnx
    #[arg(long, global = true)]
    models: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a student from one or more face photos
    Enroll {
        /// Student ID
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        /// Roll number, unique per student
        #[arg(long)]
        roll: String,
        /// Face photos (one student per photo)
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// List enrolled students
    List,
    /// Remove a student and all of their face encodings
    Remove {
        /// Student ID to remove
        id: String,
    },
    /// Recognize students in a video and print the attendance roster
    Scan {
        video: PathBuf,
        /// Examine one frame out of every N
        #[arg(long)]
        interval: Option<usize>,
        /// Maximum descriptor distance for a match
        #[arg(long)]
        tolerance: Option<f64>,
        /// Extraction worker threads
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(models) = cli.models {
        config.model_dir = models;
    }

    match cli.command {
        Commands::Enroll {
            id,
            name,
            roll,
            images,
        } => enroll(&config, IdentityId::new(id), &name, &roll, &images),
        Commands::List => list(&config),
        Commands::Remove { id } => remove(&config, &IdentityId::new(id)),
        Commands::Scan {
            video,
            interval,
            tolerance,
            workers,
        } => {
            if let Some(tolerance) = tolerance {
                config.engine.tolerance = tolerance;
            }
            if let Some(workers) = workers {
                config.engine.workers = workers;
            }
            let interval = interval.unwrap_or(config.engine.frame_interval);
            let interval =
                NonZeroUsize::new(interval).context("frame interval must be at least 1")?;
            scan(&config, &video, interval)
        }
    }
}

fn open_store(config: &Config) -> Result<Store> {
    Store::open(&config.db_path)
        .with_context(|| format!("cannot open database {}", config.db_path.display()))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn enroll(
    config: &Config,
    id: IdentityId,
    name: &str,
    roll: &str,
    images: &[PathBuf],
) -> Result<()> {
    let mut extractor = OnnxFaceExtractor::from_model_dir(&config.model_dir)
        .with_context(|| format!("cannot load models from {}", config.model_dir.display()))?;

    let mut descriptors: Vec<FaceDescriptor> = Vec::new();
    let mut skipped: Vec<String> = Vec::new();
    for image in images {
        match encode_file(&mut extractor, image) {
            Ok(Some(enrollment)) => {
                if enrollment.is_ambiguous() {
                    tracing::warn!(
                        image = %image.display(),
                        faces = enrollment.faces_detected,
                        "several faces in enrollment photo; kept the most confident"
                    );
                }
                descriptors.push(enrollment.descriptor);
            }
            Ok(None) => {
                tracing::warn!(image = %image.display(), "no face found; photo skipped");
                skipped.push(image.display().to_string());
            }
            Err(e) => {
                tracing::warn!(
                    image = %image.display(),
                    error = %e,
                    "photo could not be encoded; skipped"
                );
                skipped.push(image.display().to_string());
            }
        }
    }

    if descriptors.is_empty() {
        bail!("no face found in any photo for student {id}");
    }

    let mut store = open_store(config)?;
    let enrolled = store.enroll(&id, name, roll, &descriptors)?;
    let existing = &enrolled.student;
    if !enrolled.created && (existing.name != name || existing.roll_number != roll) {
        tracing::warn!(
            student = %id,
            enrolled_name = %existing.name,
            enrolled_roll = %existing.roll_number,
            "student already enrolled with different details; kept the stored ones"
        );
    }

    print_json(&json!({
        "student_id": id,
        "created": enrolled.created,
        "stored": enrolled.stored,
        "skipped": skipped,
        "total_encodings": store.encoding_count(&id)?,
    }))
}

fn list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut rows = Vec::new();
    for student in store.students()? {
        rows.push(json!({
            "student_id": student.id,
            "name": student.name,
            "roll_number": student.roll_number,
            "encodings": store.encoding_count(&student.id)?,
            "created_at": student.created_at,
        }));
    }
    print_json(&rows)
}

fn remove(config: &Config, id: &IdentityId) -> Result<()> {
    let store = open_store(config)?;
    if !store.remove_student(id)? {
        bail!("no student with id {id}");
    }
    print_json(&json!({ "removed": id }))
}

fn scan(config: &Config, video: &Path, interval: NonZeroUsize) -> Result<()> {
    let store = open_store(config)?;
    let mut engine =
        Engine::from_model_dir(&config.model_dir, config.engine.clone()).with_context(|| {
            format!(
                "cannot start recognition with models from {}",
                config.model_dir.display()
            )
        })?;

    let report = engine
        .process(video, &store, interval)
        .with_context(|| format!("recognition failed for {}", video.display()))?;

    let roster = Roster::build(&store.students()?, &report.present);
    print_json(&ScanOutput { roster, run: &report })
}
