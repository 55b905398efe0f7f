//! rig2jbeam - command-line converter
//!
//! Converts Rigs of Rods rig files to BeamNG JBeam and, optionally, the
//! meshes they reference to COLLADA.

mod config;
mod convert;
mod manifest;

use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use rig2jbeam_core::{ConversionSettings, ConvertOptions, CoordinateTransform};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::convert::{convert_document, print_report, RunOptions};
use crate::manifest::{DocumentEntry, DocumentStatus, OutputManifest, MANIFEST_FILE};

#[derive(Parser, Debug)]
#[command(name = "rig2jbeam")]
#[command(about = "Convert Rigs of Rods rig files to BeamNG JBeam")]
#[command(version)]
struct Args {
    /// Rig files to convert
    #[arg(required_unless_present = "init_config")]
    inputs: Vec<PathBuf>,

    /// Output directory (overrides the config file)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, default_value = "rig2jbeam.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Vehicle template applied on top of the configured settings
    #[arg(long)]
    template: Option<String>,

    /// Author for rigs without one, also written into COLLADA files
    #[arg(long)]
    author: Option<String>,

    /// Treat every warning as fatal
    #[arg(long)]
    strict: bool,

    /// Keep source coordinates
    #[arg(long)]
    no_transform: bool,

    /// Omit pos/rot/scale on flexbody and prop rows
    #[arg(long)]
    no_transform_properties: bool,

    /// Directory searched for referenced meshes
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Decode referenced meshes and export them as COLLADA
    #[arg(long)]
    convert_meshes: bool,

    /// Convert and report without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Write a default configuration file to --config and exit
    #[arg(long)]
    init_config: bool,
}

/// Config file settings with the template and flag overrides applied
fn build_settings(args: &Args, config: &Config) -> Result<ConversionSettings> {
    let mut settings = config.conversion.clone();
    if let Some(name) = &args.template {
        let index = config.template_index();
        index.apply(name, &mut settings).with_context(|| {
            format!(
                "available templates: {}",
                index.names().collect::<Vec<_>>().join(", ")
            )
        })?;
    }
    if let Some(author) = &args.author {
        settings.default_author = author.clone();
    }
    if args.strict {
        settings.strict_validation = true;
    }
    if args.no_transform {
        settings.transform = CoordinateTransform::Identity;
    }
    if args.no_transform_properties {
        settings.transform_properties = false;
    }
    Ok(settings)
}

fn build_run_options(args: &Args, config: &Config) -> RunOptions {
    RunOptions {
        output_dir: args
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output.dir)),
        asset_dir: args
            .assets
            .clone()
            .or_else(|| config.assets.dir.as_ref().map(PathBuf::from)),
        convert_meshes: args.convert_meshes || config.assets.convert_meshes,
        dry_run: args.dry_run,
        author: args.author.clone(),
    }
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("rig2jbeam v{}", env!("CARGO_PKG_VERSION"));

    if args.init_config {
        config::save_default_config(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(ExitCode::SUCCESS);
    }

    let config = config::load_config(&args.config)?;
    let options = ConvertOptions {
        settings: build_settings(&args, &config)?,
        ..ConvertOptions::default()
    };
    let run = build_run_options(&args, &config);

    info!(
        inputs = args.inputs.len(),
        output = %run.output_dir.display(),
        transform = ?options.settings.transform,
        convert_meshes = run.convert_meshes,
        dry_run = run.dry_run,
        "Configuration loaded"
    );

    if !run.dry_run {
        std::fs::create_dir_all(&run.output_dir)
            .with_context(|| format!("creating {}", run.output_dir.display()))?;
    }

    let results: Vec<Result<DocumentEntry>> = args
        .inputs
        .par_iter()
        .map(|input| convert_document(input, &options, &run))
        .collect();

    let mut documents = Vec::with_capacity(results.len());
    let mut errors = 0;
    for (input, result) in args.inputs.iter().zip(results) {
        match result {
            Ok(entry) => {
                print_report(&entry);
                documents.push(entry);
            }
            Err(err) => {
                error!(input = %input.display(), error = %format!("{:#}", err), "Conversion failed");
                println!("{}: FAILED ({:#})", input.display(), err);
                errors += 1;
            }
        }
    }

    let manifest = OutputManifest::new(documents);
    if !run.dry_run && config.output.write_manifest {
        let path = run.output_dir.join(MANIFEST_FILE);
        manifest.save(&path)?;
        info!(path = %path.display(), "Wrote manifest");
    }

    let failed = manifest.failed() + errors;
    let converted = manifest
        .documents
        .iter()
        .filter(|d| d.status == DocumentStatus::Converted)
        .count();
    println!("{} converted, {} failed", converted, failed);

    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "rig2jbeam",
            "car.truck",
            "--template",
            "TRUCK",
            "--author",
            "me",
            "--strict",
            "--no-transform",
            "--no-transform-properties",
        ]);
        let settings = build_settings(&args, &Config::default()).unwrap();
        assert_eq!(settings.minimum_mass, 100.0);
        assert_eq!(settings.default_author, "me");
        assert!(settings.strict_validation);
        assert_eq!(settings.transform, CoordinateTransform::Identity);
        assert!(!settings.transform_properties);
    }

    #[test]
    fn test_unknown_template_is_an_error() {
        let args = Args::parse_from(["rig2jbeam", "car.truck", "--template", "hovercraft"]);
        let err = build_settings(&args, &Config::default()).unwrap_err();
        assert!(format!("{:#}", err).contains("hovercraft"));
    }

    #[test]
    fn test_run_options_fall_back_to_config() {
        let mut config = Config::default();
        config.output.dir = "out".to_string();
        config.assets.dir = Some("meshes".to_string());

        let args = Args::parse_from(["rig2jbeam", "a.truck", "b.truck", "--convert-meshes", "--dry-run"]);
        let run = build_run_options(&args, &config);
        assert_eq!(args.inputs.len(), 2);
        assert_eq!(run.output_dir, PathBuf::from("out"));
        assert_eq!(run.asset_dir, Some(PathBuf::from("meshes")));
        assert!(run.convert_meshes);
        assert!(run.dry_run);

        let args = Args::parse_from(["rig2jbeam", "a.truck", "-o", "elsewhere", "--assets", "m2"]);
        let run = build_run_options(&args, &config);
        assert_eq!(run.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(run.asset_dir, Some(PathBuf::from("m2")));
        assert!(!run.convert_meshes);
    }

    #[test]
    fn test_init_config_needs_no_inputs() {
        let args = Args::parse_from(["rig2jbeam", "--init-config"]);
        assert!(args.init_config);
        assert!(args.inputs.is_empty());
    }
}
