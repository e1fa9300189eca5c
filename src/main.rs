// Record Transform Engine - Main executable
// Author: Gabriel Demetrios Lafis

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};

use anyhow::{Context, Result};
use clap::{Arg, Command};
use log::info;
use serde_json::Value as JsonValue;

use record_transform_engine::{
    data::{records_from_json, records_to_json},
    processing::Pipeline,
    utils::{init_logging, init_logging_from_config, parse_level, Config, PipelineConfig},
};

fn main() -> Result<()> {
    // Parse command line arguments
    let matches = Command::new("Record Transform Engine")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Gabriel Demetrios Lafis")
        .about("Runs a declarative transform pipeline over a JSON batch of records")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file (JSON or YAML)")
                .takes_value(true),
        )
        .arg(
            Arg::new("pipeline")
                .short('p')
                .long("pipeline")
                .value_name("FILE")
                .help("Pipeline definition (JSON or YAML)")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("FILE")
                .help("JSON array of records, '-' for stdin")
                .takes_value(true)
                .default_value("-"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Write the result here instead of stdout")
                .takes_value(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Overrides the configured log level")
                .takes_value(true),
        )
        .arg(
            Arg::new("with-metadata")
                .long("with-metadata")
                .help("Include record metadata in the output"),
        )
        .get_matches();

    // Load configuration
    let mut config = match matches.value_of("config") {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("failed to load config file {}", path))?,
        None => Config::default(),
    };

    // Initialize logging
    if let Some(level) = matches.value_of("log-level") {
        config.logging.level = level.to_string();
    }
    if config.logging.file.is_some() {
        init_logging_from_config(&config.logging)?;
    } else if let Err(err) = init_logging(parse_level(&config.logging.level)) {
        eprintln!("Error initializing logger: {}", err);
    }

    let pipeline_path = matches.value_of("pipeline").unwrap_or_default();
    let definition = PipelineConfig::from_file(pipeline_path)
        .with_context(|| format!("failed to load pipeline {}", pipeline_path))?;
    let pipeline = Pipeline::from_config(&definition, &config.engine);

    let input = read_input(matches.value_of("input").unwrap_or("-"))?;
    let records = records_from_json(&input).context("input is not a batch of records")?;

    info!(
        "Running pipeline '{}' ({} stages) on {} records",
        definition.name,
        pipeline.len(),
        records.len()
    );
    let result = pipeline.execute(&records)?;

    let output = if matches.is_present("with-metadata") {
        JsonValue::Array(result.iter().map(|r| r.to_json_with_metadata()).collect())
    } else {
        records_to_json(&result)
    };

    match matches.value_of("output") {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("failed to create {}", path))?;
            write_output(BufWriter::new(file), &output)?;
        }
        None => write_output(io::stdout().lock(), &output)?,
    }

    info!("Wrote {} records", result.len());
    Ok(())
}

fn read_input(path: &str) -> Result<JsonValue> {
    let mut contents = String::new();
    if path == "-" {
        io::stdin().read_to_string(&mut contents)?;
    } else {
        File::open(path)
            .with_context(|| format!("failed to open {}", path))?
            .read_to_string(&mut contents)?;
    }

    serde_json::from_str(&contents).context("input is not valid JSON")
}

fn write_output<W: Write>(mut writer: W, output: &JsonValue) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, output)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
