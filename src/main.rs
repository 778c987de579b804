//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, Context};
use clap::{crate_version, Arg, ArgMatches, Command};
use rpnc::CompileOptions;
use tracing::{info, Level};

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
    process,
};

fn main() -> anyhow::Result<()> {
    // Parsing de CLI
    let args = Command::new("rpnc")
        .version(crate_version!())
        .about("RPN to AVR ATmega328P compiler")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required(true)
                .help("Source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output assembly file (default: INPUT with .asm extension)"),
        )
        .arg(
            Arg::new("no-cast")
                .long("no-cast")
                .help("Disable automatic INT to FLOAT promotion"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .multiple_occurrences(true)
                .help("Increase log verbosity"),
        )
        .get_matches();

    init_logging(&args);

    // `required(true)` garantiza la presencia de la entrada
    let input = PathBuf::from(args.value_of("input").unwrap_or_default());
    let output = match args.value_of("output") {
        Some(path) => PathBuf::from(path),
        None => input.with_extension("asm"),
    };

    let mut options = CompileOptions::empty();
    if args.is_present("no-cast") {
        options |= CompileOptions::STRICT_TYPES;
    }

    let file = File::open(&input)
        .with_context(|| format!("Failed to open for reading: {}", input.display()))?;

    let name = input.display().to_string();
    let program = match rpnc::compile(BufReader::new(file), &name, options) {
        Ok(program) => program,
        Err(diagnostics) => {
            eprint!("{}", diagnostics);
            process::exit(1);
        }
    };

    write_output(&program, &output)?;
    info!(
        lines = program.lines,
        temporaries = program.temporaries,
        "wrote {}",
        output.display()
    );

    Ok(())
}

/// Configura la bitácora en stderr según la cantidad de `-v`.
fn init_logging(args: &ArgMatches) {
    let level = match args.occurrences_of("verbose") {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn write_output(program: &rpnc::ir::Program, path: &Path) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to open for writing: {}", path.display()))?;

    let mut writer = BufWriter::new(file);
    program
        .write_asm(&mut writer)
        .and_then(|()| writer.flush())
        .with_context(|| format!("Failed to emit to file: {}", path.display()))
}
