use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Report, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use vulnsynth::{
    diagnostics::{compile_report, io_report, manifest_report, synth_report},
    project::{find_manifest, Manifest},
    SynthOptions, Synthesizer, Variant,
};

#[derive(Parser)]
#[command(name = "vulnsynth")]
#[command(about = "Synthesize C program variants from a chunk/block description")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Debug logging (overridden by VULNSYNTH_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate C source from a JSON program description
    Synth(SynthArgs),
}

#[derive(clap::Args)]
struct SynthArgs {
    /// Program description
    input: PathBuf,

    /// Manifest to read instead of a vulnsynth.toml next to the input
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the first variant
    #[arg(long)]
    seed: Option<u64>,

    /// Number of variants to generate
    #[arg(long)]
    count: Option<usize>,

    /// Directory receiving `<stem>_<n>.c` files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Disable decoy injection
    #[arg(long)]
    no_nops: bool,

    /// Probability of wrapping a call in a decoy
    #[arg(long, value_parser = parse_probability)]
    nop_probability: Option<f64>,

    /// Formatter command each variant is piped through
    #[arg(long = "format")]
    formatter: Option<String>,
}

/// Manifest values with command line overrides applied.
struct Settings {
    options: SynthOptions,
    count: usize,
    output: Option<PathBuf>,
    formatter: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Synth(args) => synth(args),
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("VULNSYNTH_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_probability(text: &str) -> std::result::Result<f64, String> {
    let value: f64 = text.parse().map_err(|err| format!("{err}"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not within 0..=1"))
    }
}

fn settings(args: &SynthArgs) -> Result<Settings> {
    let manifest_path = args.config.clone().or_else(|| find_manifest(&args.input));
    let manifest = match &manifest_path {
        Some(path) => {
            info!(path = %path.display(), "loading manifest");
            Manifest::load(path).map_err(manifest_report)?
        }
        None => Manifest::default(),
    };
    let nops = manifest.nops.enabled && !args.no_nops;
    Ok(Settings {
        options: SynthOptions {
            seed: args.seed.or(manifest.synth.seed),
            nops,
            nop_probability: args.nop_probability.unwrap_or(manifest.nops.probability),
        },
        count: args.count.unwrap_or(manifest.synth.count),
        output: args.output.clone().or(manifest.output.directory),
        formatter: args.formatter.clone().or(manifest.output.formatter),
    })
}

fn synth(args: SynthArgs) -> Result<()> {
    let settings = settings(&args)?;
    let source = fs::read_to_string(&args.input).map_err(|err| io_report(&args.input, err))?;

    let synthesizer = Synthesizer::new().map_err(|err| synth_report(&args.input, err))?;
    let graph = synthesizer
        .compile(&source)
        .map_err(|err| compile_report(&args.input, &source, err))?;
    debug!(blocks = graph.blocks.len(), chunks = graph.chunks.len(), "compiled input");

    let mut variants = synthesizer
        .variants(&graph, &settings.options, settings.count.max(1))
        .map_err(|err| synth_report(&args.input, err))?;
    if let Some(command) = &settings.formatter {
        for variant in &mut variants {
            variant.source = format_source(command, &variant.source)?;
        }
    }

    match &settings.output {
        None if variants.len() == 1 => {
            print!("{}", variants[0].source);
            Ok(())
        }
        None => write_variants(Path::new("."), &args.input, &variants),
        Some(directory) => write_variants(directory, &args.input, &variants),
    }
}

fn write_variants(directory: &Path, input: &Path, variants: &[Variant]) -> Result<()> {
    fs::create_dir_all(directory).map_err(|err| io_report(directory, err))?;
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "variant".into());
    for (index, variant) in variants.iter().enumerate() {
        let path = directory.join(format!("{stem}_{}.c", index + 1));
        fs::write(&path, &variant.source).map_err(|err| io_report(&path, err))?;
        info!(path = %path.display(), seed = variant.seed, "wrote variant");
    }
    Ok(())
}

fn format_source(command: &str, source: &str) -> Result<String> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| Report::msg("formatter command is empty"))?;
    let mut child = Command::new(program)
        .args(parts)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| Report::msg(format!("failed to run formatter `{program}`: {err}")))?;
    let stdin = child.stdin.take();
    let output = thread::scope(|scope| -> Result<_> {
        let writer = scope.spawn(move || match stdin {
            Some(mut stdin) => stdin.write_all(source.as_bytes()),
            None => Ok(()),
        });
        let output = child.wait_with_output().into_diagnostic()?;
        let written = writer
            .join()
            .map_err(|_| Report::msg("formatter input writer panicked"))?;
        if output.status.success() {
            written.into_diagnostic()?;
        }
        Ok(output)
    })?;
    if !output.status.success() {
        return Err(Report::msg(format!(
            "formatter `{program}` failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    String::from_utf8(output.stdout).into_diagnostic()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatter_output_larger_than_a_pipe_buffer_is_read() {
        let source = "int counter;\n".repeat(40_000);
        let formatted = format_source("cat", &source).expect("format");
        assert_eq!(formatted, source);
    }

    #[test]
    fn empty_formatter_command_is_rejected() {
        assert!(format_source("  ", "int x;\n").is_err());
    }
}
