use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{CommandFactory, Parser, Subcommand};
use log::{LevelFilter, debug, info};

use markie_live::classify::classify_with_rule;
use markie_live::config::{AiConfig, Settings};
use markie_live::diagnostic::{Locale, format_error_display_localized};
use markie_live::engine::{EngineKind, RenderEngine, RenderOptions, build_engine};
use markie_live::export::{ExportFormat, ExportRequest, ExportSource, Exporter};
use markie_live::render::RenderAdapter;
use markie_live::repair::{ProviderKind, ProviderRegistry, Repairer};
use markie_live::{ColorScheme, ContentKind, Error};

/// Live preview core for Mermaid diagrams and Markdown
#[derive(Parser, Debug)]
#[command(name = "markie-live", version)]
#[command(about = "Classify, render, export and repair Mermaid diagrams and Markdown", long_about = None)]
struct Args {
    /// Settings file (TOML or YAML)
    #[arg(short, long, global = true, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Rendering engine, overriding the settings file
    #[arg(long, global = true, value_enum)]
    engine: Option<EngineKind>,

    /// Language of diagnostics, overriding the settings file
    #[arg(long, global = true, value_enum)]
    locale: Option<Locale>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Report whether the input is a diagram, rich text or unknown
    Classify {
        /// Input file (use "-" for stdin)
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Render a diagram to SVG
    Render {
        input: PathBuf,
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = ColorScheme::Light)]
        scheme: ColorScheme,
    },
    /// Export a diagram (PNG, JPEG, PDF) or rich text (HTML)
    Export {
        input: PathBuf,
        #[arg(short, long, value_enum)]
        format: ExportFormat,
        /// Output path; defaults to a timestamped name in the current directory
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = ColorScheme::Light)]
        scheme: ColorScheme,
    },
    /// Render and explain any error
    Diagnose {
        input: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Ask an AI provider to repair a diagram that fails to render
    Fix {
        input: PathBuf,
        #[command(flatten)]
        ai: AiArgs,
        /// Write the corrected source here instead of stdout
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },
    /// Ask an AI provider to explain a diagram
    Explain {
        input: PathBuf,
        #[command(flatten)]
        ai: AiArgs,
    },
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug)]
struct AiArgs {
    /// AI configuration JSON file
    #[arg(long, value_name = "AI_CONFIG")]
    ai_config: Option<PathBuf>,

    /// Provider to use, overriding the configuration
    #[arg(long, value_enum)]
    provider: Option<ProviderKind>,
}

fn main() -> Result<(), String> {
    let args = Args::parse();

    let log_level = LevelFilter::from_str(&args.log_level).unwrap_or_else(|_| {
        eprintln!("Invalid log level: {}. Using 'warn' instead.", args.log_level);
        LevelFilter::Warn
    });
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(log_level)
        .init();
    debug!(args:?; "Parsed arguments");

    run(args).map_err(|e| e.to_string())
}

fn run(args: Args) -> Result<(), Error> {
    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    if let Some(engine) = args.engine {
        settings.render.engine = engine;
    }
    if let Some(locale) = args.locale {
        settings.render.locale = locale;
    }

    match args.command {
        Command::Classify { input, json } => {
            let text = read_input(&input)?;
            let classification = classify_with_rule(&text);
            if json {
                println!("{}", to_json(&classification)?);
            } else {
                println!("{}", classification.kind);
            }
        }
        Command::Render {
            input,
            output,
            scheme,
        } => {
            let text = read_input(&input)?;
            let adapter = adapter(&settings)?;
            let rendered = adapter.render("cli", &text, &RenderOptions { color_scheme: scheme })?;
            write_output(&output, rendered.surface.svg().as_bytes())?;
            eprintln!("SVG saved to: {}", output.display());
        }
        Command::Export {
            input,
            format,
            output,
            scheme,
        } => {
            let text = read_input(&input)?;
            let exporter = Exporter::new(settings.export.clone());
            let request = ExportRequest {
                format,
                color_scheme: scheme,
            };

            let kind = classify_with_rule(&text).kind;
            format.ensure_offered(kind)?;
            let artifact = match kind {
                ContentKind::RichText => exporter.export(ExportSource::RichText(&text), request)?,
                _ => {
                    let adapter = adapter(&settings)?;
                    let rendered =
                        adapter.render("cli", &text, &RenderOptions { color_scheme: scheme })?;
                    exporter.export(ExportSource::Diagram(&rendered.surface), request)?
                }
            };

            let output = output.unwrap_or_else(|| PathBuf::from(&artifact.suggested_filename));
            write_output(&output, &artifact.bytes)?;
            eprintln!("{} saved to: {}", format, output.display());
        }
        Command::Diagnose { input, json } => {
            let text = read_input(&input)?;
            let adapter = adapter(&settings)?;
            match adapter.render("cli", &text, &RenderOptions::default()) {
                Ok(_) => println!("OK"),
                Err(failure) => {
                    let display = format_error_display_localized(
                        &failure.diagnostic(),
                        &text,
                        settings.render.locale,
                    );
                    if json {
                        println!("{}", to_json(&display)?);
                    } else {
                        print_display(&failure.summary, &display);
                    }
                }
            }
        }
        Command::Fix { input, ai, output } => {
            let text = read_input(&input)?;
            let adapter = adapter(&settings)?;
            let failure = match adapter.render("cli", &text, &RenderOptions::default()) {
                Ok(_) => {
                    eprintln!("Diagram renders without errors; nothing to fix.");
                    return Ok(());
                }
                Err(failure) => failure,
            };

            let (config, provider) = provider(&settings, &ai)?;
            let repairer = Repairer::new(config.prompt.clone());
            let corrected = repairer.repair(&text, &failure.diagnostic(), provider.as_ref())?;

            if let Err(still) = adapter.render("cli-fixed", &corrected, &RenderOptions::default())
            {
                eprintln!("Warning: corrected source still fails to render: {}", still);
            }
            match output {
                Some(path) => {
                    write_output(&path, corrected.as_bytes())?;
                    eprintln!("Corrected source saved to: {}", path.display());
                }
                None => println!("{corrected}"),
            }
        }
        Command::Explain { input, ai } => {
            let text = read_input(&input)?;
            let (_, provider) = provider(&settings, &ai)?;
            println!("{}", Repairer::default().explain(&text, provider.as_ref())?);
        }
        Command::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Args::command(),
                "markie-live",
                &mut std::io::stdout(),
            );
        }
    }

    info!("Completed successfully");
    Ok(())
}

fn adapter(
    settings: &Settings,
) -> Result<RenderAdapter<Box<dyn RenderEngine + Send + Sync>>, Error> {
    let engine = build_engine(
        settings.render.engine,
        &settings.render.command,
        &settings.render.command_args,
    )
    .map_err(Error::Other)?;
    debug!(engine = engine.name(); "Selected rendering engine");
    Ok(RenderAdapter::new(
        engine,
        settings.render.locale,
        settings.render.cache_capacity,
    ))
}

fn provider(
    settings: &Settings,
    ai: &AiArgs,
) -> Result<(AiConfig, std::sync::Arc<dyn markie_live::ChatProvider>), Error> {
    let mut config = match (&ai.ai_config, &settings.ai) {
        (Some(path), _) => AiConfig::load(path)?,
        (None, Some(config)) => config.clone(),
        (None, None) => {
            return Err(Error::Other(
                "No AI configuration: pass --ai-config or add an [ai] section to the settings"
                    .to_string(),
            ));
        }
    };
    if let Some(kind) = ai.provider {
        config.provider = kind;
    }

    let registry = ProviderRegistry::new([config.clone()]);
    let provider = registry.get(config.provider)?;
    Ok((config, provider))
}

fn print_display(summary: &str, display: &markie_live::ErrorDisplay) {
    println!("{}", summary);
    println!("{}", display.title);
    if !display.description.is_empty() {
        println!("{}", display.description);
    }
    if let (Some(line), Some(snippet)) = (display.line_number, &display.code_snippet) {
        println!("{:>5} | {}", line, snippet);
    }
    println!();
    println!("{}", display.headline);
    if let Some(expectation) = &display.expectation {
        println!("{}", expectation);
    }
    println!();
    for suggestion in &display.suggestions {
        println!("  - {}", suggestion);
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, Error> {
    serde_json::to_string_pretty(value).map_err(|e| Error::Other(e.to_string()))
}

fn read_input(input: &Path) -> Result<String, Error> {
    if input.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|e| Error::io("Failed to read from stdin", e))?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(input)
            .map_err(|e| Error::io(format!("Failed to read {}", input.display()), e))
    }
}

fn write_output(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    std::fs::write(path, bytes)
        .map_err(|e| Error::io(format!("Failed to write {}", path.display()), e))
}
