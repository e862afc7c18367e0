use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result, miette};
use quire_common::QuireConfig;
use quire_common::telemetry::{self, TelemetryConfig};
use quire_editor_core::{RenderContext, Selection, Viewport, build_decorations};
use quire_protocol::SyntaxVisibility;

mod replay;

#[derive(Parser)]
#[command(version, about = "Quire - live markdown editing surface tools", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the decorations a surface would draw for a markdown file
    Render {
        file: PathBuf,

        /// Cursor position, in characters
        #[arg(long, default_value_t = 0)]
        cursor: usize,

        /// Other end of the selection; defaults to the cursor
        #[arg(long)]
        anchor: Option<usize>,

        /// Line window to decorate, as `top..bottom`
        #[arg(long, value_parser = parse_lines)]
        lines: Option<(usize, usize)>,

        /// show, dim or selection
        #[arg(long, value_parser = parse_visibility)]
        visibility: Option<SyntaxVisibility>,

        #[arg(long)]
        no_tables: bool,

        #[arg(long)]
        no_images: bool,
    },
    /// Replay a protocol transcript against an in-memory document
    Replay {
        transcript: PathBuf,

        /// Initial document text
        #[arg(long)]
        document: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    init_miette();
    let config = QuireConfig::from_env()?;
    telemetry::init(TelemetryConfig::from_env("quire-cli").with_level(config.log_level.clone()));

    let cli = Cli::parse();
    match cli.command {
        Commands::Render {
            file,
            cursor,
            anchor,
            lines,
            visibility,
            no_tables,
            no_images,
        } => {
            let text = std::fs::read_to_string(&file).into_diagnostic()?;
            let mut settings = config.editor_settings();
            if let Some(visibility) = visibility {
                settings.syntax_visibility = visibility;
            }
            settings.render_tables &= !no_tables;
            settings.render_images &= !no_images;

            let doc_len = text.chars().count();
            if cursor > doc_len {
                return Err(miette!("cursor {cursor} is past the end of the file ({doc_len})"));
            }
            let ctx = RenderContext {
                selection: Selection::new(anchor.unwrap_or(cursor), cursor, doc_len),
                viewport: lines.map_or_else(Viewport::everything, |(top, bottom)| {
                    Viewport::lines(top..bottom)
                }),
                settings: &settings,
            };
            print!("{}", build_decorations(&text, &ctx));
        }
        Commands::Replay {
            transcript,
            document,
        } => {
            let script = std::fs::read_to_string(&transcript).into_diagnostic()?;
            let (uri, initial) = match document {
                Some(path) => (
                    format!("file://{}", path.display()),
                    std::fs::read_to_string(&path).into_diagnostic()?,
                ),
                None => ("mem://untitled.md".to_string(), String::new()),
            };
            let stdout = std::io::stdout();
            replay::run(&uri, &initial, &script, &config, &mut stdout.lock())?;
            println!();
        }
    }

    Ok(())
}

fn parse_lines(raw: &str) -> Result<(usize, usize), String> {
    let (top, bottom) = raw
        .split_once("..")
        .ok_or_else(|| format!("`{raw}` is not a `top..bottom` range"))?;
    let top = top.trim().parse().map_err(|_| format!("bad top `{top}`"))?;
    let bottom = bottom
        .trim()
        .parse()
        .map_err(|_| format!("bad bottom `{bottom}`"))?;
    Ok((top, bottom))
}

fn parse_visibility(raw: &str) -> Result<SyntaxVisibility, String> {
    SyntaxVisibility::parse(raw).ok_or_else(|| format!("`{raw}` is not one of show, dim, selection"))
}

fn init_miette() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(3)
                .tab_width(2)
                .build(),
        )
    }))
    .ok();
    miette::set_panic_hook();
}
