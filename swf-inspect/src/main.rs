//! SWF inspector CLI
//!
//! Loads a movie through the streaming parser, decodes its assets in
//! process and prints the header, dictionary or a compiled timeline.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use swf::{Movie, ParseOptions, Symbol, SymbolKind, TimelineProgram};
use tracing_subscriber::filter::LevelFilter;

mod codec;
mod error;

use codec::NativeCodec;
use error::InspectError;

#[derive(Parser)]
#[command(name = "swf-inspect")]
#[command(about = "Dump headers, symbols and compiled timelines of SWF files")]
#[command(version)]
struct Cli {
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Feed the file to the parser in chunks of this many bytes
    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    /// Upper bound on the uncompressed size, in bytes
    #[arg(long, global = true)]
    max_size: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Header, movie attributes and dictionary counts
    Info {
        file: PathBuf,
    },

    /// Every dictionary entry with its kind and state
    Symbols {
        file: PathBuf,

        /// Decode every symbol and report failures
        #[arg(short, long)]
        decode: bool,
    },

    /// Compile and dump a timeline
    Timeline {
        file: PathBuf,

        /// Sprite or button id; the main timeline when omitted
        #[arg(short, long)]
        symbol: Option<u16>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn load(path: &Path, cli: &Cli) -> Result<Movie, InspectError> {
    let data = std::fs::read(path).map_err(|source| InspectError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut options = ParseOptions::default();
    if let Some(max) = cli.max_size {
        options.max_uncompressed_length = max;
    }

    let mut movie = Movie::new(options);
    let chunk_size = cli.chunk_size.unwrap_or(data.len()).max(1);
    for chunk in data.chunks(chunk_size) {
        movie.push(chunk)?;
        // settle requests as they appear, the way a host would
        movie.decode_assets(&mut NativeCodec);
    }
    movie.finish()?;
    movie.decode_assets(&mut NativeCodec);
    Ok(movie)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), InspectError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn info(movie: &Movie, json: bool) -> Result<(), InspectError> {
    let Some(summary) = movie.summary() else {
        return Err(swf::SwfError::NotReady("the header was never parsed").into());
    };
    if json {
        return print_json(&summary);
    }

    let header = &summary.header;
    println!("Version: {} ({:?})", header.version, header.compression);
    println!("Stage: {}x{} px", header.width(), header.height());
    println!("Frame rate: {} fps", header.frame_rate);
    println!("Frames: {} declared, {} scanned", header.frame_count, summary.root_frames);
    println!("Uncompressed length: {} bytes", header.uncompressed_length);
    if let Some(color) = summary.attributes.background_color {
        println!("Background: #{:02x}{:02x}{:02x}", color.r, color.g, color.b);
    }
    println!(
        "Script: {}",
        if summary.attributes.uses_actionscript_3() { "AS3" } else { "AS1/2" }
    );
    println!("Symbols: {}", summary.symbols.len());
    println!("Fonts: {}", summary.fonts.len());
    for font in &summary.fonts {
        println!("  [{}] {} {:?}{}", font.id, font.name, font.style, if font.is_device { " (device)" } else { "" });
    }
    if let Some(main) = movie.main_class() {
        println!("Main class: {main}");
    }
    for scene in &summary.attributes.scenes {
        println!("Scene \"{}\" at frame {}", scene.name, scene.first_frame);
    }
    Ok(())
}

#[derive(Serialize)]
struct SymbolRow {
    id: u16,
    kind: Option<SymbolKind>,
    state: Option<swf::SymbolState>,
    error: Option<String>,
}

fn symbols(movie: &mut Movie, decode: bool, json: bool) -> Result<(), InspectError> {
    let ids: Vec<u16> = movie.dictionary().ids().collect();
    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let error = if decode {
            movie.symbol(id).err().map(|err| err.to_string())
        } else {
            None
        };
        rows.push(SymbolRow {
            id,
            kind: movie.dictionary().kind(id),
            state: movie.dictionary().state(id),
            error,
        });
    }
    if json {
        return print_json(&rows);
    }

    println!("{:>6}  {:<12}  {:<14}", "id", "kind", "state");
    println!("{:-<40}", "");
    for row in rows {
        let kind = row.kind.map_or_else(|| "?".to_string(), |kind| kind.to_string());
        let state = row.state.map_or_else(|| "?".to_string(), |state| format!("{state:?}"));
        println!("{:>6}  {:<12}  {:<14}", row.id, kind, state);
        if let Some(error) = row.error {
            println!("        {error}");
        }
    }
    Ok(())
}

fn symbol_timeline(movie: &mut Movie, id: u16) -> Result<Rc<TimelineProgram>, InspectError> {
    let symbol = movie.symbol(id)?;
    match &*symbol {
        Symbol::Sprite(sprite) => Ok(Rc::new(sprite.timeline.clone())),
        Symbol::Button(button) => Ok(Rc::new(button.states.clone())),
        other => Err(swf::SymbolError::Failed {
            id,
            reason: format!("{} symbols have no timeline", other.kind()),
        }
        .into()),
    }
}

fn timeline(movie: &mut Movie, symbol: Option<u16>, json: bool) -> Result<(), InspectError> {
    let program = match symbol {
        Some(id) => symbol_timeline(movie, id)?,
        None => movie.root_timeline()?,
    };
    if json {
        return print_json(&*program);
    }

    println!(
        "{} frames, {} keyframes, {} sessions{}",
        program.frame_count,
        program.keyframe_count(),
        program.sessions.len(),
        if program.is_button { " (button)" } else { "" }
    );
    for label in program.labels.iter() {
        println!("label \"{}\" -> keyframe {}", label.name, label.keyframe);
    }
    for keyframe in 0..program.keyframe_count() {
        println!(
            "keyframe {keyframe}: frame {} x{} {:?}",
            program.keyframe_first_frames[keyframe],
            program.keyframe_durations[keyframe],
            program.frame_recipes[keyframe],
        );
        for remove in program.removes.for_keyframe(keyframe) {
            println!("  remove session {} at depth {}", remove.session_id, remove.depth);
        }
        for add in program.adds.for_keyframe(keyframe) {
            let session = &program.sessions[add.session_id as usize];
            println!(
                "  add session {} (symbol {}{}) at depth {}",
                add.session_id,
                session.symbol_id,
                session.instance_name.as_deref().map(|n| format!(" \"{n}\"")).unwrap_or_default(),
                add.depth
            );
        }
        for update in program.updates.for_keyframe(keyframe) {
            let properties: Vec<String> = program
                .properties(update)
                .map(|property| format!("{property:?}"))
                .collect();
            println!("  update session {}: {}", update.session_id, properties.join(", "));
        }
        for sound in program.sounds.for_keyframe(keyframe) {
            println!("  sound {:?}", sound);
        }
    }
    Ok(())
}

fn main() -> Result<(), InspectError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Info { file } => {
            let movie = load(file, &cli)?;
            info(&movie, cli.json)
        }
        Commands::Symbols { file, decode } => {
            let mut movie = load(file, &cli)?;
            symbols(&mut movie, *decode, cli.json)
        }
        Commands::Timeline { file, symbol } => {
            let mut movie = load(file, &cli)?;
            timeline(&mut movie, *symbol, cli.json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["swf-inspect", "timeline", "a.swf", "--symbol", "4", "-vv", "--json"]).unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Timeline { symbol: Some(4), .. }));
    }
}
