//! Render a markdown document to a PNG card.
//!
//! Usage:
//!   md-card [OPTIONS] <INPUT.md|->
//!
//! Without font flags the built-in bitmap fonts are used. `RUST_LOG`
//! controls log output; `MD_CARD_SIGNATURE` supplies a default footer.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use md_card::CardError;
use md_card_raster::{
    encode_png, CardOptions, CardRenderer, FontBackend, FontSet, FontSource, ThemeVariant,
    TitleImage,
};
use serde::Deserialize;

const SIGNATURE_ENV: &str = "MD_CARD_SIGNATURE";

/// JSON file accepted by `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CliConfig {
    options: CardOptions,
    fonts: FontSet,
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    input: Option<String>,
    out: PathBuf,
    config: Option<PathBuf>,
    width: Option<u32>,
    height: Option<u32>,
    title_image: Option<PathBuf>,
    signature: Option<String>,
    theme: Option<ThemeVariant>,
    seed: Option<u64>,
    font_regular: Option<PathBuf>,
    font_bold: Option<PathBuf>,
    font_mono: Option<PathBuf>,
    font_emoji: Option<PathBuf>,
    dump_commands: Option<PathBuf>,
    help: bool,
}

fn usage() {
    eprintln!("Usage: md-card [OPTIONS] <INPUT.md|->");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --out <PATH>            Output PNG (default: card.png)");
    eprintln!("  --width <PX>            Card width (default: 1000)");
    eprintln!("  --height <PX>           Minimum card height");
    eprintln!("  --title-image <PATH>    Image placed above the content");
    eprintln!("  --signature <TEXT>      Footer text (default: ${SIGNATURE_ENV})");
    eprintln!("  --theme <light|dark>    Force a palette instead of the time of day");
    eprintln!("  --seed <N>              Background gradient seed");
    eprintln!("  --config <JSON>         File with `options` and `fonts` objects");
    eprintln!("  --font-regular <PATH>   Regular TrueType face");
    eprintln!("  --font-bold <PATH>      Bold TrueType face");
    eprintln!("  --font-mono <PATH>      Monospace face for code");
    eprintln!("  --font-emoji <PATH>     Emoji fallback face");
    eprintln!("  --dump-commands <PATH>  Write the draw commands as JSON");
    eprintln!("  -h, --help              Show this help");
}

fn parse_theme(value: &str) -> Option<ThemeVariant> {
    match value {
        "light" => Some(ThemeVariant::Light),
        "dark" => Some(ThemeVariant::Dark),
        _ => None,
    }
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut args = Args {
        out: PathBuf::from("card.png"),
        ..Args::default()
    };
    let mut i = 0;
    while i < raw.len() {
        let flag = raw[i].as_str();
        let mut value = || {
            i += 1;
            raw.get(i)
                .cloned()
                .ok_or_else(|| format!("{flag} expects a value"))
        };
        match flag {
            "--out" => args.out = PathBuf::from(value()?),
            "--config" => args.config = Some(PathBuf::from(value()?)),
            "--width" => {
                let v = value()?;
                args.width = Some(v.parse().map_err(|_| format!("invalid width: {v}"))?);
            }
            "--height" => {
                let v = value()?;
                args.height = Some(v.parse().map_err(|_| format!("invalid height: {v}"))?);
            }
            "--title-image" => args.title_image = Some(PathBuf::from(value()?)),
            "--signature" => args.signature = Some(value()?),
            "--theme" => {
                let v = value()?;
                args.theme = Some(parse_theme(&v).ok_or_else(|| format!("unknown theme: {v}"))?);
            }
            "--seed" => {
                let v = value()?;
                args.seed = Some(v.parse().map_err(|_| format!("invalid seed: {v}"))?);
            }
            "--font-regular" => args.font_regular = Some(PathBuf::from(value()?)),
            "--font-bold" => args.font_bold = Some(PathBuf::from(value()?)),
            "--font-mono" => args.font_mono = Some(PathBuf::from(value()?)),
            "--font-emoji" => args.font_emoji = Some(PathBuf::from(value()?)),
            "--dump-commands" => args.dump_commands = Some(PathBuf::from(value()?)),
            "--help" | "-h" => args.help = true,
            other if other.starts_with("--") => return Err(format!("unknown option: {other}")),
            other => {
                if args.input.is_some() {
                    return Err(format!("unexpected argument: {other}"));
                }
                args.input = Some(other.to_string());
            }
        }
        i += 1;
    }
    Ok(args)
}

fn load_config(path: &Path) -> Result<CliConfig, CardError> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| CardError::from(err).with_path(path.display().to_string()))?;
    serde_json::from_str(&text).map_err(|err| {
        CardError::invalid_option("CONFIG_PARSE", format!("invalid config: {err}"))
            .with_path(path.display().to_string())
    })
}

fn read_input(input: &str) -> Result<String, CardError> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(input).map_err(|err| CardError::from(err).with_path(input))
}

/// Merge config file, environment, and flags; flags win.
fn resolve_settings(args: &Args) -> Result<(CardOptions, FontSet), CardError> {
    let CliConfig {
        mut options,
        mut fonts,
    } = match &args.config {
        Some(path) => load_config(path)?,
        None => CliConfig::default(),
    };
    if let Some(width) = args.width {
        options.width = width;
    }
    if args.height.is_some() {
        options.height = args.height;
    }
    if let Some(path) = &args.title_image {
        options.title_image = Some(TitleImage::Path(path.clone()));
    }
    if args.theme.is_some() {
        options.theme_override = args.theme;
    }
    if args.seed.is_some() {
        options.gradient_seed = args.seed;
    }
    options.signature_text = args
        .signature
        .clone()
        .or_else(|| std::env::var(SIGNATURE_ENV).ok())
        .or(options.signature_text);

    let path_source = |path: &Option<PathBuf>| path.clone().map(FontSource::Path);
    fonts.regular = path_source(&args.font_regular).or(fonts.regular);
    fonts.bold = path_source(&args.font_bold).or(fonts.bold);
    fonts.monospace = path_source(&args.font_mono).or(fonts.monospace);
    fonts.emoji = path_source(&args.font_emoji).or(fonts.emoji);
    Ok((options, fonts))
}

fn render_with<B>(
    renderer: &CardRenderer<B>,
    document: &str,
    options: &CardOptions,
    dump_commands: Option<&Path>,
) -> Result<Vec<u8>, CardError>
where
    B: FontBackend + 'static,
{
    if let Some(path) = dump_commands {
        let (card, _) = renderer.prepare(document, options)?;
        let json = card
            .to_json()
            .map_err(|err| CardError::encode("COMMANDS_JSON", err.to_string()))?;
        std::fs::write(path, json)
            .map_err(|err| CardError::from(err).with_path(path.display().to_string()))?;
        log::info!("wrote {} draw commands to {}", card.command_count(), path.display());
    }
    let image = renderer.render_image(document, options)?;
    log::info!("card size {}x{}", image.width(), image.height());
    encode_png(&image, options.compression)
}

fn run(args: &Args) -> Result<(), CardError> {
    let Some(input) = args.input.as_deref() else {
        return Err(CardError::invalid_option("INPUT_MISSING", "no input file"));
    };
    let (options, fonts) = resolve_settings(args)?;
    let document = read_input(input)?;
    let started = Instant::now();
    let dump = args.dump_commands.as_deref();
    let png = if fonts.is_empty() {
        render_with(&CardRenderer::default(), &document, &options, dump)?
    } else {
        render_with(&CardRenderer::from_fonts(&fonts)?, &document, &options, dump)?
    };
    std::fs::write(&args.out, &png)
        .map_err(|err| CardError::from(err).with_path(args.out.display().to_string()))?;
    log::info!(
        "rendered {} -> {} ({} bytes, {} ms)",
        input,
        args.out.display(),
        png.len(),
        started.elapsed().as_millis()
    );
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    let args = parse_args(&raw).unwrap_or_else(|err| {
        eprintln!("{err}");
        usage();
        std::process::exit(1);
    });
    if args.help {
        usage();
        return;
    }
    if args.input.is_none() {
        usage();
        std::process::exit(1);
    }
    if let Err(err) = run(&args) {
        eprintln!("md-card: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags_and_input() {
        let args = parse_args(&strings(&[
            "--width", "720", "--theme", "dark", "--seed", "9", "notes.md", "--out", "x.png",
        ]));
        let Ok(args) = args else {
            panic!("parse failed");
        };
        assert_eq!(args.width, Some(720));
        assert_eq!(args.theme, Some(ThemeVariant::Dark));
        assert_eq!(args.seed, Some(9));
        assert_eq!(args.input.as_deref(), Some("notes.md"));
        assert_eq!(args.out, PathBuf::from("x.png"));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse_args(&strings(&["--width"])).is_err());
        assert!(parse_args(&strings(&["--width", "wide"])).is_err());
        assert!(parse_args(&strings(&["--theme", "sepia"])).is_err());
        assert!(parse_args(&strings(&["--bogus"])).is_err());
        assert!(parse_args(&strings(&["a.md", "b.md"])).is_err());
    }

    #[test]
    fn flags_override_config_fonts() {
        let args = Args {
            font_regular: Some(PathBuf::from("/f/r.ttf")),
            width: Some(800),
            signature: Some("me".to_string()),
            ..Args::default()
        };
        let (options, fonts) = resolve_settings(&args).unwrap_or_default();
        assert_eq!(options.width, 800);
        assert_eq!(options.signature_text.as_deref(), Some("me"));
        assert_eq!(fonts.regular, Some(FontSource::Path(PathBuf::from("/f/r.ttf"))));
        assert!(fonts.bold.is_none());
    }

    #[test]
    fn config_json_fills_options() {
        let config: CliConfig = serde_json::from_str(
            r#"{"options":{"width":640,"theme_override":"light"},"fonts":{"bold":{"path":"/b.ttf"}}}"#,
        )
        .unwrap_or_default();
        assert_eq!(config.options.width, 640);
        assert_eq!(config.options.theme_override, Some(ThemeVariant::Light));
        assert!(!config.fonts.is_empty());
    }
}
