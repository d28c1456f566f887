use std::path::{Path, PathBuf};
use std::time::Duration;

use console::{Button, Console, FileStore, Input};
use vm::{Engine, Program};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;

/// Scripted button press, written as `FRAME:BUTTON`
#[derive(Clone, Debug)]
struct Press {
    frame: u64,
    button: Button,
}

fn parse_press(s: &str) -> Result<Press> {
    let (frame, button) = s
        .split_once(':')
        .with_context(|| format!("expected FRAME:BUTTON, got {s:?}"))?;
    let frame = frame
        .parse()
        .with_context(|| format!("invalid frame number {frame:?}"))?;
    let button = Button::from_str(button, true)
        .map_err(|e| anyhow::anyhow!("invalid button {button:?}: {e}"))?;
    Ok(Press { frame, button })
}

/// TamaGo runner
#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Source file to assemble and run
    source: PathBuf,

    /// Number of frames to run
    #[clap(long, default_value_t = 60)]
    frames: u64,

    /// Frames per second of the synthetic clock
    #[clap(long, default_value_t = 30.0)]
    fps: f64,

    /// Program name, which keys save data (defaults to the file stem)
    #[clap(long)]
    name: Option<String>,

    /// Directory in which to keep save data
    #[clap(long)]
    save_dir: Option<PathBuf>,

    /// Presses a button on the given frame and releases it on the next,
    /// e.g. `10:action`
    #[clap(long, value_parser = parse_press)]
    press: Vec<Press>,

    /// Write the final screen to a PNG file
    #[clap(long)]
    png: Option<PathBuf>,
}

/// Prints the screen with one character per shade
fn print_screen(frame: &[u32], size: (u16, u16)) {
    for row in frame.chunks(usize::from(size.0)) {
        let line: String = row
            .iter()
            .map(|&p| {
                let shade =
                    vm::PALETTE.iter().position(|&c| (0xFF000000 | c) == p);
                match shade {
                    Some(0) => '.',
                    Some(1) => '+',
                    Some(_) => '#',
                    None => ' ',
                }
            })
            .collect();
        println!("{line}");
    }
}

fn save_png(path: &Path, frame: &[u32], size: (u16, u16)) -> Result<()> {
    let pixels = frame
        .iter()
        .flat_map(|p| {
            let [a, r, g, b] = p.to_be_bytes();
            [r, g, b, a]
        })
        .collect();
    let img = image::RgbaImage::from_raw(
        u32::from(size.0),
        u32::from(size.1),
        pixels,
    )
    .context("frame does not match screen size")?;
    img.save(path)
        .with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

fn main() -> Result<()> {
    let env = env_logger::Env::default()
        .filter_or("TAMAGO_LOG", "info")
        .write_style_or("TAMAGO_LOG", "always");
    env_logger::init_from_env(env);

    let args = Args::parse();
    anyhow::ensure!(args.fps > 0.0, "fps must be positive");

    let src = std::fs::read_to_string(&args.source)
        .with_context(|| format!("failed to open {:?}", args.source))?;
    let name = match &args.name {
        Some(n) => n.clone(),
        None => args
            .source
            .file_stem()
            .and_then(|s| s.to_str())
            .context("could not derive a program name")?
            .to_owned(),
    };

    let start = std::time::Instant::now();
    let program = Program::compile(&name, &src);
    info!(
        "assembled {} tokens in {:?}",
        program.tokens.len(),
        start.elapsed()
    );

    let mut dev = match &args.save_dir {
        Some(dir) => Console::with_store(Box::new(
            FileStore::new(dir)
                .with_context(|| format!("failed to open {dir:?}"))?,
        )),
        None => Console::new(),
    };
    let mut engine = Engine::new();
    dev.load(&mut engine, &program);

    let dt = Duration::from_secs_f64(1.0 / args.fps);
    let mut cycles = 0;
    let mut tone = 0;
    for i in 0..args.frames {
        let mut input = Input::default();
        for p in args.press.iter().filter(|p| p.frame == i) {
            input.pressed.push(p.button);
        }
        for p in args.press.iter().filter(|p| p.frame + 1 == i) {
            input.released.push(p.button);
        }
        let out = dev.update(&mut engine, dt, input);
        cycles += out.cycles;
        if out.tone != tone {
            info!("frame {i}: tone {} Hz", out.tone);
            tone = out.tone;
        }
        if let Some(p) = out.serial {
            info!("frame {i}: serial out {p:02x?}");
        }
    }
    info!("ran {} frames, {cycles} cycles", args.frames);

    let out = dev.update(&mut engine, Duration::ZERO, Input::default());
    print_screen(out.frame, out.size);
    if let Some(path) = &args.png {
        save_png(path, out.frame, out.size)?;
    }
    Ok(())
}
