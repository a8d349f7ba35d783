//! chime CLI — play a single sound through the native backend.
//!
//! Commands:
//!   chime play <locator> [--loop] [--volume <0.0-1.0>] [--config <file>]
//!   chime shell <locator> [--config <file>]
//!   chime info <locator> [--config <file>]

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chime_core::backend::native::NativeBackend;
use chime_core::backend::probe::probe_media;
use chime_core::{LocatorResolver, Sound, SoundCommand, SoundConfig, UrlResolver};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return;
    }

    let result = match args[0].as_str() {
        "play" => cmd_play(&args[1..]),
        "shell" => cmd_shell(&args[1..]),
        "info" => cmd_info(&args[1..]),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => Err(format!("unknown command: {}", other)),
    };

    if let Err(e) = result {
        eprintln!("chime: {}", e);
        std::process::exit(1);
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

struct Options {
    locator: String,
    looping: Option<bool>,
    volume: Option<f64>,
    config: SoundConfig,
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut locator = None;
    let mut looping = None;
    let mut volume = None;
    let mut config_path = None;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--loop" => looping = Some(true),
            "--volume" => {
                let raw = it.next().ok_or("--volume needs a value")?;
                let v = raw
                    .parse::<f64>()
                    .map_err(|_| format!("invalid volume: {}", raw))?;
                volume = Some(v);
            }
            "--config" => {
                config_path = Some(it.next().ok_or("--config needs a file")?.clone());
            }
            flag if flag.starts_with("--") => return Err(format!("unknown option: {}", flag)),
            value if locator.is_none() => locator = Some(value.to_string()),
            extra => return Err(format!("unexpected argument: {}", extra)),
        }
    }

    let config = match config_path {
        Some(path) => {
            log::debug!("chime: reading config from {}", path);
            SoundConfig::load(Path::new(&path)).map_err(|e| e.to_string())?
        }
        None => SoundConfig::default(),
    }
    .with_env_overrides()
    .map_err(|e| e.to_string())?;

    Ok(Options {
        locator: locator.ok_or("missing <locator>")?,
        looping,
        volume,
        config,
    })
}

fn open_sound(opts: &Options) -> Result<(Sound, Arc<NativeBackend>), String> {
    let backend = Arc::new(NativeBackend::new());
    let sound = Sound::from_config(opts.locator.clone(), backend.clone(), &opts.config)
        .map_err(|e| e.to_string())?;
    if let Some(v) = opts.volume {
        sound.set_volume(v);
    }
    if let Some(looping) = opts.looping {
        sound.set_looping(looping);
    }
    Ok((sound, backend))
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_play(args: &[String]) -> Result<(), String> {
    let opts = parse_options(args)?;
    let (sound, backend) = open_sound(&opts)?;

    let (done_tx, done_rx) = mpsc::channel();
    sound.on_complete(move |looping| {
        if !looping {
            // Receiver gone means we are already shutting down
            let _ = done_tx.send(());
        }
        Ok(())
    });

    sound.play().map_err(|e| e.to_string())?;

    let title = sound
        .path()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| sound.locator().to_string());
    if let Some(info) = backend.media_info() {
        println!(
            "  {} ({} Hz, {} ch)",
            title, info.sample_rate, info.channels
        );
    }

    // Block showing progress until the iteration ends (Ctrl+C exits)
    loop {
        match done_rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
        print_progress(
            &title,
            backend.position_ms(),
            backend.duration_ms().unwrap_or(0),
            sound.volume(),
            sound.is_looping(),
        );
    }
    println!();

    sound.unload().map_err(|e| e.to_string())
}

fn cmd_shell(args: &[String]) -> Result<(), String> {
    let opts = parse_options(args)?;
    let (sound, _backend) = open_sound(&opts)?;

    sound.on_complete(|looping| {
        println!("\n[iteration complete, looping: {}]", looping);
        Ok(())
    });

    println!("chime shell: {} (type `help` for commands)", sound.locator());
    let stdin = std::io::stdin();
    let mut out = std::io::stdout();
    prompt(&mut out);

    for line in stdin.lock().lines() {
        let line = line.map_err(|e| e.to_string())?;
        match line.trim() {
            "" => {}
            "quit" | "exit" => break,
            "help" => print_shell_help(),
            "status" => {
                let status = serde_json::to_string_pretty(&sound.status()).unwrap_or_default();
                println!("{}", status);
            }
            other => match SoundCommand::parse(other) {
                Some(cmd) => {
                    if let Err(e) = sound.apply(cmd) {
                        eprintln!("error: {}", e);
                    }
                }
                None => eprintln!("unknown command: {}", other),
            },
        }
        prompt(&mut out);
    }

    sound.unload().map_err(|e| e.to_string())
}

fn cmd_info(args: &[String]) -> Result<(), String> {
    let opts = parse_options(args)?;
    let path = UrlResolver::new(opts.config.resource_root.clone())
        .resolve(&opts.locator)
        .map_err(|e| e.to_string())?;
    let info = probe_media(&path).map_err(|e| e.to_string())?;

    println!("path:        {}", path.display());
    println!("sample rate: {} Hz", info.sample_rate);
    println!("channels:    {}", info.channels);
    match info.duration_ms {
        Some(ms) => println!("duration:    {}", fmt_time(ms)),
        None => println!("duration:    unknown"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn prompt(out: &mut std::io::Stdout) {
    print!("> ");
    out.flush().ok();
}

fn print_progress(title: &str, pos_ms: u64, dur_ms: u64, volume: f64, looping: bool) {
    let bar_width = 30;
    let filled = if dur_ms > 0 {
        (((pos_ms as f64 / dur_ms as f64) * bar_width as f64) as usize).min(bar_width)
    } else {
        0
    };

    print!(
        "\r  {}  [{}{}] {} / {}  vol: {}%{}    ",
        title,
        "=".repeat(filled),
        " ".repeat(bar_width - filled),
        fmt_time(pos_ms),
        fmt_time(dur_ms),
        (volume * 100.0).round() as u32,
        if looping { "  (loop)" } else { "" },
    );
    std::io::stdout().flush().ok();
}

fn fmt_time(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn print_shell_help() {
    println!("  play                 Start or resume");
    println!("  pause                Pause");
    println!("  stop                 Stop");
    println!("  reload               Reload from the locator");
    println!("  volume <0.0-1.0>     Set volume");
    println!("  loop <on|off>        Toggle looping");
    println!("  status               Print state as JSON");
    println!("  quit                 Exit");
}

fn print_usage() {
    println!("chime - single sound player");
    println!();
    println!("usage: chime <command> <locator> [options]");
    println!();
    println!("commands:");
    println!("  play <locator>         Play once (or forever with --loop)");
    println!("  shell <locator>        Control a sound from stdin");
    println!("  info <locator>         Show format and duration");
    println!();
    println!("options:");
    println!("  --loop                 Restart after every iteration");
    println!("  --volume <0.0-1.0>     Initial volume");
    println!("  --config <file>        JSON config (volume, looping, resource_root)");
    println!();
    println!("locators: plain paths, file:// URLs, app://<id>/<path> (under resource_root)");
}
