use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{debug, info};

use trapq::{Configfile, Coord, TrapQ, TrapqConfig, NEVER_TIME};

/// Replay a move script through a trapq and dump the finalized history
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Move script: `append`, `set_position` and `finalize` lines
    #[arg()]
    script: PathBuf,

    /// Config file with an optional [trapq] section
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Finalize every move ending at or before this print time after replay
    #[arg(long)]
    cutoff: Option<f64>,

    /// Start of the extract window
    #[arg(long, default_value_t = 0.0)]
    start: f64,

    /// End of the extract window
    #[arg(long, default_value_t = NEVER_TIME)]
    end: f64,

    /// Maximum number of records to extract
    #[arg(long, default_value_t = 1024)]
    max: usize,

    /// write log to file instead of stderr
    #[arg(short, long)]
    logfile: Option<PathBuf>,

    /// enable debug messages
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum ScriptCmd {
    Append {
        print_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: Coord,
        axes_r: Coord,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
    },
    SetPosition { print_time: f64, pos: Coord },
    Finalize { print_time: f64 },
}

fn parse_floats(lineno: usize, fields: &[&str], expected: usize) -> Result<Vec<f64>> {
    if fields.len() != expected {
        bail!("line {}: expected {} values, found {}", lineno, expected, fields.len());
    }
    fields
        .iter()
        .map(|f| {
            f.parse::<f64>()
                .with_context(|| format!("line {}: invalid number '{}'", lineno, f))
        })
        .collect()
}

fn coord_at(vals: &[f64], idx: usize) -> Coord {
    Coord::new(vals[idx], vals[idx + 1], vals[idx + 2], vals[idx + 3], vals[idx + 4])
}

fn parse_script(content: &str) -> Result<Vec<ScriptCmd>> {
    let mut cmds = Vec::new();
    for (idx, raw) in content.lines().enumerate() {
        let lineno = idx + 1;
        let line = raw.split('#').next().unwrap_or_default().trim();
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            continue;
        };
        let fields: Vec<&str> = parts.collect();
        let parsed = match cmd {
            "append" => {
                let v = parse_floats(lineno, &fields, 17)?;
                ScriptCmd::Append {
                    print_time: v[0],
                    accel_t: v[1],
                    cruise_t: v[2],
                    decel_t: v[3],
                    start_pos: coord_at(&v, 4),
                    axes_r: coord_at(&v, 9),
                    start_v: v[14],
                    cruise_v: v[15],
                    accel: v[16],
                }
            }
            "set_position" => {
                let v = parse_floats(lineno, &fields, 6)?;
                ScriptCmd::SetPosition { print_time: v[0], pos: coord_at(&v, 1) }
            }
            "finalize" => {
                let v = parse_floats(lineno, &fields, 1)?;
                ScriptCmd::Finalize { print_time: v[0] }
            }
            other => bail!("line {}: unknown command '{}'", lineno, other),
        };
        cmds.push(parsed);
    }
    Ok(cmds)
}

fn replay(tq: &mut TrapQ, cmds: &[ScriptCmd]) -> Result<()> {
    for cmd in cmds {
        debug!("replay {:?}", cmd);
        match *cmd {
            ScriptCmd::Append {
                print_time,
                accel_t,
                cruise_t,
                decel_t,
                start_pos,
                axes_r,
                start_v,
                cruise_v,
                accel,
            } => tq.append(print_time, accel_t, cruise_t, decel_t, start_pos, axes_r, start_v, cruise_v, accel)?,
            ScriptCmd::SetPosition { print_time, pos } => tq.set_position(print_time, pos)?,
            ScriptCmd::Finalize { print_time } => {
                tq.flush(print_time)?;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if args.verbose {
        builder.filter(None, log::LevelFilter::Debug);
    } else {
        builder.filter(None, log::LevelFilter::Info);
    }
    if let Some(ref logfile) = args.logfile {
        let target = std::fs::File::create(logfile)
            .with_context(|| format!("Can't create logfile {}", logfile.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(target)));
    }
    builder.init();

    let config = match args.config {
        Some(ref path) => TrapqConfig::from_config(&Configfile::read_file(path)?)?,
        None => TrapqConfig::default(),
    };
    info!("Using {:?}", config);

    let content = std::fs::read_to_string(&args.script)
        .with_context(|| format!("Can't read script {}", args.script.display()))?;
    let cmds = parse_script(&content)?;

    let mut tq = TrapQ::with_config(config);
    replay(&mut tq, &cmds)?;
    if let Some(cutoff) = args.cutoff {
        tq.finalize_moves(cutoff)?;
    }
    info!(
        "Replayed {} commands: {} active, {} history moves",
        cmds.len(),
        tq.active_len(),
        tq.history_len()
    );

    let records = tq.extract_old(args.start, args.end, args.max)?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    tq.teardown();
    Ok(())
}
