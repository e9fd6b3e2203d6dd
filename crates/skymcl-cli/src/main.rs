//! `skymcl` – command line front end for the drone motion model.
//!
//! ```text
//! skymcl replay <odometry.jsonl> [--initial x,y,z,roll,pitch,yaw] [--config <path>]
//! skymcl config [--config <path>]
//! skymcl help
//! ```
//!
//! `replay` spreads `particle_count` particles at the initial pose and runs
//! one prediction cycle per recorded odometry sample, then prints where the
//! particle cloud ended up.  `config` prints the effective configuration,
//! writing the defaults to `~/.skymcl/config.toml` on first use.

mod config;

use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use config::Config;
use skymcl_perception::{GaussianNoiseSource, TfBuffer};
use skymcl_runtime::{OdometryLog, Replay};
use skymcl_types::{MclError, PoseState};

#[derive(Debug, PartialEq)]
enum Command {
    Replay {
        log: PathBuf,
        initial: PoseState,
        config: Option<PathBuf>,
    },
    ShowConfig {
        config: Option<PathBuf>,
    },
    Help,
}

fn main() -> ExitCode {
    let _guard = skymcl_runtime::init_tracing("skymcl");

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Command::Replay { log, initial, config } => {
            load_config(config.as_deref())
                .and_then(|cfg| run_replay(&log, initial, &cfg))
        }
        Command::ShowConfig { config } => show_config(config.as_deref()),
        Command::Help => {
            print_usage();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

// ── Argument parsing ─────────────────────────────────────────────────────────

fn parse_args(args: &[String]) -> Result<Command, MclError> {
    let Some((cmd, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    let mut positional = Vec::new();
    let mut initial = PoseState::origin();
    let mut config = None;
    let mut it = rest.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--initial" => {
                let value = it
                    .next()
                    .ok_or_else(|| MclError::Config("--initial needs a value".into()))?;
                initial = parse_pose(value)?;
            }
            "--config" => {
                let value = it
                    .next()
                    .ok_or_else(|| MclError::Config("--config needs a path".into()))?;
                config = Some(PathBuf::from(value));
            }
            other if other.starts_with("--") => {
                return Err(MclError::Config(format!("unknown option {other}")));
            }
            other => positional.push(other.to_string()),
        }
    }

    match cmd.as_str() {
        "replay" => match positional.as_slice() {
            [log] => Ok(Command::Replay {
                log: PathBuf::from(log),
                initial,
                config,
            }),
            _ => Err(MclError::Config("replay expects exactly one odometry log".into())),
        },
        "config" => Ok(Command::ShowConfig { config }),
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(MclError::Config(format!("unknown command {other}"))),
    }
}

/// Parse `x,y,z,roll,pitch,yaw`.
fn parse_pose(value: &str) -> Result<PoseState, MclError> {
    let parts = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| MclError::Config(format!("invalid pose {value:?}: {e}")))?;
    match parts.as_slice() {
        &[x, y, z, roll, pitch, yaw] => Ok(PoseState::new(x, y, z, roll, pitch, yaw)),
        _ => Err(MclError::Config(format!(
            "pose needs six comma-separated values, got {}",
            parts.len()
        ))),
    }
}

fn print_usage() {
    println!("{}", "skymcl – drone MCL motion model".bold());
    println!();
    println!("  {} <odometry.jsonl> [--initial x,y,z,r,p,y] [--config <path>]", "replay".cyan());
    println!("  {} [--config <path>]", "config".cyan());
    println!("  {}", "help".cyan());
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<Config, MclError> {
    let cfg = match path {
        Some(p) => config::load_from(p)?
            .ok_or_else(|| MclError::Config(format!("no config at {}", p.display())))?,
        None => config::load()?.unwrap_or_else(|| {
            let mut cfg = Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }),
    };
    cfg.validate()?;
    Ok(cfg)
}

fn run_replay(log_path: &Path, initial: PoseState, cfg: &Config) -> Result<(), MclError> {
    let log = OdometryLog::load(log_path)?;
    if log.is_empty() {
        return Err(MclError::Replay(format!("{} contains no samples", log_path.display())));
    }
    info!(samples = log.len(), particles = cfg.filter.particle_count, "starting replay");

    let buffer = Arc::new(
        TfBuffer::new(cfg.frame_ids())
            .with_lookup_timeout(Duration::from_millis(cfg.filter.lookup_timeout_ms))
            .with_cache_window(cfg.filter.cache_window_s),
    );
    let rng = GaussianNoiseSource::from_seed_option(cfg.seed());
    let replay = Replay::new(buffer, cfg.noise(), rng)?;

    let mut particles = vec![initial; cfg.filter.particle_count];
    let summary = replay.run(&log, &mut particles);

    let m = summary.mean_pose;
    println!("{}", "Replay complete".green().bold());
    println!("  cycles           {}", summary.cycles);
    println!("  rejected samples {}", summary.rejected_samples);
    let failures = summary.lookup_failures.to_string();
    if summary.lookup_failures > 0 {
        println!("  lookup failures  {}", failures.yellow());
    } else {
        println!("  lookup failures  {}", failures);
    }
    println!(
        "  mean position    ({:.3}, {:.3}, {:.3})",
        m.x(),
        m.y(),
        m.z()
    );
    println!(
        "  mean rpy         ({:.3}, {:.3}, {:.3})",
        m.roll(),
        m.pitch(),
        m.yaw()
    );
    Ok(())
}

fn show_config(path: Option<&Path>) -> Result<(), MclError> {
    let (cfg, source) = match path {
        Some(p) => (load_config(Some(p))?, p.to_path_buf()),
        None => {
            let default_path = config::config_path();
            if config::load()?.is_none() {
                config::save(&Config::default())?;
                println!(
                    "  Wrote default configuration to {}",
                    default_path.display().to_string().bold()
                );
            }
            (load_config(None)?, default_path)
        }
    };
    let raw = toml::to_string_pretty(&cfg)
        .map_err(|e| MclError::Config(e.to_string()))?;
    println!("# {}", source.display().to_string().dimmed());
    println!("{raw}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_prints_help() {
        assert_eq!(parse_args(&[]).unwrap(), Command::Help);
    }

    #[test]
    fn replay_with_initial_pose() {
        let cmd = parse_args(&args(&[
            "replay",
            "flight.jsonl",
            "--initial",
            "5,5,0,0,0,0.5",
        ]))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Replay {
                log: PathBuf::from("flight.jsonl"),
                initial: PoseState::new(5.0, 5.0, 0.0, 0.0, 0.0, 0.5),
                config: None,
            }
        );
    }

    #[test]
    fn replay_requires_a_log() {
        assert!(parse_args(&args(&["replay"])).is_err());
    }

    #[test]
    fn config_flag_is_parsed() {
        let cmd = parse_args(&args(&["config", "--config", "/tmp/x.toml"])).unwrap();
        assert_eq!(
            cmd,
            Command::ShowConfig {
                config: Some(PathBuf::from("/tmp/x.toml"))
            }
        );
    }

    #[test]
    fn unknown_command_and_option_are_rejected() {
        assert!(parse_args(&args(&["fly"])).is_err());
        assert!(parse_args(&args(&["replay", "a.jsonl", "--fast"])).is_err());
    }

    #[test]
    fn pose_needs_six_values() {
        assert!(parse_pose("1,2,3").is_err());
        assert!(parse_pose("1,2,3,a,5,6").is_err());
        assert_eq!(
            parse_pose(" 1, 2, 3, 0, 0, 0 ").unwrap(),
            PoseState::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.0)
        );
    }

    fn write_flight(dir: &Path) -> PathBuf {
        let log_path = dir.join("flight.jsonl");
        let line = |secs: u32, x: f64| {
            format!(
                "{{\"stamp\":\"2024-05-01T12:00:{secs:02}Z\",\"pose\":\
                 {{\"x\":{x},\"y\":0.0,\"z\":1.0,\"roll\":0.0,\"pitch\":0.0,\"yaw\":0.0}}}}\n"
            )
        };
        std::fs::write(&log_path, line(0, 0.0) + &line(1, 1.0)).unwrap();
        log_path
    }

    #[test]
    fn replay_runs_from_explicit_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg_path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.filter.particle_count = 8;
        cfg.filter.seed = 3;
        cfg.filter.lookup_timeout_ms = 0;
        config::save_to(&cfg, &cfg_path).expect("save");

        let log_path = write_flight(dir.path());

        let loaded = load_config(Some(&cfg_path)).expect("config");
        run_replay(&log_path, PoseState::origin(), &loaded).expect("replay");
    }

    #[test]
    fn replay_accepts_very_long_cache_window() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut cfg = Config::default();
        cfg.filter.particle_count = 4;
        cfg.filter.seed = 1;
        cfg.filter.lookup_timeout_ms = 0;
        cfg.filter.cache_window_s = 1e13;
        cfg.validate().expect("valid");

        let log_path = write_flight(dir.path());
        run_replay(&log_path, PoseState::origin(), &cfg).expect("replay");
    }

    #[test]
    fn empty_log_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let log_path = dir.path().join("empty.jsonl");
        std::fs::write(&log_path, "").unwrap();
        let result = run_replay(&log_path, PoseState::origin(), &Config::default());
        assert!(result.is_err());
    }
}
