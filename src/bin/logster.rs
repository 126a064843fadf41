#![allow(unknown_lints)]

extern crate chrono;
extern crate fern;
#[macro_use]
extern crate log;
extern crate logster;

use chrono::Utc;
use logster::config::{self, Args};
use logster::lock::RunLock;
use logster::output::{self, OutputContext};
use logster::parser;
use logster::tail::{self, LogTail};
use std::fs;
use std::io;
use std::process;

/// Interval assumed on the first run against a log, in seconds.
const DEFAULT_DURATION: f64 = 60.0;

fn setup_logging(verbose: u64) {
    let level = match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    let res = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}][{}] {}",
                record.module_path().unwrap_or("?"),
                record.line().unwrap_or(0),
                Utc::now().to_rfc3339(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(io::stderr())
        .apply();
    if let Err(e) = res {
        eprintln!("could not set up logging: {}", e);
    }
}

fn config_failure(err: &config::ConfigError, usage: &str) -> ! {
    eprintln!("error: {}", err);
    if !usage.is_empty() {
        eprintln!("\n{}", usage);
    }
    process::exit(1);
}

/// One pass over the log. Returns whether every output accepted the
/// snapshot.
fn run(args: &Args) -> Result<bool, String> {
    let mut log_parser = parser::build(&args.parser, args.parser_options.as_ref().map(|s| s.as_str()))
        .unwrap_or_else(|e| config_failure(&e, &args.usage));
    let ctx = OutputContext {
        dry_run: args.dry_run,
        metric_prefix: args.metric_prefix.clone(),
        metric_suffix: args.metric_suffix.clone(),
    };
    let mut outputs = output::build(&args.outputs, &args.settings, &ctx)
        .unwrap_or_else(|e| config_failure(&e, &args.usage));

    fs::create_dir_all(&args.state_dir)
        .map_err(|e| format!("could not create {}: {}", args.state_dir.display(), e))?;
    let key = tail::state_key(&args.logfile);
    let lock_path = args.state_dir.join(format!("{}.lock", key));
    let _lock = match RunLock::acquire(&lock_path) {
        Ok(lock) => lock,
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
            return Err(format!(
                "another logster is already processing {} ({} is locked)",
                args.logfile.display(),
                lock_path.display()
            ));
        }
        Err(e) => return Err(format!("could not lock {}: {}", lock_path.display(), e)),
    };

    let state_path = args.state_dir.join(format!("{}-{}.state", args.parser, key));
    let mut reader = LogTail::open(&args.logfile, &state_path)
        .map_err(|e| format!("could not open {}: {}", args.logfile.display(), e))?;
    let duration = reader.duration_secs(DEFAULT_DURATION);

    let (accepted, rejected) = parser::feed(&mut *log_parser, reader.by_ref());
    if let Some(e) = reader.take_error() {
        return Err(format!("error reading {}: {}", args.logfile.display(), e));
    }
    info!(
        "{}: {} lines parsed, {} skipped, {:.1}s since last run",
        args.logfile.display(),
        accepted,
        rejected,
        duration
    );

    let metrics = log_parser.get_state(duration);
    let mut all_ok = true;
    for out in &mut outputs {
        match out.submit(&metrics) {
            Ok(()) => debug!("{} accepted {} metrics", out.shortname(), metrics.len()),
            Err(e) => {
                error!("output {} failed: {}", out.shortname(), e);
                all_ok = false;
            }
        }
    }

    if args.dry_run {
        info!("dry run, offset for {} left unchanged", args.logfile.display());
    } else if all_ok {
        reader.commit()
            .map_err(|e| format!("could not save {}: {}", state_path.display(), e))?;
    } else {
        warn!(
            "not saving offset for {}, lines will be read again",
            args.logfile.display()
        );
    }
    Ok(all_ok)
}

fn main() {
    let args = config::parse_args().unwrap_or_else(|e| config_failure(&e, ""));
    setup_logging(args.verbose);
    debug!("logster - {}", args.version);

    match run(&args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
