use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use routine_core::time::format_clock;
use routine_core::{Commitment, DaySetup, DurationRequest, IdGenerator, RoutineKernel, SchedulePreview};
use std::io::{self, BufRead, Write};

use crate::state::JsonFileStore;

/// Ask for one answer; an empty answer (or end of input) keeps `default`.
fn ask_or<R: BufRead>(input: &mut R, label: &str, default: i64) -> Result<i64> {
    print!("{label} [{default}]: ");
    io::stdout().flush().ok();
    let mut line = String::new();
    input.read_line(&mut line).context("reading answer")?;
    match line.trim() {
        "" => Ok(default),
        answer => parse_minutes(answer),
    }
}

/// Collect non-empty lines until a blank line or end of input.
fn ask_lines<R: BufRead>(input: &mut R, label: &str) -> Result<Vec<String>> {
    println!("{label} (one per line, blank line to finish)");
    let mut entries = Vec::new();
    loop {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if input.read_line(&mut line).context("reading entry")? == 0 {
            break;
        }
        match line.trim() {
            "" => break,
            entry => entries.push(entry.to_string()),
        }
    }
    Ok(entries)
}

/// Parse a length like "90", "45m", "2h" or "1h30".
pub fn parse_minutes(s: &str) -> Result<i64> {
    let s = s.trim().to_ascii_lowercase();
    let parsed = if let Some((h, m)) = s.split_once('h') {
        let hours: i64 = h.trim().parse().ok().context("hours")?;
        let m = m.trim().trim_end_matches('m');
        let minutes: i64 = if m.is_empty() { 0 } else { m.parse().ok().context("minutes")? };
        Some(hours * 60 + minutes)
    } else {
        s.trim_end_matches('m').parse().ok()
    };
    parsed.with_context(|| format!("invalid duration '{s}' (try 90, 45m, 2h or 1h30)"))
}

/// Parse "Title=90" into a duration request.
pub fn parse_duration_task(s: &str) -> Result<DurationRequest> {
    let Some((title, len)) = s.rsplit_once('=') else {
        bail!("expected TITLE=DURATION, got '{s}'");
    };
    Ok(DurationRequest::new(title.trim(), parse_minutes(len)?))
}

pub struct SetupArgs {
    pub sleep_minutes: i64,
    pub work_minutes: i64,
    pub commitments: Vec<String>,
    pub tasks: Vec<String>,
    pub interactive: bool,
    pub dry_run: bool,
}

pub fn run_setup(
    kernel: &mut RoutineKernel<JsonFileStore>,
    ids: &dyn IdGenerator,
    tz: Tz,
    args: SetupArgs,
) -> Result<()> {
    let mut sleep = args.sleep_minutes;
    let mut work = args.work_minutes;
    let mut task_entries = args.tasks;

    if args.interactive {
        println!("Routine setup (duration mode)\n");
        let mut stdin = io::stdin().lock();
        sleep = ask_or(&mut stdin, "Sleep length", sleep)?;
        work = ask_or(&mut stdin, "Work length", work)?;
        task_entries.extend(ask_lines(&mut stdin, "Tasks as TITLE=DURATION")?);
    }

    let mut commitments = vec![Commitment::sleep(sleep), Commitment::work(work)];
    for entry in &args.commitments {
        let r = parse_duration_task(entry)?;
        commitments.push(Commitment::custom(r.title, r.minutes));
    }
    let requests = task_entries
        .iter()
        .map(|s| parse_duration_task(s))
        .collect::<Result<Vec<_>>>()?;

    let now = kernel.now();
    let preview = DaySetup::for_today(now, tz).duration_mode(&commitments, &requests, ids, now)?;
    print_preview(&preview, tz);

    if args.dry_run {
        println!("\n(dry run: nothing saved)");
        return Ok(());
    }
    kernel.commit_schedule(preview)?;
    println!("\nSaved {} tasks to {}", kernel.tasks().len(), kernel.store().dir().display());
    Ok(())
}

fn print_preview(preview: &SchedulePreview, tz: Tz) {
    println!("# Schedule\n");
    for t in preview.tasks() {
        println!(
            "{} - {}  {}",
            format_clock(t.start, tz),
            format_clock(t.end, tz),
            t.title
        );
    }
    if !preview.dropped().is_empty() {
        println!("\nNo room left for:");
        for d in preview.dropped() {
            println!("- {} ({} min)", d.title(), d.minutes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minute_formats() {
        assert_eq!(parse_minutes("90").unwrap(), 90);
        assert_eq!(parse_minutes("45m").unwrap(), 45);
        assert_eq!(parse_minutes("2h").unwrap(), 120);
        assert_eq!(parse_minutes("1h30").unwrap(), 90);
        assert_eq!(parse_minutes("1h30m").unwrap(), 90);
        assert!(parse_minutes("soon").is_err());
    }

    #[test]
    fn parses_task_entries() {
        let r = parse_duration_task("Read = 1h").unwrap();
        assert_eq!(r.title, "Read");
        assert_eq!(r.minutes, 60);
        let r = parse_duration_task("A=B=30").unwrap();
        assert_eq!(r.title, "A=B");
        assert!(parse_duration_task("no length").is_err());
    }

    #[test]
    fn blank_answers_keep_defaults() {
        let mut input = io::Cursor::new("\n2h\n");
        assert_eq!(ask_or(&mut input, "Sleep length", 480).unwrap(), 480);
        assert_eq!(ask_or(&mut input, "Work length", 480).unwrap(), 120);
        assert_eq!(ask_or(&mut input, "Past the end", 30).unwrap(), 30);
    }

    #[test]
    fn task_lines_stop_at_blank_or_eof() {
        let mut input = io::Cursor::new("Read=30\n  Gym=1h \n\nignored=5\n");
        assert_eq!(ask_lines(&mut input, "Tasks").unwrap(), vec!["Read=30", "Gym=1h"]);
        let mut tail = io::Cursor::new("Call=15");
        assert_eq!(ask_lines(&mut tail, "Tasks").unwrap(), vec!["Call=15"]);
    }
}
