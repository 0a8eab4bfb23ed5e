use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use grade_insights::filter::{scope_records, RecordFilter, Viewer};
use grade_insights::numeric::{aggregate_numeric, section_dashboard, student_evolution};
use grade_insights::period::sort_chronologically;
use grade_insights::report::{build_report, ReportInput};
use grade_insights::risk::{competency_risk_table, RosterQuery};
use grade_insights::source::{load_assignments, load_records};
use grade_insights::trend::competency_evolution;
use grade_insights::{aggregate, analyze_trends, at_risk_roster, AnalyticsConfig, Dimension, GradeRecord, Outcome};

#[derive(Parser)]
#[command(name = "grade-insights")]
#[command(about = "Grade distributions, risk tiers and trends from exported grade records", long_about = None)]
struct Cli {
    /// Policy file (TOML); built-in presets are used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level regardless of RUST_LOG
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Grade records as JSON or CSV
    #[arg(long)]
    records: PathBuf,
    /// Teacher assignments as JSON or CSV
    #[arg(long, requires = "teacher")]
    assignments: Option<PathBuf>,
    /// Only use records from this teacher's course sections
    #[arg(long, requires = "assignments")]
    teacher: Option<u64>,
}

#[derive(Args)]
struct Narrow {
    #[arg(long)]
    period: Option<String>,
    #[arg(long, requires = "period")]
    year: Option<i32>,
    #[arg(long)]
    grade_level: Option<String>,
    #[arg(long, requires = "grade_level")]
    section: Option<String>,
    #[arg(long)]
    course: Option<u64>,
    #[arg(long)]
    competency: Option<u64>,
}

impl Narrow {
    fn filter(&self) -> RecordFilter {
        RecordFilter {
            period: self.period.clone(),
            year: self.year,
            grade_level: self.grade_level.clone(),
            section: self.section.clone(),
            course_id: self.course,
            competency_id: self.competency,
            ..RecordFilter::default()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Grade counts and mean per group
    Distribution {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        narrow: Narrow,
        /// Grouping dimensions, comma separated
        #[arg(long, value_delimiter = ',', default_value = "competency")]
        by: Vec<Dimension>,
        /// Treat grades as marks out of 20
        #[arg(long)]
        numeric: bool,
    },
    /// Competencies ranked by their share of C grades
    CohortRisk {
        #[command(flatten)]
        source: Source,
        #[command(flatten)]
        narrow: Narrow,
    },
    /// Students with C in several competencies during one period
    Roster {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        period: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        grade_level: Option<String>,
        #[arg(long, requires = "grade_level")]
        section: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Evolution of one student's grades
    Trend {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        student: u64,
        /// Competency to follow on the letter scale
        #[arg(long, required_unless_present = "numeric", conflicts_with = "numeric")]
        competency: Option<u64>,
        /// Follow all of the student's marks out of 20
        #[arg(long)]
        numeric: bool,
    },
    /// Section summary on the 0-20 scale
    Dashboard {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        grade_level: String,
        #[arg(long)]
        section: String,
        #[arg(long)]
        period: String,
        #[arg(long)]
        year: i32,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: Source,
        #[arg(long)]
        period: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        grade_level: Option<String>,
        #[arg(long, requires = "grade_level")]
        section: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(level: &str, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_scoped(source: &Source) -> anyhow::Result<Vec<GradeRecord>> {
    let records = load_records(&source.records)
        .with_context(|| format!("failed to load grade records from {}", source.records.display()))?;

    let (Some(teacher), Some(path)) = (source.teacher, source.assignments.as_ref()) else {
        return Ok(records);
    };
    let assignments = load_assignments(path)
        .with_context(|| format!("failed to load teacher assignments from {}", path.display()))?;
    let scoped = scope_records(&records, &Viewer::teacher(teacher), &assignments);
    info!(teacher, loaded = records.len(), visible = scoped.len(), "scoped records to teacher");
    Ok(scoped)
}

fn note_rejected<T>(outcome: &Outcome<T>) {
    if !outcome.is_clean() {
        warn!(rejected = outcome.errors.len(), "some records were left out");
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value).context("failed to write output")?;
    writeln!(out)?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AnalyticsConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => AnalyticsConfig::default(),
    };
    init_tracing(&config.logging.level, cli.verbose);

    match cli.command {
        Commands::Distribution {
            source,
            narrow,
            by,
            numeric,
        } => {
            let records = narrow.filter().apply(&load_scoped(&source)?);
            if numeric {
                let outcome = aggregate_numeric(&records, &by, &config.numeric);
                note_rejected(&outcome);
                print_json(&outcome)?;
            } else {
                let outcome = aggregate(&records, &by);
                note_rejected(&outcome);
                print_json(&outcome)?;
            }
        }
        Commands::CohortRisk { source, narrow } => {
            let records = narrow.filter().apply(&load_scoped(&source)?);
            let outcome = competency_risk_table(&records, &config.cohort_risk);
            note_rejected(&outcome);
            print_json(&outcome)?;
        }
        Commands::Roster {
            source,
            period,
            year,
            grade_level,
            section,
            limit,
        } => {
            let records = load_scoped(&source)?;
            let query = RosterQuery {
                period,
                year,
                grade_level,
                section,
            };
            let mut outcome = at_risk_roster(&records, &query, &config.student_risk);
            note_rejected(&outcome);
            outcome.value.truncate(limit);
            print_json(&outcome)?;
        }
        Commands::Trend {
            source,
            student,
            competency,
            numeric,
        } => {
            let mut filter = RecordFilter::default().student(student);
            if let Some(competency) = competency {
                filter = filter.competency(competency);
            }
            let mut records = filter.apply(&load_scoped(&source)?);
            sort_chronologically(&mut records);

            if numeric {
                let outcome = student_evolution(&records, &config.numeric, &config.trend.numeric);
                note_rejected(&outcome);
                print_json(&outcome)?;
            } else {
                let evolution = competency_evolution(&records, &config.trend.ordinal)
                    .with_context(|| format!("cannot follow student {student}"))?;
                print_json(&evolution)?;
            }
        }
        Commands::Dashboard {
            source,
            grade_level,
            section,
            period,
            year,
        } => {
            let records = RecordFilter::default()
                .section(grade_level, section)
                .period(period, year)
                .apply(&load_scoped(&source)?);
            let outcome = section_dashboard(&records, &config.numeric);
            note_rejected(&outcome);
            print_json(&outcome)?;
        }
        Commands::Report {
            source,
            period,
            year,
            grade_level,
            section,
            out,
        } => {
            let records = load_scoped(&source)?;
            let in_scope = RecordFilter {
                grade_level: grade_level.clone(),
                section: section.clone(),
                ..RecordFilter::default()
            }
            .apply(&records);
            let in_period = RecordFilter::default().period(period.clone(), year).apply(&in_scope);

            let competencies = competency_risk_table(&in_period, &config.cohort_risk);
            let query = RosterQuery {
                period: period.clone(),
                year,
                grade_level: grade_level.clone(),
                section: section.clone(),
            };
            let roster = at_risk_roster(&in_scope, &query, &config.student_risk);
            let trends = analyze_trends(&in_scope, &config.trend.ordinal);
            note_rejected(&trends);

            let scope = match (&grade_level, &section) {
                (Some(level), Some(section)) => Some(format!("{level} {section}")),
                (Some(level), None) => Some(level.clone()),
                _ => None,
            };
            let report = build_report(&ReportInput {
                scope: scope.as_deref(),
                period: &period,
                year,
                generated_on: chrono::Utc::now().date_naive(),
                competencies: &competencies.value,
                roster: &roster.value,
                trends: &trends.value,
                rejected: trends.errors.len(),
            });
            std::fs::write(&out, report).with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
