mod logger;

pub use logger::init_logger;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::File;
use uuid::Uuid;

use crate::application::{AppError, PortalService, Response, ValidationError};
use crate::domain::{ProfileUpdate, format_cents, parse_cents};
use crate::io::{Exporter, ImportOptions, ImportResult, Importer};

/// Bursar - student accounts, tuition ledgers and enrollments
#[derive(Parser)]
#[command(name = "bursar")]
#[command(about = "Student-portal account provisioning, tuition ledger and enrollment tool")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "BURSAR_DATABASE", default_value = "bursar.db")]
    pub database: String,

    /// Enable debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Create a student account with its profile and default enrollments
    Provision {
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, default_value = "")]
        email: String,

        #[arg(long, default_value = "")]
        password: String,
    },

    /// Verify an email/password pair
    Login {
        #[arg(long, default_value = "")]
        email: String,

        #[arg(long, default_value = "")]
        password: String,
    },

    /// Record a tuition payment (e.g., "800.00" or "800")
    Pay {
        /// Account ID
        account: Uuid,

        /// Amount to pay
        amount: String,
    },

    /// Show the tuition balance of an account
    Balance {
        /// Account ID
        account: Uuid,
    },

    /// Enroll an account in a course
    Enroll { account: Uuid, course: Uuid },

    /// Remove an account from a course
    Drop { account: Uuid, course: Uuid },

    /// Profile commands
    #[command(subcommand)]
    Profile(ProfileCommands),

    /// Course catalog commands
    #[command(subcommand)]
    Course(CourseCommands),

    /// Ledger provisioning and export
    #[command(subcommand)]
    Ledger(LedgerCommands),

    /// Import catalog or ledger data from CSV
    #[command(subcommand)]
    Import(ImportCommands),

    /// Verify persisted state against the ledger and enrollment invariants
    Check,
}

#[derive(Subcommand)]
pub enum ProfileCommands {
    /// Write profile fields (unset fields are cleared)
    Update {
        account: Uuid,

        #[arg(long)]
        registration_no: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        department: Option<String>,

        #[arg(long)]
        year: Option<i64>,

        #[arg(long)]
        gpa: Option<f64>,
    },
}

#[derive(Subcommand)]
pub enum CourseCommands {
    /// Add a course to the catalog
    Add {
        /// Course name
        name: String,

        /// Unique course code (e.g., "CS101")
        #[arg(long)]
        code: String,

        #[arg(long)]
        icon: Option<String>,

        #[arg(long)]
        instructor: Option<String>,
    },

    /// List the catalog
    List,

    /// List the courses an account is enrolled in
    Enrolled { account: Uuid },
}

#[derive(Subcommand)]
pub enum LedgerCommands {
    /// Open the tuition ledger for an account
    Open {
        account: Uuid,

        /// Total obligation (e.g., "1000.00")
        total: String,
    },

    /// Export all ledgers
    Export {
        #[arg(long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ImportCommands {
    /// Import courses (name,code,icon,instructor)
    Courses {
        file: String,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        skip_duplicates: bool,
    },

    /// Open ledgers (email,total_amount)
    Ledgers {
        file: String,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        skip_duplicates: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl Cli {
    /// Dispatch the command. Returns whether it succeeded; request failures
    /// are reported as payloads on stdout, not as errors.
    pub async fn run(self) -> Result<bool> {
        let service = if matches!(self.command, Commands::Init) {
            PortalService::init(&self.database).await?
        } else {
            PortalService::connect(&self.database).await?
        };

        let response = match self.command {
            Commands::Init => {
                println!("Database initialized: {}", self.database);
                return Ok(true);
            }

            Commands::Provision {
                name,
                email,
                password,
            } => Response::provisioned(service.provision(&name, &email, &password).await),

            Commands::Login { email, password } => {
                Response::login(service.login(&email, &password).await)
            }

            Commands::Pay { account, amount } => match parse_amount(&amount) {
                Ok(cents) => Response::payment(service.apply_payment(account, cents).await),
                Err(err) => Response::from_error(&err),
            },

            Commands::Balance { account } => Response::balance(service.balance(account).await),

            Commands::Enroll { account, course } => {
                Response::done(service.enroll(account, course).await)
            }

            Commands::Drop { account, course } => {
                Response::done(service.drop_enrollment(account, course).await)
            }

            Commands::Profile(ProfileCommands::Update {
                account,
                registration_no,
                phone,
                department,
                year,
                gpa,
            }) => {
                let update = ProfileUpdate {
                    registration_no,
                    phone,
                    department,
                    year,
                    gpa,
                };
                Response::done(service.update_profile(account, update).await)
            }

            Commands::Course(cmd) => return run_course_command(&service, cmd).await,

            Commands::Ledger(LedgerCommands::Open { account, total }) => {
                match parse_amount(&total) {
                    Ok(cents) => Response::payment(service.open_ledger(account, cents).await),
                    Err(err) => Response::from_error(&err),
                }
            }

            Commands::Ledger(LedgerCommands::Export { format, output }) => {
                run_export_command(&service, format, output).await?;
                return Ok(true);
            }

            Commands::Import(cmd) => return run_import_command(&service, cmd).await,

            Commands::Check => return run_check_command(&service).await,
        };

        println!("{}", serde_json::to_string(&response)?);
        Ok(response.ok)
    }
}

fn parse_amount(input: &str) -> Result<i64, AppError> {
    parse_cents(input).map_err(|e| ValidationError::InvalidAmount(e.to_string()).into())
}

async fn run_course_command(service: &PortalService, cmd: CourseCommands) -> Result<bool> {
    let courses = match cmd {
        CourseCommands::Add {
            name,
            code,
            icon,
            instructor,
        } => {
            let response = match service.add_course(&name, &code, icon, instructor).await {
                Ok(course) => Response::ok().with_field("course_id", course.id),
                Err(err) => Response::from_error(&err),
            };
            println!("{}", serde_json::to_string(&response)?);
            return Ok(response.ok);
        }
        CourseCommands::List => service.list_courses().await?,
        CourseCommands::Enrolled { account } => service.enrolled_courses(account).await?,
    };

    if courses.is_empty() {
        println!("No courses found.");
    } else {
        println!("{:<38} {:<10} {:<30} INSTRUCTOR", "ID", "CODE", "NAME");
        println!("{}", "-".repeat(96));
        for course in courses {
            println!(
                "{:<38} {:<10} {:<30} {}",
                course.id,
                course.code,
                truncate(&course.name, 30),
                course.instructor.as_deref().unwrap_or("")
            );
        }
    }
    Ok(true)
}

async fn run_export_command(
    service: &PortalService,
    format: ExportFormat,
    output: Option<String>,
) -> Result<()> {
    let writer: Box<dyn std::io::Write> = match output {
        Some(path) => {
            Box::new(File::create(&path).with_context(|| format!("Cannot create {}", path))?)
        }
        None => Box::new(std::io::stdout()),
    };

    let exporter = Exporter::new(service);
    match format {
        ExportFormat::Csv => {
            let count = exporter.export_ledgers_csv(writer).await?;
            eprintln!("Exported {} ledgers", count);
        }
        ExportFormat::Json => {
            let snapshot = exporter.export_json(writer).await?;
            eprintln!(
                "Exported {} courses and {} ledgers",
                snapshot.courses.len(),
                snapshot.ledgers.len()
            );
        }
    }
    Ok(())
}

async fn run_import_command(service: &PortalService, cmd: ImportCommands) -> Result<bool> {
    let importer = Importer::new(service);

    let (result, dry_run) = match cmd {
        ImportCommands::Courses {
            file,
            dry_run,
            skip_duplicates,
        } => {
            let reader = File::open(&file).with_context(|| format!("Cannot open {}", file))?;
            let options = ImportOptions {
                dry_run,
                skip_duplicates,
            };
            (importer.import_courses_csv(reader, options).await?, dry_run)
        }
        ImportCommands::Ledgers {
            file,
            dry_run,
            skip_duplicates,
        } => {
            let reader = File::open(&file).with_context(|| format!("Cannot open {}", file))?;
            let options = ImportOptions {
                dry_run,
                skip_duplicates,
            };
            (importer.import_ledgers_csv(reader, options).await?, dry_run)
        }
    };

    print_import_result(&result, dry_run);
    Ok(result.errors.is_empty())
}

fn print_import_result(result: &ImportResult, dry_run: bool) {
    if dry_run {
        println!("Validation successful");
    } else {
        println!("Import complete");
    }
    println!("  Imported: {}", result.imported);
    println!("  Skipped:  {}", result.skipped);
    println!("  Errors:   {}", result.errors.len());

    for error in &result.errors {
        match &error.field {
            Some(field) => println!("  line {} ({}): {}", error.line, field, error.error),
            None => println!("  line {}: {}", error.line, error.error),
        }
    }
}

async fn run_check_command(service: &PortalService) -> Result<bool> {
    println!("Checking persisted state...\n");

    let report = service.check_integrity().await?;

    println!("Accounts:    {}", report.account_count);
    println!("Ledgers:     {}", report.ledger_count);
    println!("Enrollments: {}", report.enrollment_count);
    println!();

    if report.accounts_without_profile > 0 {
        println!(
            "✗ {} account(s) without a profile",
            report.accounts_without_profile
        );
    }
    if report.orphan_enrollments > 0 {
        println!(
            "✗ {} enrollment(s) reference a missing account or course",
            report.orphan_enrollments
        );
    }
    for ledger in &report.inconsistent_ledgers {
        println!(
            "✗ ledger {}: total {} paid {} overdue {}",
            ledger.account_id,
            format_cents(ledger.total),
            format_cents(ledger.paid),
            format_cents(ledger.overdue)
        );
    }

    if report.is_valid {
        println!("✓ All checks passed");
    }
    Ok(report.is_valid)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
