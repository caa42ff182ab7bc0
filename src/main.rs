use civic::db::MAX_PAGE_LIMIT;
use civic::export::{export_filename, issues_to_csv};
use civic::{Config, Database, Issue, IssueFilter, IssueSubmission, Pagination, Status};
use clap::{Args, CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "civic")]
#[command(author, version, about = "Civic issue reporting - citizen portal, admin dashboard and store tools")]
struct Cli {
    /// Database file (overrides civic.toml and CIVIC_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// reported, in_progress or resolved
    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    priority: Option<String>,

    /// Case-insensitive text search over title and description
    #[arg(long)]
    search: Option<String>,
}

impl From<FilterArgs> for IssueFilter {
    fn from(args: FilterArgs) -> Self {
        IssueFilter {
            status: args.status,
            category: args.category,
            priority: args.priority,
            search: args.search,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server (citizen portal, admin dashboard, JSON API)
    Serve {
        /// Interface to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (default: $PORT or 3000)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for uploaded photos
        #[arg(long)]
        uploads: Option<PathBuf>,

        /// Directory holding index.html, admin.html and assets
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Report a new issue from the command line
    Report {
        #[arg(short, long)]
        title: String,

        #[arg(short, long)]
        description: String,

        #[arg(short, long)]
        category: String,

        #[arg(long)]
        priority: Option<String>,

        #[arg(long)]
        address: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        latitude: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        longitude: Option<String>,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,
    },

    /// List issues, newest first
    List {
        #[command(flatten)]
        filter: FilterArgs,

        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(short, long, default_value_t = 10)]
        limit: u32,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one issue
    Show {
        id: i32,

        #[arg(long)]
        json: bool,
    },

    /// Change an issue's status (any status may follow any other)
    Update {
        id: i32,

        #[arg(short, long)]
        status: Status,

        /// Admin notes; omitting this clears existing notes
        #[arg(short, long)]
        notes: Option<String>,
    },

    /// Show totals by status and category
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Export matching issues as CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output file; "-" for stdout. Default: civic-issues-<date>.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completions
    Completion {
        shell: clap_complete::Shell,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Command::Serve { .. } => "info",
        _ => "warn",
    };
    init_tracing(default_level);

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult {
    let mut config = Config::load();
    if let Some(db) = cli.db {
        config.storage.database = db;
    }

    match cli.command {
        Command::Completion { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "civic", &mut std::io::stdout());
            Ok(())
        }

        Command::Serve {
            host,
            port,
            uploads,
            static_dir,
        } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = uploads {
                config.storage.upload_dir = dir;
            }
            if let Some(dir) = static_dir {
                config.storage.static_dir = dir;
            }

            let db = Database::open_at(&config.storage.database)?;
            tracing::info!(path = %config.storage.database.display(), "Connected to SQLite database");
            let result = civic::serve::run(&config, &db);
            db.close();
            result?;
            Ok(())
        }

        Command::Report {
            title,
            description,
            category,
            priority,
            address,
            latitude,
            longitude,
            name,
            email,
            phone,
        } => {
            let db = Database::open_at(&config.storage.database)?;
            let id = db.create_issue(&IssueSubmission {
                title: Some(title),
                description: Some(description),
                category: Some(category),
                priority,
                address,
                latitude,
                longitude,
                reporter_name: name,
                reporter_email: email,
                reporter_phone: phone,
                ..Default::default()
            })?;
            println!("{} issue #{}", "Reported".green(), id);
            Ok(())
        }

        Command::List {
            filter,
            page,
            limit,
            json,
        } => {
            let db = Database::open_at(&config.storage.database)?;
            let page = db.list_issues(&filter.into(), Pagination::new(page, limit.min(MAX_PAGE_LIMIT))?)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
                return Ok(());
            }

            if page.issues.is_empty() {
                println!("No issues found.");
                return Ok(());
            }
            for issue in &page.issues {
                print_issue_line(issue);
            }
            let pages = (page.total + i64::from(page.limit) - 1) / i64::from(page.limit);
            println!(
                "\n{} issue(s), page {} of {}",
                page.total,
                page.page,
                pages.max(1)
            );
            Ok(())
        }

        Command::Show { id, json } => {
            let db = Database::open_at(&config.storage.database)?;
            let issue = db.get_issue(id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&issue)?);
            } else {
                print_issue_detail(&issue);
            }
            Ok(())
        }

        Command::Update { id, status, notes } => {
            let db = Database::open_at(&config.storage.database)?;
            db.update_status(id, status, notes.as_deref())?;
            println!("{} issue #{} to {}", "Updated".green(), id, status_label(status.as_str()));
            Ok(())
        }

        Command::Stats { json } => {
            let db = Database::open_at(&config.storage.database)?;
            let stats = db.stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            println!("{}", "Issue statistics".bold());
            println!("   Total:       {}", stats.total);
            println!("   Reported:    {}", stats.reported);
            println!("   In progress: {}", stats.in_progress);
            println!("   Resolved:    {}", stats.resolved);
            if !stats.categories.is_empty() {
                println!("\n{}", "By category".bold());
                for c in &stats.categories {
                    println!("   {:<12} {}", c.category, c.count);
                }
            }
            Ok(())
        }

        Command::Export { filter, output } => {
            let db = Database::open_at(&config.storage.database)?;
            let issues = db.all_issues(&filter.into())?;
            let csv = issues_to_csv(&issues);

            let output =
                output.unwrap_or_else(|| PathBuf::from(export_filename(chrono::Local::now().date_naive())));
            if output.as_os_str() == "-" {
                println!("{}", csv);
            } else {
                std::fs::write(&output, format!("{}\n", csv))?;
                eprintln!(
                    "{} {} issue(s) to {}",
                    "Exported".green(),
                    issues.len(),
                    output.display()
                );
            }
            Ok(())
        }
    }
}

fn status_label(status: &str) -> colored::ColoredString {
    match status {
        "reported" => status.yellow(),
        "in_progress" => status.blue(),
        "resolved" => status.green(),
        other => other.normal(),
    }
}

fn print_issue_line(issue: &Issue) {
    println!(
        "#{:<5} [{}] {} ({}, {}) {}",
        issue.id,
        status_label(&issue.status),
        issue.title.bold(),
        issue.category,
        issue.priority,
        issue.created_at.dimmed()
    );
}

fn print_issue_detail(issue: &Issue) {
    println!("{} {}", format!("#{}", issue.id).bold(), issue.title.bold());
    println!("   Status:      {}", status_label(&issue.status));
    println!("   Category:    {}", issue.category);
    println!("   Priority:    {}", issue.priority);
    if let Some(address) = &issue.address {
        println!("   Address:     {}", address);
    }
    if let (Some(lat), Some(lng)) = (issue.latitude, issue.longitude) {
        println!("   Location:    {:.6}, {:.6}", lat, lng);
    }
    if let Some(image) = &issue.image_path {
        println!("   Photo:       /uploads/{}", image);
    }
    let reporter: Vec<&str> = [&issue.reporter_name, &issue.reporter_email, &issue.reporter_phone]
        .into_iter()
        .filter_map(|v| v.as_deref())
        .collect();
    if reporter.is_empty() {
        println!("   Reporter:    anonymous");
    } else {
        println!("   Reporter:    {}", reporter.join(", "));
    }
    println!("   Created:     {}", issue.created_at);
    println!("   Updated:     {}", issue.updated_at);
    println!("\n{}", issue.description);
    if let Some(notes) = &issue.admin_notes {
        println!("\n{} {}", "Admin notes:".bold(), notes);
    }
}
