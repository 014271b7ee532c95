use clap::{Parser, Subcommand};

use teampulse::{
    ActivityStatus, GlobalRole, IssueFetcher, Period, RedmineClient, TeamPulse, TeamRole,
};

#[derive(Parser)]
#[command(name = "teampulse", about = "Team activity tracking and productivity reports")]
struct Cli {
    /// Database path (default: ~/.teampulse/teampulse.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,
    },
    /// Manage teams and rosters
    Team {
        #[command(subcommand)]
        action: TeamAction,
    },
    /// Record and update daylog activities
    Activity {
        #[command(subcommand)]
        action: ActivityAction,
    },
    /// Build a team productivity report (requires Redmine credentials in env)
    Report {
        /// Team id
        team_id: i64,
        /// Acting user id (must be the team's lead or a global admin)
        #[arg(long)]
        requester: i64,
        /// Reporting window: 2025-01, 2025-01-06:2025-01-19, 30d, or mtd
        #[arg(long, default_value = "mtd")]
        period: String,
    },
    /// Show database row counts
    Status,
}

#[derive(Subcommand)]
enum UserAction {
    /// Create a user
    Add {
        username: String,
        /// Grant the global admin role
        #[arg(long)]
        admin: bool,
    },
}

#[derive(Subcommand)]
enum TeamAction {
    /// Create a team
    Create { name: String },
    /// Add a user to a team (or update their team role)
    AddMember {
        team_id: i64,
        user_id: i64,
        /// Team role: member or team_admin
        #[arg(long, default_value = "member")]
        role: String,
    },
    /// Remove a user from a team
    RemoveMember { team_id: i64, user_id: i64 },
    /// Make a user the team's single lead
    SetLead { team_id: i64, user_id: i64 },
    /// List a team's roster
    Members { team_id: i64 },
}

#[derive(Subcommand)]
enum ActivityAction {
    /// Record an activity for a user
    Log {
        user_id: i64,
        /// Activity date, YYYY-MM-DD
        date: String,
        /// Start time, HH:MM
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Mark as worked-from-home
        #[arg(long)]
        wfh: bool,
    },
    /// Update an activity's status
    SetStatus {
        activity_id: i64,
        /// New status: in_progress, done, or blocked
        status: String,
        /// Acting user id (owner, their team lead, or a global admin)
        #[arg(long)]
        actor: i64,
        /// Reason, stored only with the blocked status
        #[arg(long)]
        reason: Option<String>,
    },
    /// List a user's activities within a period
    List {
        user_id: i64,
        /// Reporting window: 2025-01, 2025-01-06:2025-01-19, 30d, or mtd
        #[arg(long, default_value = "mtd")]
        period: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => teampulse::Database::open_at(path).await?,
        None => teampulse::Database::open().await?,
    };

    match cli.command {
        Commands::Status => {
            print_status(&db).await?;
        }
        Commands::User { action } => {
            let tp = offline(db);
            match action {
                UserAction::Add { username, admin } => {
                    let role = if admin {
                        GlobalRole::Admin
                    } else {
                        GlobalRole::User
                    };
                    let id = tp.add_user(&username, role).await?;
                    println!("Created user {username} (id {id})");
                }
            }
        }
        Commands::Team { action } => {
            let tp = offline(db);
            handle_team(&tp, action).await?;
        }
        Commands::Activity { action } => {
            let tp = offline(db);
            handle_activity(&tp, action).await?;
        }
        Commands::Report {
            team_id,
            requester,
            period,
        } => {
            let period = Period::parse(&period)?;
            let client = RedmineClient::from_env()?;
            let tp = TeamPulse::new(db, IssueFetcher::new(std::sync::Arc::new(client)));
            let reply = tp.team_report_reply(team_id, requester, &period).await;
            println!("{}", serde_json::to_string_pretty(&reply.body)?);
            if !reply.is_success() {
                anyhow::bail!("report failed with status {}", reply.status);
            }
        }
    }

    Ok(())
}

/// Commands that never touch Redmine get a fetcher that fails every lookup.
fn offline(db: teampulse::Database) -> TeamPulse {
    struct Offline;

    #[async_trait::async_trait]
    impl teampulse::RedmineApi for Offline {
        async fn users_page(
            &self,
            _login: &str,
            _offset: u32,
            _limit: u32,
        ) -> teampulse::Result<teampulse::redmine::types::Page<teampulse::redmine::types::RedmineUser>>
        {
            Err(teampulse::Error::Config("Redmine is not configured".into()))
        }

        async fn issues_page(
            &self,
            _query: &teampulse::redmine::types::IssueQuery,
            _offset: u32,
            _limit: u32,
        ) -> teampulse::Result<teampulse::redmine::types::Page<teampulse::redmine::types::RemoteIssue>>
        {
            Err(teampulse::Error::Config("Redmine is not configured".into()))
        }
    }

    TeamPulse::new(db, IssueFetcher::new(std::sync::Arc::new(Offline)))
}

async fn handle_team(tp: &TeamPulse, action: TeamAction) -> anyhow::Result<()> {
    match action {
        TeamAction::Create { name } => {
            let id = tp.create_team(&name).await?;
            println!("Created team {name} (id {id})");
        }
        TeamAction::AddMember {
            team_id,
            user_id,
            role,
        } => {
            let role: TeamRole = role.parse()?;
            tp.add_member(team_id, user_id, role).await?;
            println!("Added user {user_id} to team {team_id} as {}", role.as_str());
        }
        TeamAction::RemoveMember { team_id, user_id } => {
            tp.remove_member(team_id, user_id).await?;
            println!("Removed user {user_id} from team {team_id}");
        }
        TeamAction::SetLead { team_id, user_id } => {
            tp.set_lead(team_id, user_id).await?;
            println!("User {user_id} is now the lead of team {team_id}");
        }
        TeamAction::Members { team_id } => {
            let members = tp.members(team_id).await?;
            if members.is_empty() {
                println!("No members.");
            }
            for m in members {
                let lead = if m.is_lead { " [lead]" } else { "" };
                println!(
                    "{:>6}  {:<20} {}{}",
                    m.user_id,
                    m.username,
                    m.team_role.as_str(),
                    lead
                );
            }
        }
    }
    Ok(())
}

async fn handle_activity(tp: &TeamPulse, action: ActivityAction) -> anyhow::Result<()> {
    match action {
        ActivityAction::Log {
            user_id,
            date,
            time,
            description,
            wfh,
        } => {
            let id = tp
                .log_activity(user_id, &date, time.as_deref(), description.as_deref(), wfh)
                .await?;
            println!("Logged activity {id} for user {user_id} on {date}");
        }
        ActivityAction::SetStatus {
            activity_id,
            status,
            actor,
            reason,
        } => {
            let status: ActivityStatus = status.parse()?;
            tp.set_activity_status(actor, activity_id, status, reason.as_deref())
                .await?;
            println!("Activity {activity_id} is now {status}");
        }
        ActivityAction::List { user_id, period } => {
            let period = Period::parse(&period)?;
            let activities = tp.list_activities(user_id, &period).await?;
            if activities.is_empty() {
                println!("No activities in {}.", period.to_key());
            }
            for a in activities {
                let time = a.time.as_deref().unwrap_or("--:--");
                let wfh = if a.wfh { " wfh" } else { "" };
                let detail = match (&a.description, &a.blocked_reason) {
                    (_, Some(reason)) => format!("  (blocked: {reason})"),
                    (Some(desc), None) => format!("  {desc}"),
                    (None, None) => String::new(),
                };
                println!(
                    "{:>6}  {} {}  {:<11}{}{}",
                    a.activity_id, a.date, time, a.status, wfh, detail
                );
            }
        }
    }
    Ok(())
}

async fn print_status(db: &teampulse::Database) -> anyhow::Result<()> {
    let counts: Vec<(String, i64)> = db
        .reader()
        .call(|conn| {
            let tables = ["users", "teams", "team_members", "activities"];
            let mut counts = Vec::with_capacity(tables.len());
            for table in tables {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                        row.get(0)
                    })?;
                counts.push((table.to_string(), n));
            }
            Ok::<_, rusqlite::Error>(counts)
        })
        .await?;

    for (table, n) in counts {
        println!("{table:<15} {n:>8}");
    }
    Ok(())
}
