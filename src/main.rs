use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use leadtrack_lib::models::{
    AddCommentPayload, AssignCompanyPayload, Category, CreateTeamPayload, DataRequestPayload, HolidayPayload,
    NewCompanyPayload, NoticeLevel, RegisterProfilePayload, RequestStatus, Role, Scope, ViewKind, Viewer,
};
use leadtrack_lib::LeadService;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "leadtrack", version, about = "Role-based sales lead tracker")]
struct Cli {
    /// Directory holding the database and logs.
    #[arg(long, env = "LEADTRACK_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Profile id to act as.
    #[arg(long = "as", env = "LEADTRACK_USER", global = true)]
    as_user: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a profile (first profile becomes admin)
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Show the acting user and roles
    Whoami,
    /// List profiles with roles (admin)
    Profiles,
    /// Grant a role (admin)
    AssignRole {
        #[arg(long)]
        user: String,
        #[arg(long, value_parser = parse_role)]
        role: Role,
    },
    #[command(subcommand)]
    Company(CompanyCommand),
    #[command(subcommand)]
    Comment(CommentCommand),
    /// Filtered company list
    View(ViewArgs),
    #[command(subcommand)]
    Team(TeamCommand),
    #[command(subcommand)]
    Request(RequestCommand),
    #[command(subcommand)]
    Holiday(HolidayCommand),
    #[command(subcommand)]
    Settings(SettingsCommand),
}

#[derive(Subcommand, Debug)]
enum CompanyCommand {
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        owner: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        products: Option<String>,
    },
    Show {
        id: String,
    },
    All,
    Unassigned,
    Team,
    Deleted,
    Assign {
        id: String,
        #[arg(long)]
        to: String,
    },
    /// Assign to the acting user
    Take {
        id: String,
    },
    Delete {
        id: String,
    },
    Restore {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum CommentCommand {
    Add {
        company_id: String,
        #[arg(long)]
        text: String,
        #[arg(long, value_parser = parse_category)]
        category: Category,
        /// Effective date, YYYY-MM-DD
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    List {
        company_id: String,
    },
}

#[derive(Args, Debug)]
struct ViewArgs {
    #[arg(value_parser = parse_view)]
    kind: ViewKind,
    #[arg(long, conflicts_with_all = ["team", "global"])]
    user: Option<String>,
    #[arg(long, conflicts_with = "global")]
    team: Option<String>,
    #[arg(long)]
    global: bool,
}

impl ViewArgs {
    fn scope(&self) -> Option<Scope> {
        if self.global {
            Some(Scope::Global)
        } else if let Some(team) = &self.team {
            Some(Scope::Team(team.clone()))
        } else {
            self.user.clone().map(Scope::User)
        }
    }
}

#[derive(Subcommand, Debug)]
enum TeamCommand {
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        lead: String,
    },
    List,
    Mine,
    AddMember {
        #[arg(long)]
        team: String,
        #[arg(long)]
        employee: String,
    },
    RemoveMember {
        member_id: String,
    },
    Available {
        #[arg(long)]
        team: String,
    },
    Assignees,
    Overview {
        #[arg(long)]
        team: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum RequestCommand {
    Create {
        #[arg(long)]
        message: String,
        #[arg(long)]
        from: Option<String>,
    },
    Mine,
    List,
    Review {
        id: String,
        #[arg(long, value_parser = parse_status)]
        status: RequestStatus,
    },
}

#[derive(Subcommand, Debug)]
enum HolidayCommand {
    Add {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        description: String,
    },
    List,
    Delete {
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    Show,
    /// Merge a JSON object into the settings (admin)
    Set {
        json: String,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    Role::parse(raw).ok_or_else(|| format!("unknown role '{}' (admin, team_lead, employee)", raw))
}

fn parse_category(raw: &str) -> Result<Category, String> {
    Category::parse(raw).ok_or_else(|| format!("unknown category '{}' (hot, follow_up, block, general)", raw))
}

fn parse_status(raw: &str) -> Result<RequestStatus, String> {
    RequestStatus::parse(raw).ok_or_else(|| format!("unknown status '{}' (pending, approved, rejected)", raw))
}

fn parse_view(raw: &str) -> Result<ViewKind, String> {
    match raw {
        "assigned" => Ok(ViewKind::Assigned),
        "today" => Ok(ViewKind::Today),
        other => Category::parse(other)
            .map(|category| match category {
                Category::Hot => ViewKind::Hot,
                Category::FollowUp => ViewKind::FollowUp,
                Category::Block => ViewKind::Block,
                Category::General => ViewKind::General,
            })
            .ok_or_else(|| {
                format!(
                    "unknown view '{}' (assigned, today, hot, follow_up, block, general)",
                    other
                )
            }),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

struct Session {
    service: LeadService,
    as_user: Option<String>,
}

impl Session {
    fn viewer(&self) -> anyhow::Result<Viewer> {
        let user_id = self
            .as_user
            .as_deref()
            .ok_or_else(|| anyhow!("no acting user: pass --as <profile-id> or set LEADTRACK_USER"))?;
        Ok(self.service.viewer(user_id)?)
    }
}

fn run(session: &Session, command: Command) -> anyhow::Result<()> {
    let service = &session.service;
    match command {
        Command::Register { name, email, phone } => print_json(&service.register_profile(RegisterProfilePayload {
            display_name: name,
            email,
            phone,
        })?),
        Command::Whoami => print_json(&session.viewer()?),
        Command::Profiles => print_json(&service.list_profiles(&session.viewer()?)?),
        Command::AssignRole { user, role } => print_json(&service.assign_role(&session.viewer()?, &user, role)?),
        Command::Company(command) => {
            let viewer = session.viewer()?;
            match command {
                CompanyCommand::Add {
                    name,
                    owner,
                    phone,
                    email,
                    address,
                    products,
                } => print_json(&service.add_company(
                    &viewer,
                    NewCompanyPayload {
                        company_name: name,
                        owner_name: owner,
                        phone,
                        email,
                        address,
                        products_services: products,
                    },
                )?),
                CompanyCommand::Show { id } => print_json(&service.get_company(&viewer, &id)?),
                CompanyCommand::All => print_json(&service.list_all_companies(&viewer)?),
                CompanyCommand::Unassigned => print_json(&service.list_unassigned_companies(&viewer)?),
                CompanyCommand::Team => print_json(&service.list_team_companies(&viewer)?),
                CompanyCommand::Deleted => print_json(&service.list_deleted_companies(&viewer)?),
                CompanyCommand::Assign { id, to } => print_json(&service.assign_company(
                    &viewer,
                    AssignCompanyPayload {
                        company_id: id,
                        assignee_id: to,
                    },
                )?),
                CompanyCommand::Take { id } => print_json(&service.assign_to_self(&viewer, &id)?),
                CompanyCommand::Delete { id } => print_json(&service.delete_company(&viewer, &id)?),
                CompanyCommand::Restore { id } => print_json(&service.restore_company(&viewer, &id)?),
            }
        }
        Command::Comment(command) => {
            let viewer = session.viewer()?;
            match command {
                CommentCommand::Add {
                    company_id,
                    text,
                    category,
                    date,
                } => print_json(&service.add_comment(
                    &viewer,
                    AddCommentPayload {
                        company_id,
                        comment_text: text,
                        category,
                        comment_date: date,
                    },
                )?),
                CommentCommand::List { company_id } => print_json(&service.list_comments(&viewer, &company_id)?),
            }
        }
        Command::View(args) => {
            let viewer = session.viewer()?;
            print_json(&service.list_view(&viewer, args.kind, args.scope())?)
        }
        Command::Team(command) => {
            let viewer = session.viewer()?;
            match command {
                TeamCommand::Create { name, lead } => print_json(&service.create_team(
                    &viewer,
                    CreateTeamPayload {
                        name,
                        team_lead_id: lead,
                    },
                )?),
                TeamCommand::List => print_json(&service.list_teams(&viewer)?),
                TeamCommand::Mine => print_json(&service.my_team(&viewer)?),
                TeamCommand::AddMember { team, employee } => {
                    print_json(&service.add_team_member(&viewer, &team, &employee)?)
                }
                TeamCommand::RemoveMember { member_id } => print_json(&service.remove_team_member(&viewer, &member_id)?),
                TeamCommand::Available { team } => print_json(&service.available_employees(&viewer, &team)?),
                TeamCommand::Assignees => print_json(&service.assignees(&viewer)?),
                TeamCommand::Overview { team } => print_json(&service.team_overview(&viewer, team.as_deref())?),
            }
        }
        Command::Request(command) => {
            let viewer = session.viewer()?;
            match command {
                RequestCommand::Create { message, from } => print_json(&service.create_data_request(
                    &viewer,
                    DataRequestPayload {
                        message,
                        requested_from_id: from,
                    },
                )?),
                RequestCommand::Mine => print_json(&service.list_my_data_requests(&viewer)?),
                RequestCommand::List => print_json(&service.list_data_requests(&viewer)?),
                RequestCommand::Review { id, status } => {
                    print_json(&service.update_data_request_status(&viewer, &id, status)?)
                }
            }
        }
        Command::Holiday(command) => match command {
            HolidayCommand::List => print_json(&service.list_holidays()?),
            HolidayCommand::Add { date, description } => print_json(&service.add_holiday(
                &session.viewer()?,
                HolidayPayload {
                    holiday_date: date,
                    description,
                },
            )?),
            HolidayCommand::Delete { id } => print_json(&service.delete_holiday(&session.viewer()?, &id)?),
        },
        Command::Settings(command) => match command {
            SettingsCommand::Show => print_json(&service.get_settings()?),
            SettingsCommand::Set { json } => {
                let update: serde_json::Value =
                    serde_json::from_str(&json).context("settings update must be a JSON object")?;
                print_json(&service.update_settings(&session.viewer()?, update)?)
            }
        },
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let data_dir = cli.data_dir.unwrap_or_else(leadtrack_lib::default_data_dir);
    let service = leadtrack_lib::open(&data_dir)
        .with_context(|| format!("failed to open data directory {}", data_dir.display()))?;
    let mut notices = service.subscribe();

    let session = Session {
        service,
        as_user: cli.as_user,
    };
    let result = run(&session, cli.command);

    while let Ok(notice) = notices.try_recv() {
        let label = match notice.level {
            NoticeLevel::Success => "ok",
            NoticeLevel::Info => "info",
            NoticeLevel::Error => "error",
        };
        eprintln!("[{}] {}", label, notice.message);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, Session, SettingsCommand};
    use clap::Parser;
    use leadtrack_lib::models::{Scope, ViewKind};
    use leadtrack_lib::LeadService;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("leadtrack").chain(args.iter().copied()))
    }

    fn view_args(args: &[&str]) -> super::ViewArgs {
        match parse(args).expect("parse").command {
            Command::View(view) => view,
            other => panic!("expected view, got {other:?}"),
        }
    }

    #[test]
    fn view_names_map_to_view_kinds() {
        let cases = [
            ("assigned", ViewKind::Assigned),
            ("today", ViewKind::Today),
            ("hot", ViewKind::Hot),
            ("follow_up", ViewKind::FollowUp),
            ("block", ViewKind::Block),
            ("general", ViewKind::General),
        ];
        for (name, kind) in cases {
            assert_eq!(view_args(&["view", name]).kind, kind, "{name}");
        }
        assert!(parse(&["view", "cold"]).is_err());
    }

    #[test]
    fn view_scope_flags_conflict() {
        assert!(parse(&["view", "hot", "--user", "u1", "--team", "t1"]).is_err());
        assert!(parse(&["view", "hot", "--user", "u1", "--global"]).is_err());
        assert!(parse(&["view", "hot", "--team", "t1", "--global"]).is_err());
    }

    #[test]
    fn view_scope_follows_flags() {
        assert_eq!(view_args(&["view", "hot"]).scope(), None);
        assert_eq!(view_args(&["view", "hot", "--global"]).scope(), Some(Scope::Global));
        assert_eq!(
            view_args(&["view", "hot", "--team", "t1"]).scope(),
            Some(Scope::Team("t1".to_string()))
        );
        assert_eq!(
            view_args(&["view", "hot", "--user", "u1"]).scope(),
            Some(Scope::User("u1".to_string()))
        );
    }

    #[test]
    fn acting_user_is_accepted_after_the_subcommand() {
        let cli = parse(&["view", "today", "--as", "u42"]).expect("parse");
        assert_eq!(cli.as_user.as_deref(), Some("u42"));
        let cli = parse(&["--as", "u7", "whoami"]).expect("parse");
        assert_eq!(cli.as_user.as_deref(), Some("u7"));
        assert!(matches!(cli.command, Command::Whoami));
    }

    #[test]
    fn settings_set_takes_raw_json() {
        let cli = parse(&["settings", "set", r#"{"timezone":"UTC"}"#]).expect("parse");
        match cli.command {
            Command::Settings(SettingsCommand::Set { json }) => assert_eq!(json, r#"{"timezone":"UTC"}"#),
            other => panic!("expected settings set, got {other:?}"),
        }
    }

    #[test]
    fn enum_flags_reject_unknown_values() {
        assert!(parse(&["assign-role", "--user", "u1", "--role", "owner"]).is_err());
        assert!(parse(&["comment", "add", "c1", "--text", "hi", "--category", "warm"]).is_err());
        assert!(parse(&["request", "review", "r1", "--status", "done"]).is_err());
        assert!(parse(&["comment", "add", "c1", "--text", "hi", "--category", "follow_up"]).is_ok());
    }

    #[test]
    fn session_without_acting_user_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = Session {
            service: LeadService::new(dir.path()).expect("service"),
            as_user: None,
        };
        let error = session.viewer().expect_err("no user");
        assert!(error.to_string().contains("--as"));
    }
}
