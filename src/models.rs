use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    TeamLead,
    Employee,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::TeamLead => "team_lead",
            Self::Employee => "employee",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "admin" => Some(Self::Admin),
            "team_lead" => Some(Self::TeamLead),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Hot,
    FollowUp,
    Block,
    General,
}

impl Category {
    pub const ALL: [Category; 4] = [Self::Hot, Self::FollowUp, Self::Block, Self::General];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::FollowUp => "follow_up",
            Self::Block => "block",
            Self::General => "general",
        }
    }

    /// Human label, e.g. `follow up`.
    pub fn label(self) -> String {
        self.as_str().replace('_', " ")
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "hot" => Some(Self::Hot),
            "follow_up" => Some(Self::FollowUp),
            "block" => Some(Self::Block),
            "general" => Some(Self::General),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Which filtered list a dashboard asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Assigned,
    Today,
    Hot,
    FollowUp,
    Block,
    General,
}

impl ViewKind {
    pub fn target_category(self) -> Option<Category> {
        match self {
            Self::Hot => Some(Category::Hot),
            Self::FollowUp => Some(Category::FollowUp),
            Self::Block => Some(Category::Block),
            Self::General => Some(Category::General),
            Self::Assigned | Self::Today => None,
        }
    }
}

/// Working set a view is computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    User(String),
    Team(String),
    Global,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileWithRoles {
    #[serde(flatten)]
    pub profile: Profile,
    pub roles: Vec<Role>,
}

/// The signed-in user a request is made on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewer {
    pub user_id: String,
    pub display_name: String,
    pub roles: Vec<Role>,
}

impl Viewer {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(Role::Admin)
    }

    pub fn is_team_lead(&self) -> bool {
        self.has_role(Role::TeamLead)
    }

    /// Highest-privilege role held, used to pick a default scope.
    pub fn primary_role(&self) -> Option<Role> {
        self.roles.iter().copied().min()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub company_name: String,
    pub owner_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub products_services: Option<String>,
    pub assigned_to_id: Option<String>,
    pub created_by_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub company_id: String,
    pub user_id: String,
    pub comment_text: String,
    pub category: Category,
    pub comment_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

/// A company as rendered in a list: newest-first history plus derived category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyView {
    #[serde(flatten)]
    pub company: Company,
    pub assigned_to_name: Option<String>,
    pub category: Option<Category>,
    pub comments: Vec<CommentView>,
}

impl CompanyView {
    pub fn last_comment(&self) -> Option<&CommentView> {
        self.comments.first()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTransition {
    pub from: Category,
    pub to: Category,
}

impl CategoryTransition {
    pub fn describe(&self) -> String {
        format!("moved from {} to {} category", self.from.label(), self.to.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentResponse {
    pub comment: Comment,
    pub previous_category: Option<Category>,
    pub category: Category,
    pub transition: Option<CategoryTransition>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub team_lead_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    #[serde(flatten)]
    pub team: Team,
    pub lead_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub team_id: String,
    pub employee_id: String,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMemberView {
    #[serde(flatten)]
    pub member: TeamMember,
    pub employee: Profile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamDetail {
    pub team: Team,
    pub members: Vec<TeamMemberView>,
}

impl TeamDetail {
    /// Team lead first, then members.
    pub fn person_ids(&self) -> Vec<String> {
        let mut ids = vec![self.team.team_lead_id.clone()];
        ids.extend(self.members.iter().map(|member| member.member.employee_id.clone()));
        ids
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Assignee {
    pub id: String,
    pub display_name: String,
    pub is_team_lead: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    pub hot: usize,
    pub follow_up: usize,
    pub block: usize,
    pub general: usize,
}

impl CategoryCounts {
    pub fn get(&self, category: Category) -> usize {
        match category {
            Category::Hot => self.hot,
            Category::FollowUp => self.follow_up,
            Category::Block => self.block,
            Category::General => self.general,
        }
    }

    pub fn bump(&mut self, category: Category) {
        match category {
            Category::Hot => self.hot += 1,
            Category::FollowUp => self.follow_up += 1,
            Category::Block => self.block += 1,
            Category::General => self.general += 1,
        }
    }

    pub fn add(&mut self, other: &CategoryCounts) {
        self.hot += other.hot;
        self.follow_up += other.follow_up;
        self.block += other.block;
        self.general += other.general;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub is_team_lead: bool,
    pub company_count: usize,
    #[serde(flatten)]
    pub counts: CategoryCounts,
    pub companies: Vec<CompanyView>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategorySlice {
    pub category: Category,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamOverview {
    pub team: Team,
    pub lead: Option<MemberStats>,
    pub members: Vec<MemberStats>,
    pub total_companies: usize,
    pub totals: CategoryCounts,
    pub distribution: Vec<CategorySlice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataRequest {
    pub id: String,
    pub requested_by_id: String,
    pub requested_from_id: Option<String>,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataRequestView {
    #[serde(flatten)]
    pub request: DataRequest,
    pub requested_by_name: Option<String>,
    pub requested_by_email: Option<String>,
    pub requested_from_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Holiday {
    pub id: String,
    pub holiday_date: NaiveDate,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterProfilePayload {
    pub display_name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewCompanyPayload {
    pub company_name: String,
    pub owner_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub products_services: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCommentPayload {
    pub company_id: String,
    pub comment_text: String,
    pub category: Category,
    pub comment_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignCompanyPayload {
    pub company_id: String,
    pub assignee_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeamPayload {
    pub name: String,
    pub team_lead_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataRequestPayload {
    pub message: String,
    pub requested_from_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolidayPayload {
    pub holiday_date: NaiveDate,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BooleanResponse {
    pub value: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// IANA zone used to decide what "today" means.
    pub timezone: String,
    pub list_limit: u32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            timezone: "UTC".to_string(),
            list_limit: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Transient, user-facing message (a toast).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
