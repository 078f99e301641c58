use crate::category::{apply_view, distribution, tally, transition};
use crate::db::{CompanyFilter, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{
    AddCommentPayload, AddCommentResponse, AppSettings, AssignCompanyPayload, Assignee, BooleanResponse,
    CategoryCounts, CommentView, Company, CompanyView, CreateTeamPayload, DataRequest, DataRequestPayload,
    DataRequestView, Holiday, HolidayPayload, MemberStats, NewCompanyPayload, Notice, Profile, ProfileWithRoles,
    RegisterProfilePayload, RequestStatus, Role, Scope, Team, TeamDetail, TeamMember, TeamOverview, TeamSummary,
    ViewKind, Viewer,
};
use crate::notify::Notifier;
use crate::policy::{parse_timezone, AccessPolicy};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

const NO_TEAM_MESSAGE: &str = "No team found. Contact your administrator to create a team for you.";

/// Application core: one method per user-facing operation.
///
/// Every public operation runs through [`LeadService::guarded`], so a failure
/// is logged and surfaces as an error notice before it is returned.
#[derive(Clone)]
pub struct LeadService {
    db: Arc<Database>,
    policy: AccessPolicy,
    notifier: Notifier,
}

impl LeadService {
    pub fn new(data_dir: &Path) -> AppResult<Self> {
        let db_path = data_dir.join("leadtrack.sqlite");
        let db = Arc::new(Database::new(&db_path)?);
        tracing::info!(path = %db.path().display(), "opened lead database");

        Ok(Self {
            db,
            policy: AccessPolicy::new(),
            notifier: Notifier::default(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notifier.subscribe()
    }

    fn guarded<T>(&self, action: &'static str, op: impl FnOnce() -> AppResult<T>) -> AppResult<T> {
        op().map_err(|error| {
            tracing::warn!(action, error = %error, "operation failed");
            self.notifier.error(error.user_message());
            error
        })
    }

    // Session and roles

    /// Resolves the signed-in user from a profile id.
    pub fn viewer(&self, user_id: &str) -> AppResult<Viewer> {
        self.guarded("viewer", || self.load_viewer(user_id))
    }

    fn load_viewer(&self, user_id: &str) -> AppResult<Viewer> {
        let profile = self
            .db
            .get_profile(user_id)?
            .ok_or_else(|| AppError::NotFound(format!("No profile found for user {}", user_id)))?;
        Ok(Viewer {
            user_id: profile.id,
            display_name: profile.display_name,
            roles: self.db.roles_for(user_id)?,
        })
    }

    /// New profiles are employees. The first profile registered while no
    /// admin exists is also made admin so the system can be operated.
    pub fn register_profile(&self, payload: RegisterProfilePayload) -> AppResult<ProfileWithRoles> {
        self.guarded("register_profile", || {
            let payload = self.policy.validate_profile(&payload)?;
            if self.db.find_profile_by_email(&payload.email)?.is_some() {
                return Err(AppError::Conflict(format!(
                    "A profile with email {} already exists",
                    payload.email
                )));
            }

            let profile = self.db.insert_profile(&payload)?;
            self.db.upsert_role(&profile.id, Role::Employee)?;
            if self.db.count_role(Role::Admin)? == 0 {
                self.db.upsert_role(&profile.id, Role::Admin)?;
                tracing::warn!(user_id = %profile.id, "no admin present, granted admin to new profile");
            }

            let roles = self.db.roles_for(&profile.id)?;
            tracing::info!(user_id = %profile.id, "registered profile");
            self.notifier.success("Profile created successfully!");
            Ok(ProfileWithRoles { profile, roles })
        })
    }

    pub fn list_profiles(&self, viewer: &Viewer) -> AppResult<Vec<ProfileWithRoles>> {
        self.guarded("list_profiles", || {
            self.policy.require_admin(viewer, "manage users")?;
            self.db.list_profiles()
        })
    }

    pub fn assign_role(&self, viewer: &Viewer, user_id: &str, role: Role) -> AppResult<ProfileWithRoles> {
        self.guarded("assign_role", || {
            self.policy.require_admin(viewer, "assign roles")?;
            let profile = self.require_profile(user_id)?;
            let granted = self.db.upsert_role(user_id, role)?;
            tracing::info!(user_id, role = role.as_str(), granted, "role assignment");
            self.notifier.success("Role assigned successfully!");
            Ok(ProfileWithRoles {
                profile,
                roles: self.db.roles_for(user_id)?,
            })
        })
    }

    // Companies

    pub fn add_company(&self, viewer: &Viewer, payload: NewCompanyPayload) -> AppResult<Company> {
        self.guarded("add_company", || {
            let payload = self.policy.validate_company(&payload)?;
            let company = self.db.insert_company(&payload, &viewer.user_id)?;
            tracing::info!(company_id = %company.id, created_by = %viewer.user_id, "company added");
            self.notifier
                .success("Company added successfully! It will be assigned by an admin.");
            Ok(company)
        })
    }

    pub fn get_company(&self, viewer: &Viewer, company_id: &str) -> AppResult<CompanyView> {
        self.guarded("get_company", || {
            let view = self.require_company_view(company_id, viewer.is_admin())?;
            let team_ids = self.own_team_ids(viewer)?;
            self.policy.require_company_access(viewer, &view.company, &team_ids)?;
            Ok(view)
        })
    }

    pub fn list_all_companies(&self, viewer: &Viewer) -> AppResult<Vec<CompanyView>> {
        self.guarded("list_all_companies", || {
            self.policy.require_admin(viewer, "view all companies")?;
            let settings = self.db.get_settings()?;
            self.db.company_views(&CompanyFilter {
                limit: Some(settings.list_limit),
                ..Default::default()
            })
        })
    }

    pub fn list_unassigned_companies(&self, viewer: &Viewer) -> AppResult<Vec<CompanyView>> {
        self.guarded("list_unassigned_companies", || {
            self.policy.require_admin(viewer, "view unassigned companies")?;
            let settings = self.db.get_settings()?;
            self.db.company_views(&CompanyFilter {
                unassigned_only: true,
                limit: Some(settings.list_limit),
                ..Default::default()
            })
        })
    }

    /// Companies a team lead may reassign: those held by the lead or a member.
    pub fn list_team_companies(&self, viewer: &Viewer) -> AppResult<Vec<CompanyView>> {
        self.guarded("list_team_companies", || {
            self.policy
                .require_any_role(viewer, &[Role::Admin, Role::TeamLead], "view team companies")?;
            let settings = self.db.get_settings()?;
            let assigned_to = if viewer.is_admin() {
                None
            } else {
                Some(self.own_team_ids(viewer)?)
            };
            self.db.company_views(&CompanyFilter {
                assigned_to,
                limit: Some(settings.list_limit),
                ..Default::default()
            })
        })
    }

    pub fn assign_company(&self, viewer: &Viewer, payload: AssignCompanyPayload) -> AppResult<Company> {
        self.guarded("assign_company", || {
            let company = self.assign_inner(viewer, &payload.company_id, &payload.assignee_id)?;
            self.notifier.success("Company assigned successfully!");
            Ok(company)
        })
    }

    pub fn assign_to_self(&self, viewer: &Viewer, company_id: &str) -> AppResult<Company> {
        self.guarded("assign_to_self", || {
            let company = self.assign_inner(viewer, company_id, &viewer.user_id)?;
            self.notifier.success("Assigned to you");
            Ok(company)
        })
    }

    fn assign_inner(&self, viewer: &Viewer, company_id: &str, assignee_id: &str) -> AppResult<Company> {
        self.policy
            .require_any_role(viewer, &[Role::Admin, Role::TeamLead], "assign companies")?;
        let company = self.require_live_company(company_id)?;
        let team_ids = self.own_team_ids(viewer)?;
        self.policy.require_company_access(viewer, &company, &team_ids)?;
        self.policy.require_assignable(viewer, assignee_id, &team_ids)?;

        self.require_profile(assignee_id)?;
        let roles = self.db.roles_for(assignee_id)?;
        if !roles.contains(&Role::Employee) && !roles.contains(&Role::TeamLead) {
            return Err(AppError::Validation(
                "Companies can only be assigned to employees or team leads".to_string(),
            ));
        }

        self.db.set_company_assignee(company_id, assignee_id)?;
        tracing::info!(company_id, assignee_id, assigned_by = %viewer.user_id, "company assigned");
        self.require_live_company(company_id)
    }

    /// Soft delete; the company keeps its comments and can be restored.
    pub fn delete_company(&self, viewer: &Viewer, company_id: &str) -> AppResult<BooleanResponse> {
        self.guarded("delete_company", || {
            let company = self.require_live_company(company_id)?;
            let team_ids = self.own_team_ids(viewer)?;
            self.policy.require_company_access(viewer, &company, &team_ids)?;
            let value = self.db.set_company_deleted(company_id, true)?;
            tracing::info!(company_id, deleted_by = %viewer.user_id, "company soft-deleted");
            self.notifier.success("Company moved to deleted data!");
            Ok(BooleanResponse { value })
        })
    }

    pub fn restore_company(&self, viewer: &Viewer, company_id: &str) -> AppResult<Company> {
        self.guarded("restore_company", || {
            self.policy.require_admin(viewer, "restore companies")?;
            let company = self
                .db
                .get_company(company_id)?
                .ok_or_else(|| AppError::NotFound(format!("Company {} not found", company_id)))?;
            if !company.is_deleted {
                return Err(AppError::Conflict(format!(
                    "Company {} is not deleted",
                    company.company_name
                )));
            }
            self.db.set_company_deleted(company_id, false)?;
            tracing::info!(company_id, "company restored");
            self.notifier.success("Company restored successfully!");
            self.require_live_company(company_id)
        })
    }

    /// Newest deletion first. Team leads only see their team's deletions.
    pub fn list_deleted_companies(&self, viewer: &Viewer) -> AppResult<Vec<CompanyView>> {
        self.guarded("list_deleted_companies", || {
            self.policy
                .require_any_role(viewer, &[Role::Admin, Role::TeamLead], "view deleted companies")?;
            let settings = self.db.get_settings()?;
            let assigned_to = if viewer.is_admin() {
                None
            } else {
                Some(self.own_team_ids(viewer)?)
            };
            self.db.company_views(&CompanyFilter {
                assigned_to,
                deleted: true,
                limit: Some(settings.list_limit),
                ..Default::default()
            })
        })
    }

    // Comments

    pub fn add_comment(&self, viewer: &Viewer, payload: AddCommentPayload) -> AppResult<AddCommentResponse> {
        self.guarded("add_comment", || {
            let text = self.policy.validate_comment(&payload.comment_text)?;
            let before = self.require_company_view(&payload.company_id, false)?;
            let team_ids = self.own_team_ids(viewer)?;
            self.policy.require_company_access(viewer, &before.company, &team_ids)?;

            let comment = self.db.insert_comment(
                &payload.company_id,
                &viewer.user_id,
                &text,
                payload.category,
                payload.comment_date,
                Utc::now(),
            )?;

            let after = self.require_company_view(&payload.company_id, false)?;
            let category = after.category.unwrap_or(comment.category);
            let moved = transition(before.category, category);

            tracing::info!(
                company_id = %payload.company_id,
                seq = comment.seq,
                category = category.as_str(),
                previous = before.category.map(|c| c.as_str()),
                "comment added"
            );
            match &moved {
                Some(moved) => self
                    .notifier
                    .success(format!("Comment added successfully! Company {}.", moved.describe())),
                None => self.notifier.success("Comment added successfully!"),
            }

            Ok(AddCommentResponse {
                comment,
                previous_category: before.category,
                category,
                transition: moved,
            })
        })
    }

    pub fn list_comments(&self, viewer: &Viewer, company_id: &str) -> AppResult<Vec<CommentView>> {
        self.guarded("list_comments", || {
            let view = self.require_company_view(company_id, viewer.is_admin())?;
            let team_ids = self.own_team_ids(viewer)?;
            self.policy.require_company_access(viewer, &view.company, &team_ids)?;
            Ok(view.comments)
        })
    }

    // Views

    pub fn list_view(&self, viewer: &Viewer, view: ViewKind, scope: Option<Scope>) -> AppResult<Vec<CompanyView>> {
        self.list_view_at(viewer, view, scope, Utc::now())
    }

    /// Same as [`LeadService::list_view`] with an explicit clock, which decides
    /// what "today" is.
    pub fn list_view_at(
        &self,
        viewer: &Viewer,
        view: ViewKind,
        scope: Option<Scope>,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<CompanyView>> {
        self.guarded("list_view", || {
            let settings = self.db.get_settings()?;
            let tz = self.timezone(&settings);
            let own_team = self.own_team(viewer)?;
            let scope = self.policy.resolve_scope(viewer, scope, own_team.as_ref())?;

            let assigned_to = match &scope {
                Scope::User(id) => Some(vec![id.clone()]),
                Scope::Team(team_id) => {
                    let detail = match own_team.filter(|team| team.team.id == *team_id) {
                        Some(detail) => detail,
                        None => {
                            let team = self
                                .db
                                .get_team(team_id)?
                                .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))?;
                            self.team_detail(team)?
                        }
                    };
                    Some(detail.person_ids())
                }
                Scope::Global => None,
            };

            let companies = self.db.company_views(&CompanyFilter {
                assigned_to,
                ..Default::default()
            })?;
            let total = companies.len();
            let mut selected = apply_view(view, companies, now, tz);
            selected.truncate(settings.list_limit as usize);
            tracing::debug!(view = ?view, scope = ?scope, total, selected = selected.len(), "view computed");
            Ok(selected)
        })
    }

    // Teams

    pub fn create_team(&self, viewer: &Viewer, payload: CreateTeamPayload) -> AppResult<Team> {
        self.guarded("create_team", || {
            self.policy.require_admin(viewer, "create teams")?;
            let name = self.policy.validate_team_name(&payload.name)?;
            self.require_profile(&payload.team_lead_id)?;
            if !self.db.roles_for(&payload.team_lead_id)?.contains(&Role::TeamLead) {
                return Err(AppError::Validation(
                    "The selected user is not a team lead".to_string(),
                ));
            }
            if self.db.team_for_lead(&payload.team_lead_id)?.is_some() {
                return Err(AppError::Conflict("This team lead already has a team".to_string()));
            }

            let team = self.db.insert_team(&name, &payload.team_lead_id)?;
            tracing::info!(team_id = %team.id, lead = %team.team_lead_id, "team created");
            self.notifier.success("Team created successfully!");
            Ok(team)
        })
    }

    pub fn list_teams(&self, viewer: &Viewer) -> AppResult<Vec<TeamSummary>> {
        self.guarded("list_teams", || {
            self.policy.require_admin(viewer, "view teams")?;
            self.db.list_teams()
        })
    }

    pub fn my_team(&self, viewer: &Viewer) -> AppResult<TeamDetail> {
        self.guarded("my_team", || {
            self.policy.require_any_role(viewer, &[Role::TeamLead], "manage a team")?;
            self.own_team(viewer)?
                .ok_or_else(|| AppError::NotFound(NO_TEAM_MESSAGE.to_string()))
        })
    }

    pub fn add_team_member(&self, viewer: &Viewer, team_id: &str, employee_id: &str) -> AppResult<TeamMember> {
        self.guarded("add_team_member", || {
            let team = self.require_managed_team(viewer, team_id)?;
            if employee_id == team.team_lead_id {
                return Err(AppError::Validation(
                    "A team lead cannot be added as a member of their own team".to_string(),
                ));
            }
            self.require_profile(employee_id)?;
            if !self.db.roles_for(employee_id)?.contains(&Role::Employee) {
                return Err(AppError::Validation(
                    "Only employees can be added to a team".to_string(),
                ));
            }
            let members = self.db.list_team_members(&team.id)?;
            if members.iter().any(|member| member.member.employee_id == employee_id) {
                return Err(AppError::Conflict("This employee is already in your team".to_string()));
            }

            let member = self.db.insert_team_member(&team.id, employee_id)?;
            tracing::info!(team_id = %team.id, employee_id, "team member added");
            self.notifier.success("Member added to team successfully");
            Ok(member)
        })
    }

    pub fn remove_team_member(&self, viewer: &Viewer, member_id: &str) -> AppResult<BooleanResponse> {
        self.guarded("remove_team_member", || {
            let member = self
                .db
                .get_team_member(member_id)?
                .ok_or_else(|| AppError::NotFound(format!("Team member {} not found", member_id)))?;
            self.require_managed_team(viewer, &member.team_id)?;
            let value = self.db.delete_team_member(member_id)?;
            tracing::info!(team_id = %member.team_id, employee_id = %member.employee_id, "team member removed");
            self.notifier.success("Member removed from team");
            Ok(BooleanResponse { value })
        })
    }

    /// Employees that can still be added to the team.
    pub fn available_employees(&self, viewer: &Viewer, team_id: &str) -> AppResult<Vec<Profile>> {
        self.guarded("available_employees", || {
            let team = self.require_managed_team(viewer, team_id)?;
            let detail = self.team_detail(team)?;
            let taken = detail.person_ids();
            Ok(self
                .db
                .profiles_with_roles(&[Role::Employee])?
                .into_iter()
                .filter(|profile| !taken.contains(&profile.id))
                .collect())
        })
    }

    /// People the viewer may assign companies to.
    pub fn assignees(&self, viewer: &Viewer) -> AppResult<Vec<Assignee>> {
        self.guarded("assignees", || {
            self.policy
                .require_any_role(viewer, &[Role::Admin, Role::TeamLead], "assign companies")?;

            if viewer.is_admin() {
                return Ok(self
                    .db
                    .list_profiles()?
                    .into_iter()
                    .filter(|entry| entry.roles.contains(&Role::Employee) || entry.roles.contains(&Role::TeamLead))
                    .map(|entry| Assignee {
                        is_team_lead: entry.roles.contains(&Role::TeamLead),
                        id: entry.profile.id,
                        display_name: entry.profile.display_name,
                    })
                    .collect());
            }

            let mut result = vec![Assignee {
                id: viewer.user_id.clone(),
                display_name: viewer.display_name.clone(),
                is_team_lead: true,
            }];
            if let Some(detail) = self.own_team(viewer)? {
                result.extend(detail.members.into_iter().map(|member| Assignee {
                    id: member.employee.id,
                    display_name: member.employee.display_name,
                    is_team_lead: false,
                }));
            }
            Ok(result)
        })
    }

    /// Per-person and team-wide category counts. Uncommented companies count
    /// as general.
    pub fn team_overview(&self, viewer: &Viewer, team_id: Option<&str>) -> AppResult<TeamOverview> {
        self.guarded("team_overview", || {
            let detail = match team_id {
                Some(team_id) => {
                    let team = self.require_managed_team(viewer, team_id)?;
                    self.team_detail(team)?
                }
                None => {
                    self.policy.require_any_role(viewer, &[Role::TeamLead], "view a team overview")?;
                    self.own_team(viewer)?
                        .ok_or_else(|| AppError::NotFound(NO_TEAM_MESSAGE.to_string()))?
                }
            };

            let companies = self.db.company_views(&CompanyFilter {
                assigned_to: Some(detail.person_ids()),
                ..Default::default()
            })?;
            let mut by_person: HashMap<String, Vec<CompanyView>> = HashMap::new();
            for company in companies {
                if let Some(assignee) = company.company.assigned_to_id.clone() {
                    by_person.entry(assignee).or_default().push(company);
                }
            }

            let lead = self
                .db
                .get_profile(&detail.team.team_lead_id)?
                .map(|profile| {
                    let companies = by_person.remove(&profile.id).unwrap_or_default();
                    member_stats(profile, true, companies)
                });
            let members: Vec<MemberStats> = detail
                .members
                .into_iter()
                .map(|member| {
                    let companies = by_person.remove(&member.employee.id).unwrap_or_default();
                    member_stats(member.employee, false, companies)
                })
                .collect();

            let mut totals = CategoryCounts::default();
            let mut total_companies = 0;
            for stats in lead.iter().chain(members.iter()) {
                totals.add(&stats.counts);
                total_companies += stats.company_count;
            }

            Ok(TeamOverview {
                team: detail.team,
                lead,
                members,
                total_companies,
                distribution: distribution(&totals),
                totals,
            })
        })
    }

    // Data requests

    pub fn create_data_request(&self, viewer: &Viewer, payload: DataRequestPayload) -> AppResult<DataRequest> {
        self.guarded("create_data_request", || {
            let payload = self.policy.validate_data_request(&payload)?;
            if let Some(target) = payload.requested_from_id.as_deref() {
                self.require_profile(target)?;
            }
            let request = self.db.insert_data_request(&viewer.user_id, &payload)?;
            tracing::info!(request_id = %request.id, requested_by = %viewer.user_id, "data request created");
            self.notifier.success("Request sent successfully!");
            Ok(request)
        })
    }

    pub fn list_my_data_requests(&self, viewer: &Viewer) -> AppResult<Vec<DataRequestView>> {
        self.guarded("list_my_data_requests", || {
            self.db.list_data_requests(Some(&viewer.user_id))
        })
    }

    pub fn list_data_requests(&self, viewer: &Viewer) -> AppResult<Vec<DataRequestView>> {
        self.guarded("list_data_requests", || {
            self.policy.require_admin(viewer, "review data requests")?;
            self.db.list_data_requests(None)
        })
    }

    pub fn update_data_request_status(
        &self,
        viewer: &Viewer,
        request_id: &str,
        status: RequestStatus,
    ) -> AppResult<DataRequest> {
        self.guarded("update_data_request_status", || {
            self.policy.require_admin(viewer, "review data requests")?;
            if !self.db.set_data_request_status(request_id, status)? {
                return Err(AppError::NotFound(format!("Data request {} not found", request_id)));
            }
            tracing::info!(request_id, status = status.as_str(), "data request reviewed");
            self.notifier.success(format!("Request {}", status.as_str()));
            self.db
                .get_data_request(request_id)?
                .ok_or_else(|| AppError::NotFound(format!("Data request {} not found", request_id)))
        })
    }

    // Holidays

    pub fn add_holiday(&self, viewer: &Viewer, payload: HolidayPayload) -> AppResult<Holiday> {
        self.guarded("add_holiday", || {
            self.policy.require_admin(viewer, "manage holidays")?;
            let payload = self.policy.validate_holiday(&payload)?;
            let holiday = self.db.insert_holiday(&payload)?;
            tracing::info!(holiday_id = %holiday.id, date = %holiday.holiday_date, "holiday added");
            self.notifier.success("Holiday added successfully!");
            Ok(holiday)
        })
    }

    pub fn list_holidays(&self) -> AppResult<Vec<Holiday>> {
        self.guarded("list_holidays", || self.db.list_holidays())
    }

    pub fn delete_holiday(&self, viewer: &Viewer, holiday_id: &str) -> AppResult<BooleanResponse> {
        self.guarded("delete_holiday", || {
            self.policy.require_admin(viewer, "manage holidays")?;
            if !self.db.delete_holiday(holiday_id)? {
                return Err(AppError::NotFound(format!("Holiday {} not found", holiday_id)));
            }
            self.notifier.success("Holiday deleted");
            Ok(BooleanResponse { value: true })
        })
    }

    // Settings

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        self.guarded("get_settings", || self.db.get_settings())
    }

    /// Merges `update` into the stored settings as a JSON merge-patch.
    pub fn update_settings(&self, viewer: &Viewer, update: Value) -> AppResult<AppSettings> {
        self.guarded("update_settings", || {
            self.policy.require_admin(viewer, "change settings")?;
            let mut merged = serde_json::to_value(self.db.get_settings()?)?;
            merge_json(&mut merged, update);
            let settings: AppSettings = serde_json::from_value(merged)
                .map_err(|error| AppError::Validation(format!("Invalid settings: {}", error)))?;
            self.policy.validate_settings(&settings)?;
            self.db.save_settings(&settings)?;
            tracing::info!(timezone = %settings.timezone, list_limit = settings.list_limit, "settings updated");
            self.notifier.success("Settings updated");
            Ok(settings)
        })
    }

    // Helpers

    fn timezone(&self, settings: &AppSettings) -> Tz {
        parse_timezone(&settings.timezone).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "stored timezone is invalid, falling back to UTC");
            Tz::UTC
        })
    }

    fn require_profile(&self, user_id: &str) -> AppResult<Profile> {
        self.db
            .get_profile(user_id)?
            .ok_or_else(|| AppError::NotFound(format!("No profile found for user {}", user_id)))
    }

    fn require_live_company(&self, company_id: &str) -> AppResult<Company> {
        match self.db.get_company(company_id)? {
            Some(company) if !company.is_deleted => Ok(company),
            _ => Err(AppError::NotFound(format!("Company {} not found", company_id))),
        }
    }

    fn require_company_view(&self, company_id: &str, include_deleted: bool) -> AppResult<CompanyView> {
        match self.db.company_view(company_id)? {
            Some(view) if include_deleted || !view.company.is_deleted => Ok(view),
            _ => Err(AppError::NotFound(format!("Company {} not found", company_id))),
        }
    }

    fn team_detail(&self, team: Team) -> AppResult<TeamDetail> {
        let members = self.db.list_team_members(&team.id)?;
        Ok(TeamDetail { team, members })
    }

    fn own_team(&self, viewer: &Viewer) -> AppResult<Option<TeamDetail>> {
        if !viewer.is_team_lead() {
            return Ok(None);
        }
        match self.db.team_for_lead(&viewer.user_id)? {
            Some(team) => Ok(Some(self.team_detail(team)?)),
            None => Ok(None),
        }
    }

    /// The viewer's team (lead first). A lead without a team still covers themself.
    fn own_team_ids(&self, viewer: &Viewer) -> AppResult<Vec<String>> {
        if !viewer.is_team_lead() {
            return Ok(Vec::new());
        }
        Ok(self
            .own_team(viewer)?
            .map(|detail| detail.person_ids())
            .unwrap_or_else(|| vec![viewer.user_id.clone()]))
    }

    /// Admins manage any team, leads only their own.
    fn require_managed_team(&self, viewer: &Viewer, team_id: &str) -> AppResult<Team> {
        self.policy
            .require_any_role(viewer, &[Role::Admin, Role::TeamLead], "manage teams")?;
        let team = self
            .db
            .get_team(team_id)?
            .ok_or_else(|| AppError::NotFound(format!("Team {} not found", team_id)))?;
        if !viewer.is_admin() && team.team_lead_id != viewer.user_id {
            return Err(AppError::Forbidden("You can only manage your own team".to_string()));
        }
        Ok(team)
    }
}

fn member_stats(profile: Profile, is_team_lead: bool, companies: Vec<CompanyView>) -> MemberStats {
    MemberStats {
        counts: tally(&companies),
        company_count: companies.len(),
        id: profile.id,
        display_name: profile.display_name,
        email: profile.email,
        is_team_lead,
        companies,
    }
}

fn merge_json(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, patch_value) => {
            *target_slot = patch_value;
        }
    }
}
