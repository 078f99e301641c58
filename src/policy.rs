use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, Company, DataRequestPayload, HolidayPayload, NewCompanyPayload, RegisterProfilePayload, Role,
    Scope, TeamDetail, Viewer,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

const MIN_LIST_LIMIT: u32 = 1;
const MAX_LIST_LIMIT: u32 = 5_000;
const MAX_TEXT_LEN: usize = 4_000;

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

/// Row-level access rules and payload validation.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy;

impl AccessPolicy {
    pub fn new() -> Self {
        Self
    }

    pub fn require_admin(&self, viewer: &Viewer, action: &str) -> AppResult<()> {
        if viewer.is_admin() {
            return Ok(());
        }
        Err(AppError::Forbidden(format!("Only admins can {}", action)))
    }

    pub fn require_any_role(&self, viewer: &Viewer, roles: &[Role], action: &str) -> AppResult<()> {
        if roles.iter().any(|role| viewer.has_role(*role)) {
            return Ok(());
        }
        let names = roles.iter().map(|role| role.as_str()).collect::<Vec<_>>().join(" or ");
        Err(AppError::Forbidden(format!("Only {} users can {}", names, action)))
    }

    /// Admin, the assignee, or the lead of a team containing the assignee.
    ///
    /// `team_person_ids` is the viewer's own team (lead first), empty when the
    /// viewer leads no team.
    pub fn can_access_company(&self, viewer: &Viewer, company: &Company, team_person_ids: &[String]) -> bool {
        if viewer.is_admin() {
            return true;
        }
        let Some(assignee) = company.assigned_to_id.as_deref() else {
            return false;
        };
        if assignee == viewer.user_id {
            return true;
        }
        viewer.is_team_lead() && team_person_ids.iter().any(|id| id == assignee)
    }

    pub fn require_company_access(
        &self,
        viewer: &Viewer,
        company: &Company,
        team_person_ids: &[String],
    ) -> AppResult<()> {
        if self.can_access_company(viewer, company, team_person_ids) {
            return Ok(());
        }
        Err(AppError::Forbidden(format!(
            "You do not have access to company {}",
            company.company_name
        )))
    }

    /// Team leads may only hand companies to themselves or their members.
    pub fn require_assignable(&self, viewer: &Viewer, assignee_id: &str, team_person_ids: &[String]) -> AppResult<()> {
        if viewer.is_admin() {
            return Ok(());
        }
        if viewer.is_team_lead() && team_person_ids.iter().any(|id| id == assignee_id) {
            return Ok(());
        }
        Err(AppError::Forbidden(
            "Companies can only be assigned within your team".to_string(),
        ))
    }

    /// Picks the working set for a view. Admins default to everything,
    /// everyone else to their own assignments.
    pub fn resolve_scope(&self, viewer: &Viewer, requested: Option<Scope>, own_team: Option<&TeamDetail>) -> AppResult<Scope> {
        let requested = match requested {
            Some(scope) => scope,
            None if viewer.is_admin() => return Ok(Scope::Global),
            None => return Ok(Scope::User(viewer.user_id.clone())),
        };

        if viewer.is_admin() {
            return Ok(requested);
        }

        let denied = match &requested {
            Scope::User(id) if *id == viewer.user_id => None,
            Scope::User(id) if viewer.is_team_lead() => match own_team {
                Some(team) if team.person_ids().iter().any(|person| person == id) => None,
                _ => Some("You can only view companies of your own team"),
            },
            Scope::Team(team_id) if viewer.is_team_lead() => match own_team {
                Some(team) if team.team.id == *team_id => None,
                _ => Some("You can only view your own team"),
            },
            Scope::Global => Some("Only admins can view all companies"),
            _ => Some("You can only view your own companies"),
        };

        match denied {
            Some(message) => Err(AppError::Forbidden(message.to_string())),
            None => Ok(requested),
        }
    }

    pub fn validate_profile(&self, payload: &RegisterProfilePayload) -> AppResult<RegisterProfilePayload> {
        let display_name = required(&payload.display_name, "Display name")?;
        let email = required(&payload.email, "Email")?.to_lowercase();
        validate_email(&email)?;
        Ok(RegisterProfilePayload {
            display_name,
            email,
            phone: optional(payload.phone.as_deref()),
        })
    }

    pub fn validate_company(&self, payload: &NewCompanyPayload) -> AppResult<NewCompanyPayload> {
        let email = optional(payload.email.as_deref());
        if let Some(email) = email.as_deref() {
            validate_email(email)?;
        }
        Ok(NewCompanyPayload {
            company_name: required(&payload.company_name, "Company name")?,
            owner_name: required(&payload.owner_name, "Owner name")?,
            phone: required(&payload.phone, "Phone")?,
            email,
            address: optional(payload.address.as_deref()),
            products_services: optional(payload.products_services.as_deref()),
        })
    }

    pub fn validate_comment(&self, text: &str) -> AppResult<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("Please enter a comment".to_string()));
        }
        check_length(trimmed, "Comment")?;
        Ok(trimmed.to_string())
    }

    pub fn validate_team_name(&self, name: &str) -> AppResult<String> {
        required(name, "Team name")
    }

    pub fn validate_data_request(&self, payload: &DataRequestPayload) -> AppResult<DataRequestPayload> {
        Ok(DataRequestPayload {
            message: required(&payload.message, "Message")?,
            requested_from_id: optional(payload.requested_from_id.as_deref()),
        })
    }

    pub fn validate_holiday(&self, payload: &HolidayPayload) -> AppResult<HolidayPayload> {
        Ok(HolidayPayload {
            holiday_date: payload.holiday_date,
            description: required(&payload.description, "Description")?,
        })
    }

    pub fn validate_settings(&self, settings: &AppSettings) -> AppResult<Tz> {
        if !(MIN_LIST_LIMIT..=MAX_LIST_LIMIT).contains(&settings.list_limit) {
            return Err(AppError::Validation(format!(
                "listLimit must be between {} and {}",
                MIN_LIST_LIMIT, MAX_LIST_LIMIT
            )));
        }
        parse_timezone(&settings.timezone)
    }
}

pub fn parse_timezone(raw: &str) -> AppResult<Tz> {
    raw.parse::<Tz>()
        .map_err(|_| AppError::Validation(format!("Unknown timezone '{}'", raw)))
}

fn required(value: &str, field: &str) -> AppResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    check_length(trimmed, field)?;
    Ok(trimmed.to_string())
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|trimmed| !trimmed.is_empty())
        .map(ToString::to_string)
}

fn check_length(value: &str, field: &str) -> AppResult<()> {
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_TEXT_LEN
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> AppResult<()> {
    if EMAIL_PATTERN.is_match(email) {
        return Ok(());
    }
    Err(AppError::Validation(format!("'{}' is not a valid email address", email)))
}

#[cfg(test)]
mod tests {
    use super::AccessPolicy;
    use crate::errors::AppError;
    use crate::models::{
        AppSettings, Company, NewCompanyPayload, Profile, Role, Scope, Team, TeamDetail, TeamMember, TeamMemberView,
        Viewer,
    };
    use chrono::Utc;

    fn viewer(id: &str, roles: &[Role]) -> Viewer {
        Viewer {
            user_id: id.to_string(),
            display_name: id.to_string(),
            roles: roles.to_vec(),
        }
    }

    fn company(assigned_to: Option<&str>) -> Company {
        Company {
            id: "c1".to_string(),
            company_name: "Acme".to_string(),
            owner_name: "Owner".to_string(),
            phone: "555-0100".to_string(),
            email: None,
            address: None,
            products_services: None,
            assigned_to_id: assigned_to.map(ToString::to_string),
            created_by_id: None,
            created_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    fn team(lead: &str, members: &[&str]) -> TeamDetail {
        let team = Team {
            id: "t1".to_string(),
            name: "North".to_string(),
            team_lead_id: lead.to_string(),
            created_at: Utc::now(),
        };
        let members = members
            .iter()
            .map(|id| TeamMemberView {
                member: TeamMember {
                    id: format!("m-{id}"),
                    team_id: team.id.clone(),
                    employee_id: id.to_string(),
                    added_at: Utc::now(),
                },
                employee: Profile {
                    id: id.to_string(),
                    display_name: id.to_string(),
                    email: format!("{id}@example.com"),
                    phone: None,
                    created_at: Utc::now(),
                },
            })
            .collect();
        TeamDetail { team, members }
    }

    #[test]
    fn company_access_covers_admin_assignee_and_team_lead() {
        let policy = AccessPolicy::new();
        let detail = team("lead", &["emp"]);
        let ids = detail.person_ids();
        let held = company(Some("emp"));

        assert!(policy.can_access_company(&viewer("boss", &[Role::Admin]), &held, &[]));
        assert!(policy.can_access_company(&viewer("emp", &[Role::Employee]), &held, &[]));
        assert!(policy.can_access_company(&viewer("lead", &[Role::TeamLead]), &held, &ids));
        assert!(!policy.can_access_company(&viewer("other", &[Role::Employee]), &held, &[]));
        assert!(!policy.can_access_company(&viewer("lead", &[Role::TeamLead]), &company(None), &ids));
    }

    #[test]
    fn default_scope_depends_on_role() {
        let policy = AccessPolicy::new();
        assert_eq!(
            policy.resolve_scope(&viewer("boss", &[Role::Admin]), None, None).expect("scope"),
            Scope::Global
        );
        assert_eq!(
            policy.resolve_scope(&viewer("lead", &[Role::TeamLead]), None, None).expect("scope"),
            Scope::User("lead".to_string())
        );
    }

    #[test]
    fn employees_cannot_widen_scope() {
        let policy = AccessPolicy::new();
        let employee = viewer("emp", &[Role::Employee]);
        for scope in [Scope::Global, Scope::Team("t1".to_string()), Scope::User("other".to_string())] {
            let error = policy.resolve_scope(&employee, Some(scope), None).expect_err("forbidden");
            assert!(matches!(error, AppError::Forbidden(_)));
        }
    }

    #[test]
    fn team_lead_scope_limited_to_own_team() {
        let policy = AccessPolicy::new();
        let lead = viewer("lead", &[Role::TeamLead]);
        let detail = team("lead", &["emp"]);

        assert!(policy
            .resolve_scope(&lead, Some(Scope::Team("t1".to_string())), Some(&detail))
            .is_ok());
        assert!(policy
            .resolve_scope(&lead, Some(Scope::User("emp".to_string())), Some(&detail))
            .is_ok());
        assert!(policy
            .resolve_scope(&lead, Some(Scope::Team("t2".to_string())), Some(&detail))
            .is_err());
        assert!(policy
            .resolve_scope(&lead, Some(Scope::User("stranger".to_string())), Some(&detail))
            .is_err());
        assert!(policy.resolve_scope(&lead, Some(Scope::Global), Some(&detail)).is_err());
    }

    #[test]
    fn company_payload_is_trimmed_and_email_checked() {
        let policy = AccessPolicy::new();
        let cleaned = policy
            .validate_company(&NewCompanyPayload {
                company_name: "  Acme  ".to_string(),
                owner_name: "Jane".to_string(),
                phone: "555".to_string(),
                email: Some("  ".to_string()),
                address: None,
                products_services: Some(" Widgets ".to_string()),
            })
            .expect("valid");
        assert_eq!(cleaned.company_name, "Acme");
        assert_eq!(cleaned.email, None);
        assert_eq!(cleaned.products_services.as_deref(), Some("Widgets"));

        let error = policy
            .validate_company(&NewCompanyPayload {
                company_name: "Acme".to_string(),
                owner_name: "Jane".to_string(),
                phone: "555".to_string(),
                email: Some("not-an-email".to_string()),
                ..Default::default()
            })
            .expect_err("bad email");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[test]
    fn blank_comment_is_rejected() {
        let error = AccessPolicy::new().validate_comment("   \n").expect_err("blank");
        assert_eq!(error.user_message(), "Please enter a comment");
    }

    #[test]
    fn settings_validation_checks_timezone_and_limit() {
        let policy = AccessPolicy::new();
        assert!(policy.validate_settings(&AppSettings::default()).is_ok());
        assert!(policy
            .validate_settings(&AppSettings {
                timezone: "Mars/Olympus".to_string(),
                list_limit: 10,
            })
            .is_err());
        assert!(policy
            .validate_settings(&AppSettings {
                timezone: "Asia/Kolkata".to_string(),
                list_limit: 0,
            })
            .is_err());
    }
}
