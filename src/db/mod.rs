use crate::category::build_company_view;
use crate::errors::{AppError, AppResult};
use crate::models::{
    AppSettings, Category, Comment, CommentView, Company, CompanyView, DataRequest, DataRequestPayload,
    DataRequestView, Holiday, HolidayPayload, NewCompanyPayload, Profile, ProfileWithRoles, RegisterProfilePayload,
    RequestStatus, Role, Team, TeamMember, TeamMemberView, TeamSummary,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const COMPANY_COLUMNS: &str = "c.id, c.company_name, c.owner_name, c.phone, c.email, c.address, c.products_services,
     c.assigned_to_id, c.created_by_id, c.created_at, c.is_deleted, c.deleted_at, p.display_name";

#[derive(Debug, Clone, Default)]
pub struct CompanyFilter {
    /// Restrict to these assignees; `None` means no assignee restriction.
    pub assigned_to: Option<Vec<String>>,
    pub unassigned_only: bool,
    pub deleted: bool,
    /// `None` means unbounded.
    pub limit: Option<u32>,
}

#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        let db = Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        };

        db.ensure_default_settings()?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> AppResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    // Profiles and roles

    pub fn insert_profile(&self, payload: &RegisterProfilePayload) -> AppResult<Profile> {
        let profile = Profile {
            id: Uuid::new_v4().to_string(),
            display_name: payload.display_name.clone(),
            email: payload.email.clone(),
            phone: payload.phone.clone(),
            created_at: Utc::now(),
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO profiles (id, display_name, email, phone, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.id,
                profile.display_name,
                profile.email,
                profile.phone,
                format_time(profile.created_at),
            ],
        )?;
        Ok(profile)
    }

    pub fn get_profile(&self, id: &str) -> AppResult<Option<Profile>> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT id, display_name, email, phone, created_at FROM profiles WHERE id = ?1",
                [id],
                parse_profile_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn find_profile_by_email(&self, email: &str) -> AppResult<Option<Profile>> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT id, display_name, email, phone, created_at FROM profiles WHERE email = ?1 COLLATE NOCASE",
                [email],
                parse_profile_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn list_profiles(&self) -> AppResult<Vec<ProfileWithRoles>> {
        let conn = self.conn()?;
        let mut roles_by_user: HashMap<String, Vec<Role>> = HashMap::new();
        {
            let mut statement = conn.prepare("SELECT user_id, role FROM user_roles ORDER BY role")?;
            let rows = statement.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, parse_role(&row.get::<_, String>(1)?)?))
            })?;
            for row in rows {
                let (user_id, role) = row?;
                roles_by_user.entry(user_id).or_default().push(role);
            }
        }

        let mut statement = conn.prepare(
            "SELECT id, display_name, email, phone, created_at FROM profiles ORDER BY display_name COLLATE NOCASE",
        )?;
        let rows = statement.query_map([], parse_profile_row)?;
        let mut result = Vec::new();
        for row in rows {
            let profile = row?;
            let mut roles = roles_by_user.remove(&profile.id).unwrap_or_default();
            roles.sort();
            result.push(ProfileWithRoles { profile, roles });
        }
        Ok(result)
    }

    pub fn roles_for(&self, user_id: &str) -> AppResult<Vec<Role>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare("SELECT role FROM user_roles WHERE user_id = ?1")?;
        let rows = statement.query_map([user_id], |row| parse_role(&row.get::<_, String>(0)?))?;
        let mut roles = Vec::new();
        for row in rows {
            roles.push(row?);
        }
        roles.sort();
        Ok(roles)
    }

    /// Returns `true` when the role was newly granted.
    pub fn upsert_role(&self, user_id: &str, role: Role) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO user_roles (id, user_id, role, created_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, role) DO NOTHING",
            params![Uuid::new_v4().to_string(), user_id, role.as_str(), format_time(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    pub fn count_role(&self, role: Role) -> AppResult<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(1) FROM user_roles WHERE role = ?1",
            [role.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn profiles_with_roles(&self, roles: &[Role]) -> AppResult<Vec<Profile>> {
        if roles.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn()?;
        let query = format!(
            "SELECT DISTINCT p.id, p.display_name, p.email, p.phone, p.created_at
             FROM profiles p JOIN user_roles r ON r.user_id = p.id
             WHERE r.role IN ({})
             ORDER BY p.display_name COLLATE NOCASE",
            placeholders(roles.len())
        );
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(
            rusqlite::params_from_iter(roles.iter().map(|role| role.as_str())),
            parse_profile_row,
        )?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // Companies

    pub fn insert_company(&self, payload: &NewCompanyPayload, created_by_id: &str) -> AppResult<Company> {
        let company = Company {
            id: Uuid::new_v4().to_string(),
            company_name: payload.company_name.clone(),
            owner_name: payload.owner_name.clone(),
            phone: payload.phone.clone(),
            email: payload.email.clone(),
            address: payload.address.clone(),
            products_services: payload.products_services.clone(),
            assigned_to_id: None,
            created_by_id: Some(created_by_id.to_string()),
            created_at: Utc::now(),
            is_deleted: false,
            deleted_at: None,
        };

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO companies (
               id, company_name, owner_name, phone, email, address, products_services,
               assigned_to_id, created_by_id, created_at, is_deleted
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9, 0)",
            params![
                company.id,
                company.company_name,
                company.owner_name,
                company.phone,
                company.email,
                company.address,
                company.products_services,
                company.created_by_id,
                format_time(company.created_at),
            ],
        )?;
        Ok(company)
    }

    pub fn get_company(&self, id: &str) -> AppResult<Option<Company>> {
        let conn = self.conn()?;
        let query = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies c LEFT JOIN profiles p ON p.id = c.assigned_to_id WHERE c.id = ?1"
        );
        let row = conn.query_row(&query, [id], parse_company_row).optional()?;
        Ok(row.map(|(company, _)| company))
    }

    pub fn set_company_assignee(&self, id: &str, assignee_id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE companies SET assigned_to_id = ?1 WHERE id = ?2",
            params![assignee_id, id],
        )?;
        Ok(changed > 0)
    }

    pub fn set_company_deleted(&self, id: &str, deleted: bool) -> AppResult<bool> {
        let conn = self.conn()?;
        let deleted_at = deleted.then(|| format_time(Utc::now()));
        let changed = conn.execute(
            "UPDATE companies SET is_deleted = ?1, deleted_at = ?2 WHERE id = ?3",
            params![deleted as i32, deleted_at, id],
        )?;
        Ok(changed > 0)
    }

    pub fn list_companies(&self, filter: &CompanyFilter) -> AppResult<Vec<(Company, Option<String>)>> {
        if matches!(&filter.assigned_to, Some(ids) if ids.is_empty()) {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut query = format!(
            "SELECT {COMPANY_COLUMNS} FROM companies c LEFT JOIN profiles p ON p.id = c.assigned_to_id
             WHERE c.is_deleted = {}",
            if filter.deleted { 1 } else { 0 }
        );

        let mut params_vec: Vec<String> = Vec::new();
        if let Some(ids) = &filter.assigned_to {
            query.push_str(&format!(" AND c.assigned_to_id IN ({})", placeholders(ids.len())));
            params_vec.extend(ids.iter().cloned());
        }
        if filter.unassigned_only {
            query.push_str(" AND c.assigned_to_id IS NULL");
        }

        if filter.deleted {
            query.push_str(" ORDER BY c.deleted_at DESC, c.rowid DESC");
        } else {
            query.push_str(" ORDER BY c.created_at DESC, c.rowid DESC");
        }

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {}", limit));
        }

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(params_vec.iter()), parse_company_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    /// Companies with their comment history attached and category resolved.
    pub fn company_views(&self, filter: &CompanyFilter) -> AppResult<Vec<CompanyView>> {
        let companies = self.list_companies(filter)?;
        let ids: Vec<String> = companies.iter().map(|(company, _)| company.id.clone()).collect();
        let mut comments = self.comments_for(&ids)?;

        Ok(companies
            .into_iter()
            .map(|(company, assigned_to_name)| {
                let history = comments.remove(&company.id).unwrap_or_default();
                build_company_view(company, assigned_to_name, history)
            })
            .collect())
    }

    pub fn company_view(&self, id: &str) -> AppResult<Option<CompanyView>> {
        let row = {
            let conn = self.conn()?;
            let query = format!(
                "SELECT {COMPANY_COLUMNS} FROM companies c LEFT JOIN profiles p ON p.id = c.assigned_to_id WHERE c.id = ?1"
            );
            conn.query_row(&query, [id], parse_company_row).optional()?
        };
        let Some((company, assigned_to_name)) = row else {
            return Ok(None);
        };
        let history = self.comments_for(&[company.id.clone()])?.remove(&company.id).unwrap_or_default();
        Ok(Some(build_company_view(company, assigned_to_name, history)))
    }

    // Comments

    pub fn insert_comment(
        &self,
        company_id: &str,
        user_id: &str,
        comment_text: &str,
        category: Category,
        comment_date: Option<NaiveDate>,
        created_at: DateTime<Utc>,
    ) -> AppResult<Comment> {
        let id = Uuid::new_v4().to_string();

        let conn = self.conn()?;
        let seq: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) + 1 FROM comments WHERE company_id = ?1",
            [company_id],
            |row| row.get(0),
        )?;

        conn.execute(
            "INSERT INTO comments (id, company_id, user_id, comment_text, category, comment_date, created_at, seq)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                company_id,
                user_id,
                comment_text,
                category.as_str(),
                comment_date,
                format_time(created_at),
                seq,
            ],
        )?;

        Ok(Comment {
            id,
            company_id: company_id.to_string(),
            user_id: user_id.to_string(),
            comment_text: comment_text.to_string(),
            category,
            comment_date,
            created_at,
            seq,
        })
    }

    /// Comment history keyed by company id, in storage order.
    pub fn comments_for(&self, company_ids: &[String]) -> AppResult<HashMap<String, Vec<CommentView>>> {
        let mut grouped: HashMap<String, Vec<CommentView>> = HashMap::new();
        if company_ids.is_empty() {
            return Ok(grouped);
        }

        let conn = self.conn()?;
        let query = format!(
            "SELECT m.id, m.company_id, m.user_id, m.comment_text, m.category, m.comment_date, m.created_at, m.seq,
                    p.display_name, p.email
             FROM comments m LEFT JOIN profiles p ON p.id = m.user_id
             WHERE m.company_id IN ({})",
            placeholders(company_ids.len())
        );
        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(company_ids.iter()), parse_comment_view_row)?;
        for row in rows {
            let view = row?;
            grouped.entry(view.comment.company_id.clone()).or_default().push(view);
        }
        Ok(grouped)
    }

    // Teams

    pub fn insert_team(&self, name: &str, team_lead_id: &str) -> AppResult<Team> {
        let team = Team {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            team_lead_id: team_lead_id.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO teams (id, name, team_lead_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![team.id, team.name, team.team_lead_id, format_time(team.created_at)],
        )?;
        Ok(team)
    }

    pub fn get_team(&self, id: &str) -> AppResult<Option<Team>> {
        let conn = self.conn()?;
        let team = conn
            .query_row(
                "SELECT id, name, team_lead_id, created_at FROM teams WHERE id = ?1",
                [id],
                parse_team_row,
            )
            .optional()?;
        Ok(team)
    }

    pub fn team_for_lead(&self, team_lead_id: &str) -> AppResult<Option<Team>> {
        let conn = self.conn()?;
        let team = conn
            .query_row(
                "SELECT id, name, team_lead_id, created_at FROM teams WHERE team_lead_id = ?1",
                [team_lead_id],
                parse_team_row,
            )
            .optional()?;
        Ok(team)
    }

    pub fn list_teams(&self) -> AppResult<Vec<TeamSummary>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT t.id, t.name, t.team_lead_id, t.created_at, p.display_name
             FROM teams t LEFT JOIN profiles p ON p.id = t.team_lead_id
             ORDER BY t.name COLLATE NOCASE",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(TeamSummary {
                team: parse_team_row(row)?,
                lead_name: row.get(4)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn insert_team_member(&self, team_id: &str, employee_id: &str) -> AppResult<TeamMember> {
        let member = TeamMember {
            id: Uuid::new_v4().to_string(),
            team_id: team_id.to_string(),
            employee_id: employee_id.to_string(),
            added_at: Utc::now(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO team_members (id, team_id, employee_id, added_at) VALUES (?1, ?2, ?3, ?4)",
            params![member.id, member.team_id, member.employee_id, format_time(member.added_at)],
        )?;
        Ok(member)
    }

    pub fn get_team_member(&self, id: &str) -> AppResult<Option<TeamMember>> {
        let conn = self.conn()?;
        let member = conn
            .query_row(
                "SELECT id, team_id, employee_id, added_at FROM team_members WHERE id = ?1",
                [id],
                parse_team_member_row,
            )
            .optional()?;
        Ok(member)
    }

    pub fn delete_team_member(&self, id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM team_members WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    pub fn list_team_members(&self, team_id: &str) -> AppResult<Vec<TeamMemberView>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT m.id, m.team_id, m.employee_id, m.added_at,
                    p.id, p.display_name, p.email, p.phone, p.created_at
             FROM team_members m JOIN profiles p ON p.id = m.employee_id
             WHERE m.team_id = ?1
             ORDER BY m.added_at, m.rowid",
        )?;
        let rows = statement.query_map([team_id], |row| {
            Ok(TeamMemberView {
                member: parse_team_member_row(row)?,
                employee: Profile {
                    id: row.get(4)?,
                    display_name: row.get(5)?,
                    email: row.get(6)?,
                    phone: row.get(7)?,
                    created_at: parse_time(&row.get::<_, String>(8)?)?,
                },
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // Data requests

    pub fn insert_data_request(&self, requested_by_id: &str, payload: &DataRequestPayload) -> AppResult<DataRequest> {
        let request = DataRequest {
            id: Uuid::new_v4().to_string(),
            requested_by_id: requested_by_id.to_string(),
            requested_from_id: payload.requested_from_id.clone(),
            message: payload.message.clone(),
            status: RequestStatus::Pending,
            created_at: Utc::now(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO data_requests (id, requested_by_id, requested_from_id, message, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                request.id,
                request.requested_by_id,
                request.requested_from_id,
                request.message,
                request.status.as_str(),
                format_time(request.created_at),
            ],
        )?;
        Ok(request)
    }

    pub fn get_data_request(&self, id: &str) -> AppResult<Option<DataRequest>> {
        let conn = self.conn()?;
        let request = conn
            .query_row(
                "SELECT id, requested_by_id, requested_from_id, message, status, created_at
                 FROM data_requests WHERE id = ?1",
                [id],
                parse_data_request_row,
            )
            .optional()?;
        Ok(request)
    }

    /// Newest first; restricted to one requester when `requested_by_id` is set.
    pub fn list_data_requests(&self, requested_by_id: Option<&str>) -> AppResult<Vec<DataRequestView>> {
        let conn = self.conn()?;
        let mut query = String::from(
            "SELECT d.id, d.requested_by_id, d.requested_from_id, d.message, d.status, d.created_at,
                    b.display_name, b.email, f.display_name
             FROM data_requests d
             LEFT JOIN profiles b ON b.id = d.requested_by_id
             LEFT JOIN profiles f ON f.id = d.requested_from_id
             WHERE 1 = 1",
        );
        let mut params_vec: Vec<String> = Vec::new();
        if let Some(requested_by_id) = requested_by_id {
            query.push_str(" AND d.requested_by_id = ?");
            params_vec.push(requested_by_id.to_string());
        }
        query.push_str(" ORDER BY d.created_at DESC, d.rowid DESC");

        let mut statement = conn.prepare(&query)?;
        let rows = statement.query_map(rusqlite::params_from_iter(params_vec.iter()), |row| {
            Ok(DataRequestView {
                request: parse_data_request_row(row)?,
                requested_by_name: row.get(6)?,
                requested_by_email: row.get(7)?,
                requested_from_name: row.get(8)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn set_data_request_status(&self, id: &str, status: RequestStatus) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE data_requests SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    // Holidays

    pub fn insert_holiday(&self, payload: &HolidayPayload) -> AppResult<Holiday> {
        let holiday = Holiday {
            id: Uuid::new_v4().to_string(),
            holiday_date: payload.holiday_date,
            description: payload.description.clone(),
            created_at: Utc::now(),
        };
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO holidays (id, holiday_date, description, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                holiday.id,
                holiday.holiday_date,
                holiday.description,
                format_time(holiday.created_at),
            ],
        )?;
        Ok(holiday)
    }

    pub fn list_holidays(&self) -> AppResult<Vec<Holiday>> {
        let conn = self.conn()?;
        let mut statement = conn.prepare(
            "SELECT id, holiday_date, description, created_at FROM holidays ORDER BY holiday_date ASC, rowid ASC",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(Holiday {
                id: row.get(0)?,
                holiday_date: row.get(1)?,
                description: row.get(2)?,
                created_at: parse_time(&row.get::<_, String>(3)?)?,
            })
        })?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn delete_holiday(&self, id: &str) -> AppResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute("DELETE FROM holidays WHERE id = ?1", [id])?;
        Ok(changed > 0)
    }

    // Settings

    pub fn get_settings(&self) -> AppResult<AppSettings> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT value_json FROM settings WHERE key = 'app'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str::<AppSettings>(&raw).unwrap_or_default()),
            None => Ok(AppSettings::default()),
        }
    }

    pub fn save_settings(&self, settings: &AppSettings) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (key, value_json, updated_at)
             VALUES ('app', ?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
            params![serde_json::to_string(settings)?, format_time(Utc::now())],
        )?;
        Ok(())
    }

    fn ensure_default_settings(&self) -> AppResult<()> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(1) FROM settings WHERE key = 'app'", [], |row| row.get(0))?;
        if count == 0 {
            conn.execute(
                "INSERT INTO settings (key, value_json, updated_at) VALUES ('app', ?1, ?2)",
                params![
                    serde_json::to_string(&AppSettings::default())?,
                    format_time(Utc::now())
                ],
            )?;
        }
        Ok(())
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn parse_profile_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Profile> {
    Ok(Profile {
        id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        created_at: parse_time(&row.get::<_, String>(4)?)?,
    })
}

fn parse_company_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Company, Option<String>)> {
    let company = Company {
        id: row.get(0)?,
        company_name: row.get(1)?,
        owner_name: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        address: row.get(5)?,
        products_services: row.get(6)?,
        assigned_to_id: row.get(7)?,
        created_by_id: row.get(8)?,
        created_at: parse_time(&row.get::<_, String>(9)?)?,
        is_deleted: row.get::<_, i32>(10)? != 0,
        deleted_at: row
            .get::<_, Option<String>>(11)?
            .map(|raw| parse_time(&raw))
            .transpose()?,
    };
    Ok((company, row.get(12)?))
}

fn parse_comment_view_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentView> {
    Ok(CommentView {
        comment: Comment {
            id: row.get(0)?,
            company_id: row.get(1)?,
            user_id: row.get(2)?,
            comment_text: row.get(3)?,
            category: parse_category(&row.get::<_, String>(4)?)?,
            comment_date: row.get(5)?,
            created_at: parse_time(&row.get::<_, String>(6)?)?,
            seq: row.get(7)?,
        },
        author_name: row.get(8)?,
        author_email: row.get(9)?,
    })
}

fn parse_team_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Team> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        team_lead_id: row.get(2)?,
        created_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_team_member_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamMember> {
    Ok(TeamMember {
        id: row.get(0)?,
        team_id: row.get(1)?,
        employee_id: row.get(2)?,
        added_at: parse_time(&row.get::<_, String>(3)?)?,
    })
}

fn parse_data_request_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DataRequest> {
    Ok(DataRequest {
        id: row.get(0)?,
        requested_by_id: row.get(1)?,
        requested_from_id: row.get(2)?,
        message: row.get(3)?,
        status: parse_request_status(&row.get::<_, String>(4)?)?,
        created_at: parse_time(&row.get::<_, String>(5)?)?,
    })
}

fn invalid_data(message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}

fn parse_category(raw: &str) -> rusqlite::Result<Category> {
    Category::parse(raw).ok_or_else(|| invalid_data(format!("Unknown comment category '{}'", raw)))
}

fn parse_role(raw: &str) -> rusqlite::Result<Role> {
    Role::parse(raw).ok_or_else(|| invalid_data(format!("Unknown role '{}'", raw)))
}

fn parse_request_status(raw: &str) -> rusqlite::Result<RequestStatus> {
    RequestStatus::parse(raw).ok_or_else(|| invalid_data(format!("Unknown request status '{}'", raw)))
}

fn format_time(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| invalid_data(error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::{CompanyFilter, Database};
    use crate::errors::AppError;
    use crate::models::{
        AppSettings, Category, DataRequestPayload, HolidayPayload, NewCompanyPayload, RegisterProfilePayload,
        RequestStatus, Role,
    };
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn open(dir: &tempfile::TempDir) -> Database {
        Database::new(&dir.path().join("test.sqlite")).expect("db")
    }

    fn profile(db: &Database, name: &str) -> String {
        db.insert_profile(&RegisterProfilePayload {
            display_name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
        })
        .expect("insert profile")
        .id
    }

    fn company(db: &Database, name: &str, created_by: &str) -> String {
        db.insert_company(
            &NewCompanyPayload {
                company_name: name.to_string(),
                owner_name: "Owner".to_string(),
                phone: "555-0100".to_string(),
                ..Default::default()
            },
            created_by,
        )
        .expect("insert company")
        .id
    }

    #[test]
    fn new_database_seeds_default_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        assert_eq!(db.get_settings().expect("settings"), AppSettings::default());
        assert!(db.path().ends_with("test.sqlite"));
    }

    #[test]
    fn comment_sequence_increments_per_company() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let user = profile(&db, "Asha");
        let first = company(&db, "Acme", &user);
        let second = company(&db, "Globex", &user);
        let at = Utc::now();

        let a = db
            .insert_comment(&first, &user, "intro call", Category::General, None, at)
            .expect("comment");
        let b = db
            .insert_comment(&first, &user, "wants a quote", Category::Hot, None, at)
            .expect("comment");
        let c = db
            .insert_comment(&second, &user, "no answer", Category::FollowUp, None, at)
            .expect("comment");

        assert_eq!((a.seq, b.seq, c.seq), (1, 2, 1));
    }

    #[test]
    fn company_views_attach_sorted_history_and_assignee_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let user = profile(&db, "Asha");
        let id = company(&db, "Acme", &user);
        db.set_company_assignee(&id, &user).expect("assign");

        let base = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 2, 3);
        db.insert_comment(&id, &user, "later", Category::Block, date, base + Duration::hours(1))
            .expect("comment");
        db.insert_comment(&id, &user, "earlier", Category::Hot, None, base)
            .expect("comment");

        let views = db.company_views(&CompanyFilter::default()).expect("views");
        assert_eq!(views.len(), 1);
        let view = &views[0];
        assert_eq!(view.assigned_to_name.as_deref(), Some("Asha"));
        assert_eq!(view.category, Some(Category::Block));
        assert_eq!(view.comments[0].comment.comment_text, "later");
        assert_eq!(view.comments[0].comment.comment_date, date);
        assert_eq!(view.comments[0].author_email.as_deref(), Some("asha@example.com"));
    }

    #[test]
    fn company_filter_scopes_by_assignee_and_deletion() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let asha = profile(&db, "Asha");
        let ravi = profile(&db, "Ravi");
        let mine = company(&db, "Acme", &asha);
        let theirs = company(&db, "Globex", &asha);
        let loose = company(&db, "Initech", &asha);
        db.set_company_assignee(&mine, &asha).expect("assign");
        db.set_company_assignee(&theirs, &ravi).expect("assign");

        let only_asha = db
            .list_companies(&CompanyFilter {
                assigned_to: Some(vec![asha.clone()]),
                ..Default::default()
            })
            .expect("list");
        assert_eq!(only_asha.len(), 1);
        assert_eq!(only_asha[0].0.id, mine);

        let unassigned = db
            .list_companies(&CompanyFilter {
                unassigned_only: true,
                ..Default::default()
            })
            .expect("list");
        assert_eq!(unassigned.len(), 1);
        assert_eq!(unassigned[0].0.id, loose);

        let nobody = db
            .list_companies(&CompanyFilter {
                assigned_to: Some(Vec::new()),
                ..Default::default()
            })
            .expect("list");
        assert!(nobody.is_empty());

        assert!(db.set_company_deleted(&theirs, true).expect("delete"));
        let live = db.list_companies(&CompanyFilter::default()).expect("list");
        assert_eq!(live.len(), 2);
        let deleted = db
            .list_companies(&CompanyFilter {
                deleted: true,
                ..Default::default()
            })
            .expect("list");
        assert_eq!(deleted.len(), 1);
        assert!(deleted[0].0.is_deleted);
        assert!(deleted[0].0.deleted_at.is_some());

        assert!(db.set_company_deleted(&theirs, false).expect("restore"));
        let restored = db.get_company(&theirs).expect("get").expect("present");
        assert!(!restored.is_deleted);
        assert!(restored.deleted_at.is_none());
    }

    #[test]
    fn role_upsert_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let user = profile(&db, "Asha");

        assert!(db.upsert_role(&user, Role::Employee).expect("grant"));
        assert!(!db.upsert_role(&user, Role::Employee).expect("grant again"));
        assert!(db.upsert_role(&user, Role::TeamLead).expect("grant lead"));

        assert_eq!(db.roles_for(&user).expect("roles"), vec![Role::TeamLead, Role::Employee]);
        assert_eq!(db.count_role(Role::Employee).expect("count"), 1);
        assert_eq!(db.profiles_with_roles(&[Role::TeamLead]).expect("leads").len(), 1);

        let listed = db.list_profiles().expect("profiles");
        assert_eq!(listed[0].roles, vec![Role::TeamLead, Role::Employee]);
    }

    #[test]
    fn duplicate_team_member_maps_to_conflict() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let lead = profile(&db, "Lead");
        let member = profile(&db, "Member");
        let team = db.insert_team("North", &lead).expect("team");

        db.insert_team_member(&team.id, &member).expect("first add");
        let error = db.insert_team_member(&team.id, &member).expect_err("duplicate");
        assert!(matches!(error, AppError::Conflict(_)));

        assert_eq!(db.team_for_lead(&lead).expect("team").map(|t| t.id), Some(team.id.clone()));
        assert_eq!(db.list_team_members(&team.id).expect("members")[0].employee.display_name, "Member");
        assert_eq!(db.list_teams().expect("teams")[0].lead_name.as_deref(), Some("Lead"));
    }

    #[test]
    fn holidays_list_in_date_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        for (day, description) in [(25, "Christmas"), (1, "New Year")] {
            let month = if day == 1 { 1 } else { 12 };
            db.insert_holiday(&HolidayPayload {
                holiday_date: NaiveDate::from_ymd_opt(2026, month, day).expect("date"),
                description: description.to_string(),
            })
            .expect("holiday");
        }
        let holidays = db.list_holidays().expect("holidays");
        let names: Vec<&str> = holidays.iter().map(|h| h.description.as_str()).collect();
        assert_eq!(names, vec!["New Year", "Christmas"]);

        assert!(db.delete_holiday(&holidays[0].id).expect("delete"));
        assert!(!db.delete_holiday(&holidays[0].id).expect("delete again"));
    }

    #[test]
    fn data_requests_filter_by_requester() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let asha = profile(&db, "Asha");
        let ravi = profile(&db, "Ravi");
        let request = db
            .insert_data_request(
                &asha,
                &DataRequestPayload {
                    message: "Need 50 new leads".to_string(),
                    requested_from_id: Some(ravi.clone()),
                },
            )
            .expect("request");
        db.insert_data_request(
            &ravi,
            &DataRequestPayload {
                message: "More retail leads".to_string(),
                requested_from_id: None,
            },
        )
        .expect("request");

        let mine = db.list_data_requests(Some(&asha)).expect("mine");
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].requested_from_name.as_deref(), Some("Ravi"));
        assert_eq!(mine[0].request.status, RequestStatus::Pending);
        assert_eq!(db.list_data_requests(None).expect("all").len(), 2);

        assert!(db.set_data_request_status(&request.id, RequestStatus::Approved).expect("approve"));
        let stored = db.get_data_request(&request.id).expect("get").expect("present");
        assert_eq!(stored.status, RequestStatus::Approved);
    }

    #[test]
    fn unknown_request_status_is_a_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = open(&dir);
        let asha = profile(&db, "Asha");
        let request = db
            .insert_data_request(
                &asha,
                &DataRequestPayload {
                    message: "Need 50 new leads".to_string(),
                    requested_from_id: None,
                },
            )
            .expect("request");
        {
            let conn = db.conn().expect("conn");
            conn.execute_batch("PRAGMA ignore_check_constraints = ON;").expect("pragma");
            conn.execute(
                "UPDATE data_requests SET status = 'escalated' WHERE id = ?1",
                rusqlite::params![request.id],
            )
            .expect("corrupt status");
        }

        assert!(db.get_data_request(&request.id).is_err());
        assert!(db.list_data_requests(None).is_err());
    }
}
