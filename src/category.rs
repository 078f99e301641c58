//! Category resolution and view filtering.
//!
//! A company never stores its category. It is always derived from the newest
//! comment, where "newest" means the highest `(created_at, seq)` pair so that
//! two comments written within the same clock tick still resolve to the one
//! inserted last.

use crate::models::{
    Category, CategoryCounts, CategorySlice, CategoryTransition, Comment, CommentView, Company, CompanyView,
    ViewKind,
};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::cmp::Reverse;

fn recency(comment: &Comment) -> (DateTime<Utc>, i64) {
    (comment.created_at, comment.seq)
}

pub fn latest<'a, I>(comments: I) -> Option<&'a Comment>
where
    I: IntoIterator<Item = &'a Comment>,
{
    comments.into_iter().max_by_key(|comment| recency(comment))
}

/// Category of the newest comment, or `None` when there are no comments.
pub fn resolve_category<'a, I>(comments: I) -> Option<Category>
where
    I: IntoIterator<Item = &'a Comment>,
{
    latest(comments).map(|comment| comment.category)
}

/// Uncommented companies count as general in the general view and in stats.
pub fn effective_category(resolved: Option<Category>) -> Category {
    resolved.unwrap_or(Category::General)
}

pub fn sort_newest_first(comments: &mut [CommentView]) {
    comments.sort_by_key(|view| Reverse(recency(&view.comment)));
}

pub fn is_same_local_day(timestamp: DateTime<Utc>, now: DateTime<Utc>, tz: Tz) -> bool {
    timestamp.with_timezone(&tz).date_naive() == now.with_timezone(&tz).date_naive()
}

pub fn has_comment_on_day<'a, I>(comments: I, now: DateTime<Utc>, tz: Tz) -> bool
where
    I: IntoIterator<Item = &'a Comment>,
{
    comments
        .into_iter()
        .any(|comment| is_same_local_day(comment.created_at, now, tz))
}

pub fn build_company_view(
    company: Company,
    assigned_to_name: Option<String>,
    mut comments: Vec<CommentView>,
) -> CompanyView {
    let category = resolve_category(comments.iter().map(|view| &view.comment));
    sort_newest_first(&mut comments);
    CompanyView {
        company,
        assigned_to_name,
        category,
        comments,
    }
}

pub fn matches_view(view: ViewKind, company: &CompanyView, now: DateTime<Utc>, tz: Tz) -> bool {
    match view {
        ViewKind::Assigned => true,
        ViewKind::Today => has_comment_on_day(company.comments.iter().map(|c| &c.comment), now, tz),
        ViewKind::General => effective_category(company.category) == Category::General,
        ViewKind::Hot | ViewKind::FollowUp | ViewKind::Block => company.category == view.target_category(),
    }
}

pub fn apply_view(view: ViewKind, companies: Vec<CompanyView>, now: DateTime<Utc>, tz: Tz) -> Vec<CompanyView> {
    companies
        .into_iter()
        .filter(|company| matches_view(view, company, now, tz))
        .collect()
}

/// A transition is only reported when there was a previous category and it differs.
pub fn transition(previous: Option<Category>, next: Category) -> Option<CategoryTransition> {
    match previous {
        Some(from) if from != next => Some(CategoryTransition { from, to: next }),
        _ => None,
    }
}

pub fn tally(companies: &[CompanyView]) -> CategoryCounts {
    let mut counts = CategoryCounts::default();
    for company in companies {
        counts.bump(effective_category(company.category));
    }
    counts
}

/// Pie-chart slices in fixed category order, empty slices dropped.
pub fn distribution(counts: &CategoryCounts) -> Vec<CategorySlice> {
    Category::ALL
        .iter()
        .map(|category| CategorySlice {
            category: *category,
            count: counts.get(*category),
        })
        .filter(|slice| slice.count > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn company(id: &str) -> Company {
        Company {
            id: id.to_string(),
            company_name: format!("{id} Ltd"),
            owner_name: "Owner".to_string(),
            phone: "555-0100".to_string(),
            email: None,
            address: None,
            products_services: None,
            assigned_to_id: Some("u1".to_string()),
            created_by_id: None,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
            is_deleted: false,
            deleted_at: None,
        }
    }

    fn comment(id: &str, category: Category, created_at: DateTime<Utc>, seq: i64) -> Comment {
        Comment {
            id: id.to_string(),
            company_id: "c1".to_string(),
            user_id: "u1".to_string(),
            comment_text: format!("note {id}"),
            category,
            comment_date: None,
            created_at,
            seq,
        }
    }

    fn view(comments: Vec<Comment>) -> CompanyView {
        let views = comments
            .into_iter()
            .map(|comment| CommentView {
                comment,
                author_name: None,
                author_email: None,
            })
            .collect();
        build_company_view(company("c1"), None, views)
    }

    #[test]
    fn resolves_to_newest_comment_regardless_of_input_order() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let comments = vec![
            comment("b", Category::Hot, base + Duration::hours(2), 2),
            comment("c", Category::Block, base + Duration::hours(5), 3),
            comment("a", Category::FollowUp, base, 1),
        ];
        assert_eq!(resolve_category(&comments), Some(Category::Block));
        assert_eq!(latest(&comments).map(|c| c.id.as_str()), Some("c"));
    }

    #[test]
    fn empty_history_has_no_category() {
        let comments: Vec<Comment> = Vec::new();
        assert_eq!(resolve_category(&comments), None);
        assert_eq!(effective_category(None), Category::General);
    }

    #[test]
    fn equal_timestamps_fall_back_to_insertion_sequence() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let comments = vec![
            comment("second", Category::Hot, at, 2),
            comment("first", Category::General, at, 1),
        ];
        assert_eq!(resolve_category(&comments), Some(Category::Hot));
    }

    #[test]
    fn company_view_sorts_history_newest_first() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let company = view(vec![
            comment("old", Category::Hot, base, 1),
            comment("new", Category::FollowUp, base + Duration::minutes(1), 2),
        ]);
        let ids: Vec<&str> = company.comments.iter().map(|c| c.comment.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert_eq!(company.category, Some(Category::FollowUp));
        assert_eq!(company.last_comment().map(|c| c.comment.id.as_str()), Some("new"));
    }

    #[test]
    fn uncommented_company_only_lands_in_general_and_assigned() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let company = view(Vec::new());
        assert!(matches_view(ViewKind::Assigned, &company, now, Tz::UTC));
        assert!(matches_view(ViewKind::General, &company, now, Tz::UTC));
        for kind in [ViewKind::Hot, ViewKind::FollowUp, ViewKind::Block, ViewKind::Today] {
            assert!(!matches_view(kind, &company, now, Tz::UTC), "{kind:?}");
        }
    }

    #[test]
    fn category_views_follow_latest_comment_only() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let company = view(vec![
            comment("a", Category::Hot, base, 1),
            comment("b", Category::Block, base + Duration::hours(1), 2),
        ]);
        assert!(matches_view(ViewKind::Block, &company, base, Tz::UTC));
        assert!(!matches_view(ViewKind::Hot, &company, base, Tz::UTC));
        assert!(!matches_view(ViewKind::General, &company, base, Tz::UTC));
    }

    #[test]
    fn today_uses_viewer_timezone() {
        // 23:30 UTC on March 1st is already March 2nd in Kolkata.
        let written = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).unwrap();
        let company = view(vec![comment("a", Category::General, written, 1)]);

        assert!(!matches_view(ViewKind::Today, &company, now, Tz::UTC));
        assert!(matches_view(ViewKind::Today, &company, now, chrono_tz::Asia::Kolkata));
    }

    #[test]
    fn today_matches_any_comment_not_only_latest() {
        let now = Utc.with_ymd_and_hms(2026, 3, 5, 15, 0, 0).unwrap();
        let company = view(vec![
            comment("today", Category::Hot, now - Duration::hours(3), 1),
            comment("future-dated", Category::Block, now + Duration::days(2), 2),
        ]);
        assert!(matches_view(ViewKind::Today, &company, now, Tz::UTC));
    }

    #[test]
    fn transition_requires_previous_category() {
        assert_eq!(transition(None, Category::Hot), None);
        assert_eq!(transition(Some(Category::Hot), Category::Hot), None);
        let moved = transition(Some(Category::FollowUp), Category::Block).expect("transition");
        assert_eq!(moved.describe(), "moved from follow up to block category");
    }

    #[test]
    fn distribution_drops_empty_slices() {
        let base = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let companies = vec![
            view(vec![comment("a", Category::Hot, base, 1)]),
            view(Vec::new()),
            view(vec![comment("b", Category::Hot, base, 1)]),
        ];
        let counts = tally(&companies);
        assert_eq!(counts.hot, 2);
        assert_eq!(counts.general, 1);
        assert_eq!(
            distribution(&counts),
            vec![
                CategorySlice { category: Category::Hot, count: 2 },
                CategorySlice { category: Category::General, count: 1 },
            ]
        );
    }
}
